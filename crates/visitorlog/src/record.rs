//! Visitor record types.
//!
//! A [`Record`] is one observation of a page visit. Records are built once
//! from a [`RecordDraft`], which derives the id, timestamp and fingerprint,
//! and are never modified afterwards.

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder for a value that was never observed.
pub const UNKNOWN: &str = "unknown";

/// Placeholder for a value whose lookup failed.
pub const UNAVAILABLE: &str = "unavailable";

/// Coordinates placeholder while the geo lookup is pending.
pub const WAITING: &str = "waiting…";

/// Referrer placeholder for direct visits.
pub const DIRECT: &str = "direct";

const ID_SUFFIX_LEN: usize = 6;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Why a record was captured.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reason {
    /// First capture when a page loads.
    InitialLoad,
    /// The visitor asked for a fresh lookup.
    ManualRefresh,
    /// The visitor granted a precise position.
    PreciseGeolocation,
    /// Caller-supplied reason.
    Other(String),
}

impl Reason {
    /// The wire form of this reason.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::InitialLoad => "initial-load",
            Self::ManualRefresh => "manual-refresh",
            Self::PreciseGeolocation => "precise-geolocation",
            Self::Other(reason) => reason,
        }
    }
}

impl From<&str> for Reason {
    fn from(value: &str) -> Self {
        match value {
            "initial-load" => Self::InitialLoad,
            "manual-refresh" => Self::ManualRefresh,
            "precise-geolocation" => Self::PreciseGeolocation,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The source attributes of a record, before id, time and fingerprint exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDraft {
    /// Path of the page that generated the record.
    pub page: String,
    /// Why the record is captured.
    pub reason: String,
    /// Referring URL; empty for direct visits.
    pub referrer: String,
    /// Public IP or a placeholder.
    pub ip: String,
    /// City/region/country or a placeholder.
    pub location: String,
    /// Coordinates string or a placeholder.
    pub coords: String,
    /// Classified browser.
    pub browser: String,
    /// Classified operating system.
    pub os: String,
    /// Device description.
    pub device: String,
    /// Raw user-agent string.
    pub user_agent: String,
    /// Up to three preferred languages.
    pub language: String,
    /// IANA timezone name.
    pub timezone: String,
    /// Window size, `WxH`.
    pub viewport: String,
    /// Screen size, `WxH @ Dx`.
    pub screen: String,
    /// Network description.
    pub network: String,
}

fn or_placeholder(value: String, placeholder: &str) -> String {
    if value.trim().is_empty() {
        placeholder.to_string()
    } else {
        value.trim().to_string()
    }
}

impl RecordDraft {
    /// Build the record, stamping it with the current time.
    #[must_use]
    pub fn finalize(self) -> Record {
        self.finalize_at(Utc::now())
    }

    /// Build the record as captured at `now`.
    ///
    /// Empty fields become placeholders, then the fingerprint is derived from
    /// the final field values.
    #[must_use]
    pub fn finalize_at(self, now: DateTime<Utc>) -> Record {
        let ip = or_placeholder(self.ip, UNKNOWN);
        let browser = or_placeholder(self.browser, "Unknown");
        let os = or_placeholder(self.os, "Unknown");
        let timezone = or_placeholder(self.timezone, UNKNOWN);
        let user_agent = or_placeholder(self.user_agent, UNKNOWN);
        let fingerprint = compute_fingerprint(&ip, &browser, &os, &timezone, &user_agent);

        Record {
            id: generate_id(now),
            recorded_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            page: or_placeholder(self.page, UNKNOWN),
            reason: or_placeholder(self.reason, "auto"),
            referrer: or_placeholder(self.referrer, DIRECT),
            ip,
            location: or_placeholder(self.location, UNKNOWN),
            coords: or_placeholder(self.coords, UNKNOWN),
            browser,
            os,
            device: or_placeholder(self.device, UNKNOWN),
            user_agent,
            language: or_placeholder(self.language, UNKNOWN),
            timezone,
            viewport: or_placeholder(self.viewport, UNKNOWN),
            screen: or_placeholder(self.screen, UNKNOWN),
            network: or_placeholder(self.network, UNKNOWN),
            fingerprint,
            extra: Map::new(),
        }
    }
}

/// One stored observation of a page visit.
///
/// Field names serialize in camelCase. Fields a client sent that this type
/// does not know are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default)]
    id: String,
    #[serde(default)]
    recorded_at: String,
    #[serde(default)]
    page: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    referrer: String,
    #[serde(default)]
    ip: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    coords: String,
    #[serde(default)]
    browser: String,
    #[serde(default)]
    os: String,
    #[serde(default)]
    device: String,
    #[serde(default)]
    user_agent: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    timezone: String,
    #[serde(default)]
    viewport: String,
    #[serde(default)]
    screen: String,
    #[serde(default)]
    network: String,
    #[serde(default)]
    fingerprint: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Record {
    /// Unique id (`<unix-millis>-<base36 suffix>`).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Capture time as stored (ISO-8601).
    #[must_use]
    pub fn recorded_at(&self) -> &str {
        &self.recorded_at
    }

    /// Capture time, if the stored value parses.
    #[must_use]
    pub fn recorded_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.recorded_at)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Page path.
    #[must_use]
    pub fn page(&self) -> &str {
        &self.page
    }

    /// Capture reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Referrer or `direct`.
    #[must_use]
    pub fn referrer(&self) -> &str {
        &self.referrer
    }

    /// Public IP or placeholder.
    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Human-readable location.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Coordinates string.
    #[must_use]
    pub fn coords(&self) -> &str {
        &self.coords
    }

    /// Browser family.
    #[must_use]
    pub fn browser(&self) -> &str {
        &self.browser
    }

    /// Operating system.
    #[must_use]
    pub fn os(&self) -> &str {
        &self.os
    }

    /// Device description.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Raw user-agent string.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Preferred languages.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// IANA timezone.
    #[must_use]
    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    /// Viewport size.
    #[must_use]
    pub fn viewport(&self) -> &str {
        &self.viewport
    }

    /// Screen size and pixel ratio.
    #[must_use]
    pub fn screen(&self) -> &str {
        &self.screen
    }

    /// Network description.
    #[must_use]
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Composite `ip|browser|os|timezone|userAgent` key.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Fields this type does not model, as received.
    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Values matched by free-text search, in display order.
    #[must_use]
    pub fn searchable_fields(&self) -> [&str; 17] {
        [
            self.recorded_at.as_str(),
            self.ip.as_str(),
            self.location.as_str(),
            self.coords.as_str(),
            self.browser.as_str(),
            self.user_agent.as_str(),
            self.os.as_str(),
            self.device.as_str(),
            self.language.as_str(),
            self.timezone.as_str(),
            self.viewport.as_str(),
            self.screen.as_str(),
            self.network.as_str(),
            self.page.as_str(),
            self.reason.as_str(),
            self.referrer.as_str(),
            self.fingerprint.as_str(),
        ]
    }
}

/// Join the fingerprint source fields.
///
/// This is a grouping key for rough uniqueness counts, not an identifier.
#[must_use]
pub fn compute_fingerprint(
    ip: &str,
    browser: &str,
    os: &str,
    timezone: &str,
    user_agent: &str,
) -> String {
    format!("{ip}|{browser}|{os}|{timezone}|{user_agent}")
}

/// Generate a record id from the capture time and a random suffix.
#[must_use]
pub fn generate_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect();
    format!("{}-{suffix}", now.timestamp_millis())
}
