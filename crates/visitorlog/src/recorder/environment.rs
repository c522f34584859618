//! Client-observable attributes of the visiting browser.

use crate::record::UNKNOWN;
use crate::useragent::classify_device;

/// Connection details reported by the network information API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionInfo {
    /// Effective connection type, e.g. `4g`.
    pub effective_type: Option<String>,
    /// Estimated downlink in Mbps.
    pub downlink_mbps: Option<f64>,
}

/// Everything the recorder can observe about the client without a lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientEnvironment {
    /// Page path being visited.
    pub page: String,
    /// Referring URL; empty for direct visits.
    pub referrer: String,
    /// Raw user-agent string.
    pub user_agent: String,
    /// Preferred languages, most preferred first.
    pub languages: Vec<String>,
    /// IANA timezone name.
    pub timezone: Option<String>,
    /// Window size in CSS pixels.
    pub viewport: Option<(u32, u32)>,
    /// Screen size in CSS pixels.
    pub screen: Option<(u32, u32)>,
    /// Device pixel ratio; treated as 1 when unknown.
    pub device_pixel_ratio: Option<f64>,
    /// Maximum simultaneous touch points.
    pub max_touch_points: u32,
    /// Logical processors.
    pub hardware_concurrency: Option<u32>,
    /// Approximate memory in GB.
    pub device_memory_gb: Option<f64>,
    /// Whether the client is online.
    pub online: bool,
    /// Connection details, when the client exposes them.
    pub connection: Option<ConnectionInfo>,
}

impl Default for ClientEnvironment {
    fn default() -> Self {
        Self {
            page: "/".to_string(),
            referrer: String::new(),
            user_agent: String::new(),
            languages: Vec::new(),
            timezone: None,
            viewport: None,
            screen: None,
            device_pixel_ratio: None,
            max_touch_points: 0,
            hardware_concurrency: None,
            device_memory_gb: None,
            online: true,
            connection: None,
        }
    }
}

impl ClientEnvironment {
    /// Environment of the local process.
    ///
    /// Reads the system timezone (`TZ` first), `LANGUAGE`/`LANG` and the
    /// logical CPU count; the rest stays unknown until the caller fills it in.
    #[must_use]
    pub fn detect() -> Self {
        let timezone = detect_timezone(std::env::var("TZ").ok());
        let languages = std::env::var("LANGUAGE")
            .ok()
            .filter(|l| !l.is_empty())
            .map(|l| l.split(':').map(posix_to_bcp47).collect())
            .or_else(|| {
                std::env::var("LANG")
                    .ok()
                    .filter(|l| !l.is_empty() && l != "C" && l != "POSIX")
                    .map(|l| vec![posix_to_bcp47(&l)])
            })
            .unwrap_or_default();
        let hardware_concurrency = std::thread::available_parallelism()
            .ok()
            .and_then(|n| u32::try_from(n.get()).ok());

        Self {
            user_agent: format!(
                "{}/{} ({})",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS
            ),
            languages,
            timezone,
            hardware_concurrency,
            ..Self::default()
        }
    }

    /// Device description with thread and memory annotations.
    #[must_use]
    pub fn device(&self) -> String {
        let mut device = classify_device(&self.user_agent, self.max_touch_points).to_string();
        if let Some(threads) = self.hardware_concurrency.filter(|n| *n > 0) {
            device.push_str(&format!(", {threads} threads"));
        }
        if let Some(mem) = self.device_memory_gb.filter(|m| *m > 0.0) {
            device.push_str(&format!(", {mem}GB mem"));
        }
        device
    }

    /// Up to three preferred languages joined with `, `.
    #[must_use]
    pub fn language(&self) -> String {
        let langs: Vec<&str> = self
            .languages
            .iter()
            .map(|l| l.as_str().trim())
            .filter(|l| !l.is_empty())
            .take(3)
            .collect();
        if langs.is_empty() {
            UNKNOWN.to_string()
        } else {
            langs.join(", ")
        }
    }

    /// Timezone name or `unknown`.
    #[must_use]
    pub fn timezone(&self) -> String {
        self.timezone
            .clone()
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// `WxH` of the window.
    #[must_use]
    pub fn viewport(&self) -> String {
        self.viewport
            .map_or_else(|| UNKNOWN.to_string(), |(w, h)| format!("{w}x{h}"))
    }

    /// `WxH @ Dx` of the screen.
    #[must_use]
    pub fn screen(&self) -> String {
        let ratio = self.device_pixel_ratio.filter(|r| *r > 0.0).unwrap_or(1.0);
        self.screen.map_or_else(
            || UNKNOWN.to_string(),
            |(w, h)| format!("{w}x{h} @ {ratio}x"),
        )
    }

    /// `offline`, `online`, or `<type> <downlink>Mbps`.
    #[must_use]
    pub fn network(&self) -> String {
        if !self.online {
            return "offline".to_string();
        }
        let Some(connection) = &self.connection else {
            return "online".to_string();
        };
        let kind = connection
            .effective_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(UNKNOWN);
        match connection.downlink_mbps.filter(|d| *d > 0.0) {
            Some(downlink) => format!("{kind} {downlink}Mbps"),
            None => format!("{kind} ?Mbps"),
        }
    }
}

fn detect_timezone(tz_env: Option<String>) -> Option<String> {
    tz_env
        .map(|tz| tz.trim_start_matches(':').to_string())
        .filter(|tz| !tz.is_empty())
        .or_else(|| iana_time_zone::get_timezone().ok())
        .filter(|tz| !tz.is_empty())
}

fn posix_to_bcp47(locale: &str) -> String {
    locale
        .split(['.', '@'])
        .next()
        .unwrap_or(locale)
        .replace('_', "-")
}
