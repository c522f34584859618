//! Visitor capture.
//!
//! A [`Recorder`] keeps the current view of the visitor (public IP, location
//! and coordinates) and turns it into one [`Record`] per capture. Each record
//! is written to the local cache before `capture` returns and then sent to the
//! server in the background; the server outcome is only logged.

mod environment;
mod lookup;

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::record::{Reason, Record, RecordDraft, UNAVAILABLE, WAITING};
use crate::storage::{LocalCache, RecordStore, RemoteStore};
use crate::useragent::{classify_browser, classify_os};

pub use environment::{ClientEnvironment, ConnectionInfo};
pub use lookup::{GeoInfo, HttpLookup, IpGeoLookup};

/// A precise position reported by the client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Accuracy radius in meters.
    pub accuracy_m: f64,
}

impl Position {
    /// `lat, lon (±Nm)` with five decimals.
    #[must_use]
    pub fn coords(&self) -> String {
        format!(
            "{:.5}, {:.5} (±{}m)",
            self.latitude,
            self.longitude,
            self.accuracy_m.round()
        )
    }
}

/// Outcome of a precise geolocation request, shown to the user briefly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeolocationStatus {
    /// Coordinates were replaced and a record captured.
    Updated,
    /// The request was denied or timed out; nothing changed.
    Blocked,
}

impl fmt::Display for GeolocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Updated => write!(f, "location updated"),
            Self::Blocked => write!(f, "geolocation blocked"),
        }
    }
}

/// Lookup-derived fields as currently displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Public IP or a placeholder.
    pub ip: String,
    /// Location or a placeholder.
    pub location: String,
    /// Coordinates or a placeholder.
    pub coords: String,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            ip: crate::record::UNKNOWN.to_string(),
            location: crate::record::UNKNOWN.to_string(),
            coords: WAITING.to_string(),
        }
    }
}

/// Captures visitor records for one client session.
pub struct Recorder {
    lookup: Arc<dyn IpGeoLookup>,
    cache: LocalCache,
    remote: Option<RemoteStore>,
    environment: ClientEnvironment,
    snapshot: Snapshot,
    pending: Vec<JoinHandle<()>>,
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("cache", &self.cache)
            .field("remote", &self.remote)
            .field("snapshot", &self.snapshot)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Recorder writing to `cache` and, when given, to `remote`.
    #[must_use]
    pub fn new(
        lookup: Arc<dyn IpGeoLookup>,
        cache: LocalCache,
        remote: Option<RemoteStore>,
        environment: ClientEnvironment,
    ) -> Self {
        Self {
            lookup,
            cache,
            remote,
            environment,
            snapshot: Snapshot::default(),
            pending: Vec::new(),
        }
    }

    /// Recorder wired from configuration with HTTP lookups.
    ///
    /// Without `client.base_url` there is no server to write to.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn from_config(config: &Config, environment: ClientEnvironment) -> Result<Self> {
        let lookup = HttpLookup::from_config(&config.recorder)?;
        let cache = LocalCache::from_config(config);
        let remote = RemoteStore::from_config(config, &environment.page)?;
        Ok(Self::new(Arc::new(lookup), cache, remote, environment))
    }

    /// Current lookup-derived fields.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The observed client attributes.
    #[must_use]
    pub fn environment(&self) -> &ClientEnvironment {
        &self.environment
    }

    /// The local cache records are written to.
    #[must_use]
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Run the IP lookup, then the geo lookup, updating the snapshot.
    ///
    /// Each failure only affects its own fields.
    pub async fn refresh_lookups(&mut self) {
        match self.lookup.public_ip().await {
            Ok(ip) => self.snapshot.ip = ip,
            Err(e) => {
                debug!(error = %e, "Public IP lookup failed");
                self.snapshot.ip = UNAVAILABLE.to_string();
            }
        }

        match self.lookup.geo().await {
            Ok(geo) => {
                self.snapshot.location =
                    geo.location().unwrap_or_else(|| UNAVAILABLE.to_string());
                if let Some(coords) = geo.approx_coords() {
                    self.snapshot.coords = coords;
                }
            }
            Err(e) => {
                debug!(error = %e, "Geo lookup failed");
                self.snapshot.location = UNAVAILABLE.to_string();
                if self.snapshot.coords == WAITING {
                    self.snapshot.coords = UNAVAILABLE.to_string();
                }
            }
        }
    }

    /// Full capture: lookups, then one stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the local cache cannot be written.
    pub async fn capture(&mut self, reason: Reason) -> Result<Record> {
        self.refresh_lookups().await;
        self.record(reason)
    }

    /// Replace the coordinates with a precise fix and capture.
    ///
    /// # Errors
    ///
    /// Returns an error if the local cache cannot be written.
    pub fn apply_precise_position(
        &mut self,
        position: Position,
    ) -> Result<(GeolocationStatus, Record)> {
        self.snapshot.coords = position.coords();
        let record = self.record(Reason::PreciseGeolocation)?;
        Ok((GeolocationStatus::Updated, record))
    }

    /// A precise geolocation request was denied or timed out.
    #[must_use]
    pub fn geolocation_failed(&self) -> GeolocationStatus {
        info!("Precise geolocation unavailable, keeping previous coordinates");
        GeolocationStatus::Blocked
    }

    /// Store one record built from the current snapshot.
    ///
    /// The local write completes before this returns; the server write runs
    /// in the background. Must be called within a Tokio runtime when a
    /// remote is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the local cache cannot be written.
    pub fn record(&mut self, reason: Reason) -> Result<Record> {
        let record = self.draft(&reason).finalize();
        let held = self.cache.push(&record)?;
        debug!(id = record.id(), reason = %reason, held, "Captured visitor record");

        if let Some(remote) = self.remote.clone() {
            let sent = record.clone();
            self.pending.retain(|handle| !handle.is_finished());
            self.pending.push(tokio::spawn(async move {
                if let Err(e) = remote.append(&sent).await {
                    warn!(url = remote.url(), error = %e, "Server write failed, record kept locally");
                }
            }));
        }

        Ok(record)
    }

    /// Wait for background server writes to finish.
    pub async fn flush(&mut self) {
        for handle in self.pending.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "Server write task failed");
            }
        }
    }

    fn draft(&self, reason: &Reason) -> RecordDraft {
        let env = &self.environment;
        RecordDraft {
            page: env.page.clone(),
            reason: reason.as_str().to_string(),
            referrer: env.referrer.clone(),
            ip: self.snapshot.ip.clone(),
            location: self.snapshot.location.clone(),
            coords: self.snapshot.coords.clone(),
            browser: classify_browser(&env.user_agent).to_string(),
            os: classify_os(&env.user_agent).to_string(),
            device: env.device(),
            user_agent: env.user_agent.clone(),
            language: env.language(),
            timezone: env.timezone(),
            viewport: env.viewport(),
            screen: env.screen(),
            network: env.network(),
        }
    }
}
