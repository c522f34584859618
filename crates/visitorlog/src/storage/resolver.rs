//! Backend selection for one session.

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;
use crate::record::Record;

use super::{LocalCache, RecordStore, RemoteStore, Source};

/// Records loaded for a session and where they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// Backend that answered.
    pub source: Source,
    /// Records in the order the backend returned them.
    pub records: Vec<Record>,
}

/// Chooses between the remote API and the local cache.
///
/// The remote is tried once; any failure (no remote configured, transport
/// error, non-2xx status, bad payload) selects the local cache.
#[derive(Debug, Clone)]
pub struct StoreResolver {
    cache: LocalCache,
    remote: Option<RemoteStore>,
    list_limit: usize,
}

impl StoreResolver {
    /// Resolver over a cache and an optional remote.
    #[must_use]
    pub fn new(cache: LocalCache, remote: Option<RemoteStore>, list_limit: usize) -> Self {
        Self {
            cache,
            remote,
            list_limit,
        }
    }

    /// Resolver for the page at `page_path`, configured by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config, page_path: &str) -> Result<Self> {
        Ok(Self::new(
            LocalCache::from_config(config),
            RemoteStore::from_config(config, page_path)?,
            config.server.max_list_limit,
        ))
    }

    /// The local cache.
    #[must_use]
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// The remote, if one is configured.
    #[must_use]
    pub fn remote(&self) -> Option<&RemoteStore> {
        self.remote.as_ref()
    }

    /// Load all records, preferring the server.
    ///
    /// A successful server load is mirrored into the local cache.
    pub async fn resolve(&self) -> Resolved {
        if let Some(remote) = &self.remote {
            match remote.list(self.list_limit).await {
                Ok(records) => {
                    self.mirror(&records);
                    return Resolved {
                        source: remote.source(),
                        records,
                    };
                }
                Err(e) => {
                    warn!(url = remote.url(), error = %e, "Visitor API unavailable, using local cache");
                }
            }
        } else {
            debug!("No visitor API configured, using local cache");
        }

        let records = self.cache.read().into_iter().rev().collect();
        Resolved {
            source: Source::BrowserCache,
            records,
        }
    }

    fn mirror(&self, newest_first: &[Record]) {
        let oldest_first: Vec<Record> = newest_first.iter().rev().cloned().collect();
        if let Err(e) = self.cache.write(&oldest_first) {
            warn!(error = %e, "Failed to mirror server records into local cache");
        }
    }
}
