//! Client of the visitor HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CACHE_CONTROL;
use reqwest::{Client, Response};
use tracing::{debug, warn};

use crate::api::{api_url, ListResponse};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::Record;

use super::{RecordStore, Source};

/// The shared server log, reached over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    url: String,
    http: Client,
}

impl RemoteStore {
    /// Client for the API at `url` (e.g. `http://host:8080/api/visitors`).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }

    /// Client for the API serving `page_path`, when `client.base_url` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config, page_path: &str) -> Result<Option<Self>> {
        config
            .client
            .base_url
            .as_deref()
            .map(|base| {
                Self::new(
                    api_url(base, page_path, &config.client.site_marker),
                    config.request_timeout(),
                )
            })
            .transpose()
    }

    /// The API URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn check(&self, response: Response) -> Result<Response> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Error::api_status(&self.url, response.status().as_u16()))
        }
    }
}

#[async_trait]
impl RecordStore for RemoteStore {
    fn source(&self) -> Source {
        Source::ServerFile {
            url: self.url.clone(),
        }
    }

    async fn list(&self, limit: usize) -> Result<Vec<Record>> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("limit", limit)])
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await?;
        let body: ListResponse = self.check(response)?.json().await?;
        let received = body.records.len();
        let records: Vec<Record> = body
            .records
            .into_iter()
            .filter_map(|value| match serde_json::from_value(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Skipping remote record with mistyped fields");
                    None
                }
            })
            .collect();
        debug!(url = %self.url, received, kept = records.len(), "Listed remote records");
        Ok(records)
    }

    async fn append(&self, record: &Record) -> Result<()> {
        let response = self.http.post(&self.url).json(record).send().await?;
        self.check(response)?;
        debug!(url = %self.url, id = record.id(), "Appended remote record");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let response = self.http.delete(&self.url).send().await?;
        self.check(response)?;
        debug!(url = %self.url, "Cleared remote records");
        Ok(())
    }
}
