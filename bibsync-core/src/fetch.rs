//! Fetching the current bibliography export from the reference manager.

use reqwest::blocking::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid export endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Export endpoint {host} answered {status}")]
    Status {
        host: String,
        status: reqwest::StatusCode,
    },
}

/// Source of fresh export bytes.
pub trait ExportFetcher {
    fn fetch(&self) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP fetcher for an export URL (e.g. a Zotero web API or a
/// Better BibTeX pull export).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    endpoint: Url,
}

impl HttpFetcher {
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| FetchError::InvalidEndpoint(format!("{}", e)))?;
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            endpoint,
        })
    }

    /// Host part of the endpoint; the full URL may carry an API key.
    pub fn host(&self) -> &str {
        self.endpoint.host_str().unwrap_or("<unknown>")
    }
}

impl ExportFetcher for HttpFetcher {
    fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        debug!(host = self.host(), "requesting bibliography export");
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .map_err(|e| FetchError::Http(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                host: self.host().to_string(),
                status,
            });
        }

        let bytes = response
            .bytes()
            .map_err(|e| FetchError::Http(e.without_url()))?;
        info!(host = self.host(), bytes = bytes.len(), "fetched bibliography export");
        Ok(bytes.to_vec())
    }
}
