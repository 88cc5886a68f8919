//! HTTP fetcher for media URLs delivered by the messaging provider.
//!
//! Media URLs from the provider usually need the account credentials, sent as
//! HTTP basic auth. One call is one attempt; retries belong to the caller.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use tryon_core::error::FetchFailure;
use tryon_core::{Error, Fetcher};

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    username: Option<String>,
    password: Option<String>,
}

impl HttpFetcher {
    pub fn new(
        timeout: Duration,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            timeout,
            username,
            password,
        })
    }

    fn classify(&self, e: reqwest::Error) -> FetchFailure {
        if e.is_timeout() {
            FetchFailure::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            FetchFailure::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, source_ref: &str) -> Result<Vec<u8>, FetchFailure> {
        let mut request = self.client.get(source_ref);
        if let Some(user) = &self.username {
            request = request.basic_auth(user, self.password.as_deref());
        }

        debug!(source = source_ref, "Downloading attachment");
        let response = request.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(source = source_ref, status = status.as_u16(), "Attachment download refused");
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(bytes.to_vec())
    }
}
