//! Fetcher trait: retrieves the bytes behind an attachment locator.
//!
//! A fetcher performs exactly one attempt. Retries, timeouts and local
//! persistence belong to the attachment store in the session crate.

use async_trait::async_trait;

use crate::error::FetchFailure;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Human-readable fetcher name (e.g., "http", "file").
    fn name(&self) -> &str;

    /// Retrieve the bytes for `source_ref` in a single attempt.
    async fn fetch(&self, source_ref: &str) -> Result<Vec<u8>, FetchFailure>;
}
