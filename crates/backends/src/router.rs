//! Fetch router: picks a fetcher by the scheme of the source reference.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use tryon_core::Fetcher;
use tryon_core::error::FetchFailure;

pub struct FetchRouter {
    remote: Arc<dyn Fetcher>,
    local: Arc<dyn Fetcher>,
}

impl FetchRouter {
    pub fn new(remote: Arc<dyn Fetcher>, local: Arc<dyn Fetcher>) -> Self {
        Self { remote, local }
    }

    /// The fetcher responsible for `source_ref`.
    pub fn resolve(&self, source_ref: &str) -> &Arc<dyn Fetcher> {
        let lower = source_ref.trim_start().to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            &self.remote
        } else {
            &self.local
        }
    }
}

/// Local fallback that rejects every reference.
pub struct RefuseLocal;

#[async_trait]
impl Fetcher for RefuseLocal {
    fn name(&self) -> &str {
        "refuse-local"
    }

    async fn fetch(&self, source_ref: &str) -> Result<Vec<u8>, FetchFailure> {
        warn!(source = source_ref, "Refusing non-network attachment locator");
        Err(FetchFailure::Status(400))
    }
}

#[async_trait]
impl Fetcher for FetchRouter {
    fn name(&self) -> &str {
        "router"
    }

    async fn fetch(&self, source_ref: &str) -> Result<Vec<u8>, FetchFailure> {
        self.resolve(source_ref).fetch(source_ref).await
    }
}
