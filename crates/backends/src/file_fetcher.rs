//! Local-file fetcher, used by the interactive chat and by tests.

use std::path::PathBuf;

use async_trait::async_trait;
use tryon_core::Fetcher;
use tryon_core::error::FetchFailure;

/// Reads `file://` URLs or plain paths from disk.
pub struct FileFetcher;

impl FileFetcher {
    pub fn path_of(source_ref: &str) -> PathBuf {
        let trimmed = source_ref.trim();
        PathBuf::from(trimmed.strip_prefix("file://").unwrap_or(trimmed))
    }
}

#[async_trait]
impl Fetcher for FileFetcher {
    fn name(&self) -> &str {
        "file"
    }

    async fn fetch(&self, source_ref: &str) -> Result<Vec<u8>, FetchFailure> {
        let path = Self::path_of(source_ref);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FetchFailure::Status(404)),
            Err(e) => Err(FetchFailure::Transport(format!("{}: {e}", path.display()))),
        }
    }
}
