//! Attachment store: download with retry, then persist under a fresh name.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use tryon_core::error::{FetchError, FetchFailure};
use tryon_core::{Fetcher, ImageKind, UserId, naming};

use crate::retry::RetryPolicy;

pub struct AttachmentStore {
    fetcher: Arc<dyn Fetcher>,
    input_dir: PathBuf,
    policy: RetryPolicy,
}

impl AttachmentStore {
    pub fn new(fetcher: Arc<dyn Fetcher>, input_dir: impl Into<PathBuf>, policy: RetryPolicy) -> Self {
        Self {
            fetcher,
            input_dir: input_dir.into(),
            policy,
        }
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    /// Download `source_ref` and write it to a new file tagged with `kind`.
    ///
    /// Writes exactly one file on success and never overwrites an existing
    /// one.
    pub async fn fetch(
        &self,
        user: &UserId,
        source_ref: &str,
        kind: ImageKind,
    ) -> Result<PathBuf, FetchError> {
        let bytes = self
            .policy
            .run(source_ref, || self.fetcher.fetch(source_ref))
            .await?;

        let path = self.persist(user, kind, &bytes).await.map_err(|e| {
            FetchError {
                source_ref: source_ref.to_string(),
                attempts: 1,
                last_cause: FetchFailure::Storage(e.to_string()),
            }
        })?;

        info!(
            user = %user,
            kind = %kind,
            path = %path.display(),
            bytes = bytes.len(),
            fetcher = self.fetcher.name(),
            "Stored attachment"
        );
        Ok(path)
    }

    async fn persist(&self, user: &UserId, kind: ImageKind, bytes: &[u8]) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.input_dir).await?;

        let base = naming::input_path(&self.input_dir, user, kind);
        let mut candidate = base.clone();
        let mut bump = 0u32;
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(mut file) => {
                    file.write_all(bytes).await?;
                    file.flush().await?;
                    return Ok(candidate);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    bump += 1;
                    let stem = base
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("image");
                    candidate = self.input_dir.join(format!("{stem}-{bump}.png"));
                    debug!(path = %candidate.display(), "Name taken, trying next");
                }
                Err(e) => return Err(e),
            }
        }
    }
}
