//! Read access to produced artifacts for the file-serving edge.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tryon_core::error::{ArtifactError, NotFoundError};
use tryon_core::{SessionLedger, UserId, naming};

pub struct ArtifactStore {
    output_dir: PathBuf,
    ledger: Arc<dyn SessionLedger>,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>, ledger: Arc<dyn SessionLedger>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ledger,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn not_found(name: &str) -> ArtifactError {
        NotFoundError::Artifact {
            name: name.to_string(),
        }
        .into()
    }

    /// Open an artifact by bare file name.
    ///
    /// Names containing separators or `..` are reported as not found.
    pub async fn open(&self, name: &str) -> Result<tokio::fs::File, ArtifactError> {
        if !naming::is_plain_file_name(name) {
            return Err(Self::not_found(name));
        }
        let path = self.output_dir.join(name);
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Self::not_found(name)),
            Err(source) => Err(ArtifactError::Io { path, source }),
        }
    }

    /// Open an artifact only if it belongs to one of `user`'s compositions.
    pub async fn open_for_user(
        &self,
        user: &UserId,
        name: &str,
    ) -> Result<tokio::fs::File, ArtifactError> {
        let owned = self
            .ledger
            .compositions(user)
            .await?
            .iter()
            .any(|c| c.artifact_name() == Some(name));
        if !owned {
            return Err(Self::not_found(name));
        }
        self.open(name).await
    }

    /// Read an artifact fully into memory.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>, ArtifactError> {
        let mut file = self.open(name).await?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .await
            .map_err(|source| ArtifactError::Io {
                path: self.output_dir.join(name),
                source,
            })?;
        Ok(bytes)
    }
}
