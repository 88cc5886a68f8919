//! File-based ledger: one JSON document per user.
//!
//! Attachment records live in `{input_metadata_dir}/{user}_metadata.json`,
//! compositions in `{output_metadata_dir}/{user}_metadata.json`. Both are
//! pretty-printed JSON arrays in insertion order.
//!
//! Every read goes back to disk, so records written by another process (or
//! edited by hand) are picked up on the next turn. Every mutation writes a
//! sibling `.tmp` file and renames it over the original, holding a lock for
//! that user only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};
use tryon_core::error::{LedgerError, PersistenceError, ReclassifyError};
use tryon_core::{AttachmentRecord, CompositionRecord, ImageKind, SessionLedger, UserId};

use crate::asset::{self, io_error};
use crate::records;

/// A JSON-file-backed [`SessionLedger`].
pub struct FileLedger {
    metadata_dir: PathBuf,
    output_metadata_dir: PathBuf,
    write_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

const PRUNE_THRESHOLD: usize = 10_000;

impl FileLedger {
    pub fn new(metadata_dir: impl Into<PathBuf>, output_metadata_dir: impl Into<PathBuf>) -> Self {
        let metadata_dir = metadata_dir.into();
        let output_metadata_dir = output_metadata_dir.into();
        debug!(
            records = %metadata_dir.display(),
            compositions = %output_metadata_dir.display(),
            "File ledger ready"
        );
        Self {
            metadata_dir,
            output_metadata_dir,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the user's attachment metadata file.
    pub fn records_path(&self, user: &UserId) -> PathBuf {
        self.metadata_dir
            .join(format!("{}_metadata.json", user.file_stem()))
    }

    /// Path of the user's composition metadata file.
    pub fn compositions_path(&self, user: &UserId) -> PathBuf {
        self.output_metadata_dir
            .join(format!("{}_metadata.json", user.file_stem()))
    }

    /// Serialize read-modify-write cycles on one user's files.
    async fn lock_user(&self, user: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.write_locks.lock().unwrap_or_else(|e| e.into_inner());
            if locks.len() > PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(user.file_stem()).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn load<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, PersistenceError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(path, e)),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            warn!(path = %path.display(), error = %e, "Unreadable ledger file");
            PersistenceError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })
    }

    async fn save<T: Serialize>(path: &Path, items: &[T]) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let body = serde_json::to_string_pretty(items).map_err(|e| PersistenceError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(path, e));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionLedger for FileLedger {
    fn name(&self) -> &str {
        "file"
    }

    async fn records(&self, user: &UserId) -> Result<Vec<AttachmentRecord>, PersistenceError> {
        Self::load(&self.records_path(user)).await
    }

    async fn append(
        &self,
        user: &UserId,
        record: AttachmentRecord,
    ) -> Result<(), PersistenceError> {
        let _guard = self.lock_user(user).await;
        let path = self.records_path(user);
        let mut all: Vec<AttachmentRecord> = Self::load(&path).await?;
        debug!(user = %user, record = %record.id, kind = %record.declared_type, "Appending record");
        all.push(record);
        Self::save(&path, &all).await
    }

    async fn reclassify(
        &self,
        user: &UserId,
        record_id: &str,
        new_kind: ImageKind,
    ) -> Result<AttachmentRecord, ReclassifyError> {
        let _guard = self.lock_user(user).await;
        let path = self.records_path(user);
        let mut all: Vec<AttachmentRecord> = Self::load(&path).await?;
        let idx = records::reclassify_target(&all, record_id, new_kind)?;

        let original = all[idx].local_path.clone();
        let moved = asset::relocate(user, record_id, &original, new_kind).await?;
        all[idx].local_path = moved.clone();
        all[idx].declared_type = new_kind;

        if let Err(e) = Self::save(&path, &all).await {
            asset::restore(&moved, &original).await;
            return Err(e.into());
        }
        debug!(user = %user, record = record_id, kind = %new_kind, "Reclassified record");
        Ok(all[idx].clone())
    }

    async fn mark_consumed(
        &self,
        user: &UserId,
        record_id: &str,
    ) -> Result<AttachmentRecord, LedgerError> {
        let _guard = self.lock_user(user).await;
        let path = self.records_path(user);
        let mut all: Vec<AttachmentRecord> = Self::load(&path).await?;
        let (record, changed) = records::mark_consumed(&mut all, user, record_id)?;
        if changed {
            Self::save(&path, &all).await?;
        }
        Ok(record)
    }

    async fn claim_pair(
        &self,
        user: &UserId,
        person_id: &str,
        garment_id: &str,
    ) -> Result<(), LedgerError> {
        let _guard = self.lock_user(user).await;
        let path = self.records_path(user);
        let mut all: Vec<AttachmentRecord> = Self::load(&path).await?;
        records::claim_pair(&mut all, user, person_id, garment_id)?;
        Self::save(&path, &all).await?;
        Ok(())
    }

    async fn append_composition(
        &self,
        user: &UserId,
        record: CompositionRecord,
    ) -> Result<(), PersistenceError> {
        let _guard = self.lock_user(user).await;
        let path = self.compositions_path(user);
        let mut all: Vec<CompositionRecord> = Self::load(&path).await?;
        all.push(record);
        Self::save(&path, &all).await
    }

    async fn compositions(
        &self,
        user: &UserId,
    ) -> Result<Vec<CompositionRecord>, PersistenceError> {
        Self::load(&self.compositions_path(user)).await
    }
}
