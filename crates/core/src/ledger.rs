//! Session ledger trait: per-user attachment records and compositions.
//!
//! Every user owns an ordered list of [`AttachmentRecord`]s. Insertion order
//! matters: selection always returns the most recently inserted unconsumed
//! record of the requested kind.
//!
//! Implementations must make each mutation durable before returning, so a
//! reply built from ledger state never runs ahead of what is on disk.
//! Turn-level serialization is the caller's job (see the session crate's
//! per-user locks); the ledger only guarantees that each call is atomic.

use async_trait::async_trait;

use crate::error::{LedgerError, PersistenceError, ReclassifyError};
use crate::image::{AttachmentRecord, CompositionRecord, ImageKind, latest_unused};
use crate::message::UserId;

/// The core SessionLedger trait.
///
/// Implementations: JSON files, SQLite, in-memory (for testing).
#[async_trait]
pub trait SessionLedger: Send + Sync {
    /// The backend name (e.g., "file", "sqlite", "memory").
    fn name(&self) -> &str;

    /// All records for a user, in insertion order.
    async fn records(&self, user: &UserId) -> Result<Vec<AttachmentRecord>, PersistenceError>;

    /// Append a new record.
    async fn append(&self, user: &UserId, record: AttachmentRecord)
    -> Result<(), PersistenceError>;

    /// Rewrite the type of an unclassified, unconsumed record and move its
    /// asset to a path matching the new type.
    ///
    /// The file move and the metadata update succeed or fail together: on
    /// failure the record still references its original path and type.
    async fn reclassify(
        &self,
        user: &UserId,
        record_id: &str,
        new_kind: ImageKind,
    ) -> Result<AttachmentRecord, ReclassifyError>;

    /// Mark a record consumed. Idempotent.
    async fn mark_consumed(
        &self,
        user: &UserId,
        record_id: &str,
    ) -> Result<AttachmentRecord, LedgerError>;

    /// Atomically mark both records consumed, failing with
    /// [`LedgerError::AlreadyConsumed`] if either one already is.
    ///
    /// This is the select-and-consume step of a composition; no two callers
    /// can both claim the same record.
    async fn claim_pair(
        &self,
        user: &UserId,
        person_id: &str,
        garment_id: &str,
    ) -> Result<(), LedgerError>;

    /// Append a composition record.
    async fn append_composition(
        &self,
        user: &UserId,
        record: CompositionRecord,
    ) -> Result<(), PersistenceError>;

    /// All composition records for a user, oldest first.
    async fn compositions(&self, user: &UserId)
    -> Result<Vec<CompositionRecord>, PersistenceError>;

    /// The newest unconsumed record of `kind`.
    async fn find_latest_unused(
        &self,
        user: &UserId,
        kind: ImageKind,
    ) -> Result<Option<AttachmentRecord>, PersistenceError> {
        let records = self.records(user).await?;
        Ok(latest_unused(&records, kind).cloned())
    }

    /// Whether an unconsumed record of `kind` exists.
    ///
    /// `None` probes for an [`ImageKind::Unclassified`] record specifically,
    /// not for "any kind".
    async fn has_unused(
        &self,
        user: &UserId,
        kind: Option<ImageKind>,
    ) -> Result<bool, PersistenceError> {
        let kind = kind.unwrap_or(ImageKind::Unclassified);
        Ok(self.find_latest_unused(user, kind).await?.is_some())
    }
}
