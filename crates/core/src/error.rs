//! Error types for the try-on domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type; [`Error`] wraps them all.

use std::path::PathBuf;

use thiserror::Error;

use crate::image::ImageKind;

/// The top-level error type for all try-on operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Attachment retrieval ---
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    // --- Ledger storage ---
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Reclassify error: {0}")]
    Reclassify(#[from] ReclassifyError),

    // --- Composition ---
    #[error("Composition error: {0}")]
    Composition(#[from] CompositionError),

    // --- Lookups ---
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Why a single retrieval attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("unexpected status {0}")]
    Status(u16),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("attempt timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The bytes arrived but could not be written locally. Not retried.
    #[error("could not store attachment: {0}")]
    Storage(String),
}

impl FetchFailure {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchFailure::Storage(_))
    }
}

/// Retrieval gave up after exhausting its attempts.
#[derive(Debug, Clone, Error)]
#[error("failed to fetch {source_ref} after {attempts} attempt(s): {last_cause}")]
pub struct FetchError {
    pub source_ref: String,
    pub attempts: u32,
    pub last_cause: FetchFailure,
}

/// I/O failure while reading or writing durable session state.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("I/O failure on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Corrupt ledger data in {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Database failure: {0}")]
    Database(String),
}

/// Lookup miss. Many callers treat this as "false" or "empty".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("no record {record_id} for user {user}")]
    Record { user: String, record_id: String },

    #[error("no unused {kind} image for user {user}")]
    UnusedImage { user: String, kind: ImageKind },

    #[error("artifact {name} not found")]
    Artifact { name: String },
}

/// Errors from ledger mutations other than reclassification.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("record {record_id} is already consumed")]
    AlreadyConsumed { record_id: String },
}

/// An illegal reclassification was attempted.
#[derive(Debug, Clone, Error)]
pub enum ReclassifyError {
    #[error("record {record_id} does not exist")]
    UnknownRecord { record_id: String },

    #[error("record {record_id} is already classified as {current}")]
    NotUnclassified { record_id: String, current: ImageKind },

    #[error("record {record_id} is already consumed")]
    AlreadyConsumed { record_id: String },

    #[error("cannot reclassify to the unclassified sentinel")]
    TargetUnclassified,

    /// The stored file behind the record is gone, so it cannot be renamed.
    #[error("stored image {path} for record {record_id} is missing")]
    MissingAsset { record_id: String, path: PathBuf },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Composition could not produce an artifact.
#[derive(Debug, Clone, Error)]
pub enum CompositionError {
    /// Another turn consumed the pair first, or one side is missing.
    #[error("composition precondition lost: {reason}")]
    PreconditionLost { reason: String },

    #[error("composition backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    #[error("composition timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<LedgerError> for CompositionError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Persistence(e) => CompositionError::Persistence(e),
            other => CompositionError::PreconditionLost {
                reason: other.to_string(),
            },
        }
    }
}

/// Artifact retrieval failures. Not-found is distinct from I/O errors.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("failed to read artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_displays_cause() {
        let err = Error::Fetch(FetchError {
            source_ref: "https://media.example/abc".into(),
            attempts: 3,
            last_cause: FetchFailure::Status(503),
        });
        let text = err.to_string();
        assert!(text.contains("3 attempt"));
        assert!(text.contains("503"));
    }

    #[test]
    fn storage_failures_are_not_retryable() {
        assert!(FetchFailure::Status(500).is_retryable());
        assert!(FetchFailure::Transport("reset".into()).is_retryable());
        assert!(FetchFailure::Timeout { timeout_ms: 10 }.is_retryable());
        assert!(!FetchFailure::Storage("disk full".into()).is_retryable());
    }

    #[test]
    fn ledger_conflicts_become_lost_precondition() {
        let err: CompositionError = LedgerError::AlreadyConsumed {
            record_id: "r1".into(),
        }
        .into();
        assert!(matches!(err, CompositionError::PreconditionLost { .. }));

        let err: CompositionError = LedgerError::Persistence(PersistenceError::Database(
            "locked".into(),
        ))
        .into();
        assert!(matches!(err, CompositionError::Persistence(_)));
    }

    #[test]
    fn not_found_names_the_kind() {
        let err = NotFoundError::UnusedImage {
            user: "whatsapp:+100".into(),
            kind: ImageKind::Garment,
        };
        assert!(err.to_string().contains("garment"));
    }
}
