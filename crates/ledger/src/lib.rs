//! Session ledger and conversation log implementations.
//!
//! - [`FileLedger`]: one pretty-printed JSON file per user, reloaded on every
//!   read and atomically rewritten on every mutation
//! - [`SqliteLedger`]: a single SQLite database shared by all users
//! - [`InMemoryLedger`]: for tests and throwaway sessions
//! - [`FileConversationLog`] and [`NoopConversationLog`]: transcripts

mod asset;
pub mod file_backend;
pub mod history;
pub mod in_memory;
pub mod noop;
mod records;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use file_backend::FileLedger;
pub use history::FileConversationLog;
pub use in_memory::InMemoryLedger;
pub use noop::NoopConversationLog;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedger;

use std::sync::Arc;

use tryon_config::AppConfig;
use tryon_core::error::PersistenceError;
use tryon_core::{ConversationLog, SessionLedger};

/// Build the configured ledger backend.
pub async fn build_from_config(
    config: &AppConfig,
) -> Result<Arc<dyn SessionLedger>, PersistenceError> {
    let storage = &config.storage;
    match storage.ledger_backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryLedger::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(SqliteLedger::new(&storage.sqlite_path).await?)),
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => Err(PersistenceError::Database(
            "built without the sqlite feature".into(),
        )),
        _ => Ok(Arc::new(FileLedger::new(
            storage.input_metadata_dir.clone(),
            storage.output_metadata_dir.clone(),
        ))),
    }
}

/// Build the configured conversation log.
pub fn build_conversation_log(config: &AppConfig) -> Arc<dyn ConversationLog> {
    if config.chat_history.enabled {
        Arc::new(FileConversationLog::new(
            config.storage.chat_history_dir.clone(),
        ))
    } else {
        Arc::new(NoopConversationLog)
    }
}
