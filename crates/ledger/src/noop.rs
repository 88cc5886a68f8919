//! No-op conversation log, used when chat history is disabled.

use async_trait::async_trait;
use tryon_core::error::PersistenceError;
use tryon_core::{ChatTurn, ConversationLog, UserId};

/// A conversation log that records nothing.
pub struct NoopConversationLog;

#[async_trait]
impl ConversationLog for NoopConversationLog {
    fn name(&self) -> &str { "none" }

    async fn append(&self, _user: &UserId, _turn: ChatTurn) -> Result<(), PersistenceError> {
        Ok(())
    }
}
