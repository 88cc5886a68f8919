//! Conversation log: a best-effort transcript of each user's turns.
//!
//! Nothing in the session flow depends on the log; failures are reported to
//! the caller, who logs and moves on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::message::UserId;

/// One side of a turn. Serializes as `{"user_message": ...}` or
/// `{"bot_response": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatTurn {
    UserMessage(String),
    BotResponse(String),
}

/// A timestamped transcript line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub turn: ChatTurn,
}

impl ChatLogEntry {
    pub fn now(turn: ChatTurn) -> Self {
        Self {
            timestamp: Utc::now(),
            turn,
        }
    }
}

#[async_trait]
pub trait ConversationLog: Send + Sync {
    fn name(&self) -> &str;

    /// Append one turn to the user's transcript.
    async fn append(&self, user: &UserId, turn: ChatTurn) -> Result<(), PersistenceError>;
}
