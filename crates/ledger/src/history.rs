//! File-backed conversation log.
//!
//! Each user gets `{dir}/{user}.jsonl`; every line is one [`ChatLogEntry`].
//! Lines are only ever appended.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tryon_core::error::PersistenceError;
use tryon_core::{ChatLogEntry, ChatTurn, ConversationLog, UserId};

use crate::asset::io_error;

pub struct FileConversationLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConversationLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path_for(&self, user: &UserId) -> PathBuf {
        self.dir.join(format!("{}.jsonl", user.file_stem()))
    }

    /// Read a user's transcript back, skipping lines that fail to parse.
    pub async fn entries(&self, user: &UserId) -> Result<Vec<ChatLogEntry>, PersistenceError> {
        let path = self.path_for(user);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&path, e)),
        };
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[async_trait]
impl ConversationLog for FileConversationLog {
    fn name(&self) -> &str {
        "file"
    }

    async fn append(&self, user: &UserId, turn: ChatTurn) -> Result<(), PersistenceError> {
        let path = self.path_for(user);
        let mut line = serde_json::to_string(&ChatLogEntry::now(turn)).map_err(|e| {
            PersistenceError::Corrupt {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error(&self.dir, e))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| io_error(&path, e))?;
        file.flush().await.map_err(|e| io_error(&path, e))?;
        Ok(())
    }
}
