//! Per-user turn serialization.
//!
//! Each user gets an async mutex; turns for the same user run one at a time,
//! turns for different users never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tryon_core::UserId;

const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Default)]
pub struct SessionLocks {
    users: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user`'s session.
    pub async fn acquire(&self, user: &UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());

            // Drop entries nobody is holding or waiting on.
            if users.len() > PRUNE_THRESHOLD {
                users.retain(|_, lock| Arc::strong_count(lock) > 1);
            }

            users.entry(user.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of users with a lock entry.
    pub fn len(&self) -> usize {
        self.users.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
