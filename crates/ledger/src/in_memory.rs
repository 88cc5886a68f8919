//! In-memory ledger, useful for tests and throwaway sessions.
//!
//! Records vanish with the process, but stored assets are still renamed on
//! reclassification so on-disk file names keep matching declared types.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tryon_core::error::{LedgerError, PersistenceError, ReclassifyError};
use tryon_core::{AttachmentRecord, CompositionRecord, ImageKind, SessionLedger, UserId};

use crate::{asset, records};

#[derive(Default)]
struct UserState {
    records: Vec<AttachmentRecord>,
    compositions: Vec<CompositionRecord>,
}

/// A [`SessionLedger`] that keeps everything in a map.
pub struct InMemoryLedger {
    users: RwLock<HashMap<UserId, UserState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionLedger for InMemoryLedger {
    fn name(&self) -> &str {
        "memory"
    }

    async fn records(&self, user: &UserId) -> Result<Vec<AttachmentRecord>, PersistenceError> {
        let users = self.users.read().await;
        Ok(users.get(user).map(|s| s.records.clone()).unwrap_or_default())
    }

    async fn append(
        &self,
        user: &UserId,
        record: AttachmentRecord,
    ) -> Result<(), PersistenceError> {
        let mut users = self.users.write().await;
        users.entry(user.clone()).or_default().records.push(record);
        Ok(())
    }

    async fn reclassify(
        &self,
        user: &UserId,
        record_id: &str,
        new_kind: ImageKind,
    ) -> Result<AttachmentRecord, ReclassifyError> {
        let mut users = self.users.write().await;
        let state = users.entry(user.clone()).or_default();
        let idx = records::reclassify_target(&state.records, record_id, new_kind)?;

        let moved =
            asset::relocate(user, record_id, &state.records[idx].local_path, new_kind).await?;
        let record = &mut state.records[idx];
        record.local_path = moved;
        record.declared_type = new_kind;
        Ok(record.clone())
    }

    async fn mark_consumed(
        &self,
        user: &UserId,
        record_id: &str,
    ) -> Result<AttachmentRecord, LedgerError> {
        let mut users = self.users.write().await;
        let state = users.entry(user.clone()).or_default();
        let (record, _) = records::mark_consumed(&mut state.records, user, record_id)?;
        Ok(record)
    }

    async fn claim_pair(
        &self,
        user: &UserId,
        person_id: &str,
        garment_id: &str,
    ) -> Result<(), LedgerError> {
        let mut users = self.users.write().await;
        let state = users.entry(user.clone()).or_default();
        records::claim_pair(&mut state.records, user, person_id, garment_id)
    }

    async fn append_composition(
        &self,
        user: &UserId,
        record: CompositionRecord,
    ) -> Result<(), PersistenceError> {
        let mut users = self.users.write().await;
        users
            .entry(user.clone())
            .or_default()
            .compositions
            .push(record);
        Ok(())
    }

    async fn compositions(
        &self,
        user: &UserId,
    ) -> Result<Vec<CompositionRecord>, PersistenceError> {
        let users = self.users.read().await;
        Ok(users
            .get(user)
            .map(|s| s.compositions.clone())
            .unwrap_or_default())
    }
}
