//! The per-user session state machine.
//!
//! Each turn is decided from three facts: whether the text declares a type,
//! whether an attachment came with it, and whether an unclassified upload is
//! pending.
//!
//! | declares type | attachment | pending | action                                  |
//! |---------------|------------|---------|-----------------------------------------|
//! | yes           | yes        | any     | store with declared type                |
//! | no            | yes        | any     | store unclassified, ask for the type    |
//! | yes           | no         | no      | ask for the image                       |
//! | yes           | no         | yes     | reclassify the pending upload           |
//! | no            | no         | any     | explain the service                     |
//!
//! After the action the completion check runs against current ledger state:
//! if one unused person image and one unused garment image exist, the
//! composition reply replaces the interim one.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use tryon_config::AppConfig;
use tryon_core::error::{CompositionError, FetchError, PersistenceError, ReclassifyError};
use tryon_core::{
    AttachmentRecord, ChatTurn, Compositor, ConversationLog, Fetcher, ImageKind, InboundEvent,
    OutboundReply, SessionLedger, UserId,
};

use crate::classifier::declared_kind;
use crate::locks::SessionLocks;
use crate::replies;
use crate::retry::RetryPolicy;
use crate::store::AttachmentStore;
use crate::trigger::CompositionTrigger;

/// An attachment download that finished before the turn took its lock.
struct Download {
    source_ref: String,
    kind: ImageKind,
    outcome: Result<PathBuf, FetchError>,
}

pub struct SessionEngine {
    ledger: Arc<dyn SessionLedger>,
    store: AttachmentStore,
    trigger: CompositionTrigger,
    log: Arc<dyn ConversationLog>,
    locks: SessionLocks,
}

impl SessionEngine {
    pub fn new(
        ledger: Arc<dyn SessionLedger>,
        store: AttachmentStore,
        trigger: CompositionTrigger,
        log: Arc<dyn ConversationLog>,
    ) -> Self {
        Self {
            ledger,
            store,
            trigger,
            log,
            locks: SessionLocks::new(),
        }
    }

    /// Wire an engine from configuration and already-built collaborators.
    pub fn from_config(
        config: &AppConfig,
        ledger: Arc<dyn SessionLedger>,
        fetcher: Arc<dyn Fetcher>,
        compositor: Arc<dyn Compositor>,
        log: Arc<dyn ConversationLog>,
    ) -> Self {
        let store = AttachmentStore::new(
            fetcher,
            config.storage.input_dir.clone(),
            RetryPolicy::from_config(&config.fetch),
        );
        let trigger =
            CompositionTrigger::new(ledger.clone(), compositor, config.composition.timeout());
        Self::new(ledger, store, trigger, log)
    }

    pub fn ledger(&self) -> &Arc<dyn SessionLedger> {
        &self.ledger
    }

    /// Process one inbound message. Always produces a reply.
    pub async fn handle(&self, event: InboundEvent) -> OutboundReply {
        let user = event.user_id.clone();
        self.record(&user, ChatTurn::UserMessage(event.text.clone()))
            .await;

        let declared = declared_kind(&event.text);
        debug!(
            user = %user,
            declared = ?declared,
            attachments = event.attachment_count,
            "Inbound message"
        );

        // Downloads run outside the lock; only ledger work is serialized.
        let download = match event.attachment() {
            Some(source_ref) => {
                let kind = declared.unwrap_or(ImageKind::Unclassified);
                let outcome = self.store.fetch(&user, source_ref, kind).await;
                Some(Download {
                    source_ref: source_ref.to_string(),
                    kind,
                    outcome,
                })
            }
            None => None,
        };

        let reply = {
            let _guard = self.locks.acquire(&user).await;
            match self.turn(&user, declared, download).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!(user = %user, error = %e, "Session state could not be saved");
                    OutboundReply::text(replies::INTERNAL_ERROR)
                }
            }
        };

        self.record(&user, ChatTurn::BotResponse(reply.text.clone()))
            .await;
        reply
    }

    async fn record(&self, user: &UserId, turn: ChatTurn) {
        if let Err(e) = self.log.append(user, turn).await {
            warn!(user = %user, error = %e, "Failed to append to conversation log");
        }
    }

    async fn missing(&self, user: &UserId, kind: ImageKind) -> Result<Option<ImageKind>, PersistenceError> {
        let Some(other) = kind.complement() else {
            return Ok(None);
        };
        let present = self.ledger.has_unused(user, Some(other)).await?;
        Ok((!present).then_some(other))
    }

    async fn turn(
        &self,
        user: &UserId,
        declared: Option<ImageKind>,
        download: Option<Download>,
    ) -> Result<OutboundReply, PersistenceError> {
        let interim = match (declared, download) {
            (_, Some(Download { source_ref, kind, outcome: Ok(path) })) => {
                let record = AttachmentRecord::new(source_ref, &path, kind);
                if let Err(e) = self.ledger.append(user, record).await {
                    if let Err(rm) = tokio::fs::remove_file(&path).await {
                        warn!(path = %path.display(), error = %rm, "Failed to remove orphaned attachment");
                    }
                    return Err(e);
                }
                if kind.is_classified() {
                    replies::received(kind, self.missing(user, kind).await?)
                } else {
                    replies::SPECIFY_TYPE.to_string()
                }
            }
            (_, Some(Download { outcome: Err(e), .. })) => {
                warn!(user = %user, error = %e, "Attachment could not be fetched");
                replies::FETCH_FAILED.to_string()
            }
            (Some(kind), None) => self.apply_declared_type(user, kind).await?,
            (None, None) => replies::INTRO.to_string(),
        };

        if self.ready(user).await? {
            return self.fire(user, interim).await;
        }
        Ok(OutboundReply::text(interim))
    }

    async fn apply_declared_type(
        &self,
        user: &UserId,
        kind: ImageKind,
    ) -> Result<String, PersistenceError> {
        let Some(pending) = self
            .ledger
            .find_latest_unused(user, ImageKind::Unclassified)
            .await?
        else {
            return Ok(replies::send_image(kind));
        };

        match self.ledger.reclassify(user, &pending.id, kind).await {
            Ok(record) => {
                info!(user = %user, record = %record.id, kind = %kind, "Reclassified pending image");
                Ok(replies::reclassified(kind, self.missing(user, kind).await?))
            }
            Err(ReclassifyError::Persistence(e)) => Err(e),
            Err(e) => {
                warn!(user = %user, record = %pending.id, error = %e, "Reclassification refused");
                Ok(replies::RECLASSIFY_FAILED.to_string())
            }
        }
    }

    async fn ready(&self, user: &UserId) -> Result<bool, PersistenceError> {
        Ok(self.ledger.has_unused(user, Some(ImageKind::Garment)).await?
            && self.ledger.has_unused(user, Some(ImageKind::Person)).await?)
    }

    async fn fire(&self, user: &UserId, interim: String) -> Result<OutboundReply, PersistenceError> {
        match self.trigger.compose(user).await {
            Ok(record) => {
                Ok(OutboundReply::with_artifact(replies::COMPOSED, record.output_image))
            }
            Err(CompositionError::Persistence(e)) => Err(e),
            Err(CompositionError::PreconditionLost { reason }) => {
                debug!(user = %user, reason = %reason, "Pair already claimed");
                Ok(OutboundReply::text(interim))
            }
            Err(e) => {
                warn!(user = %user, error = %e, "Composition failed");
                Ok(OutboundReply::text(replies::COMPOSITION_FAILED))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Duration;
    use tryon_core::CompositionRequest;
    use tryon_core::error::FetchFailure;
    use tryon_ledger::{InMemoryLedger, NoopConversationLog};

    struct MapFetcher(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl Fetcher for MapFetcher {
        fn name(&self) -> &str {
            "map"
        }
        async fn fetch(&self, source_ref: &str) -> Result<Vec<u8>, FetchFailure> {
            self.0
                .get(source_ref)
                .cloned()
                .ok_or(FetchFailure::Status(404))
        }
    }

    struct CopyPerson(PathBuf);

    #[async_trait]
    impl Compositor for CopyPerson {
        fn name(&self) -> &str {
            "copy"
        }
        async fn compose(&self, request: CompositionRequest) -> Result<PathBuf, CompositionError> {
            let out = self.0.join("out.jpeg");
            tokio::fs::copy(&request.person_image, &out)
                .await
                .map_err(|e| CompositionError::Backend {
                    backend: "copy".into(),
                    reason: e.to_string(),
                })?;
            Ok(out)
        }
    }

    fn engine(dir: &Path) -> (SessionEngine, Arc<InMemoryLedger>) {
        let ledger = Arc::new(InMemoryLedger::new());
        let fetcher = MapFetcher(HashMap::from([
            ("m/person".to_string(), b"person".to_vec()),
            ("m/garment".to_string(), b"garment".to_vec()),
        ]));
        let policy = RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(1),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
        };
        let store = AttachmentStore::new(Arc::new(fetcher), dir.join("in"), policy);
        let trigger = CompositionTrigger::new(
            ledger.clone(),
            Arc::new(CopyPerson(dir.to_path_buf())),
            Duration::from_secs(5),
        );
        let engine = SessionEngine::new(ledger.clone(), store, trigger, Arc::new(NoopConversationLog));
        (engine, ledger)
    }

    #[tokio::test]
    async fn plain_text_explains_service() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, ledger) = engine(dir.path());
        let reply = engine.handle(InboundEvent::text("u1", "hi")).await;
        assert_eq!(reply.text, replies::INTRO);
        assert!(reply.artifact.is_none());
        assert!(ledger.records(&UserId::new("u1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn type_without_image_or_pending_asks_for_image() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, ledger) = engine(dir.path());
        let reply = engine.handle(InboundEvent::text("u1", "person")).await;
        assert_eq!(reply.text, "Please send the person image to proceed.");
        assert!(ledger.records(&UserId::new("u1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn typed_upload_then_pair_composes() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, ledger) = engine(dir.path());
        let user = UserId::new("u1");

        let first = engine
            .handle(InboundEvent::with_attachment("u1", "garment", "m/garment"))
            .await;
        assert_eq!(
            first.text,
            "Got your garment image. Also, please provide the person image."
        );

        let second = engine
            .handle(InboundEvent::with_attachment("u1", "person", "m/person"))
            .await;
        assert_eq!(second.text, replies::COMPOSED);
        assert_eq!(second.artifact, Some(dir.path().join("out.jpeg")));
        assert!(ledger.records(&user).await.unwrap().iter().all(|r| r.consumed));
    }

    #[tokio::test]
    async fn untyped_upload_then_keyword_reclassifies() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, ledger) = engine(dir.path());
        let user = UserId::new("u1");

        let reply = engine
            .handle(InboundEvent::with_attachment("u1", "", "m/garment"))
            .await;
        assert_eq!(reply.text, replies::SPECIFY_TYPE);
        assert!(ledger.has_unused(&user, None).await.unwrap());

        let reply = engine.handle(InboundEvent::text("u1", "Garment")).await;
        assert_eq!(reply.text, "Also, please provide the person image.");

        let records = ledger.records(&user).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].declared_type, ImageKind::Garment);
    }

    #[tokio::test]
    async fn failed_download_leaves_ledger_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, ledger) = engine(dir.path());
        let reply = engine
            .handle(InboundEvent::with_attachment("u1", "person", "m/missing"))
            .await;
        assert_eq!(reply.text, replies::FETCH_FAILED);
        assert!(ledger.records(&UserId::new("u1")).await.unwrap().is_empty());
    }

    /// Put an unused record straight into the ledger, as an earlier process
    /// run might have left it.
    async fn seed(
        ledger: &InMemoryLedger,
        dir: &Path,
        name: &str,
        kind: ImageKind,
    ) -> AttachmentRecord {
        let path = dir.join(name);
        tokio::fs::write(&path, name.as_bytes()).await.unwrap();
        let record = AttachmentRecord::new(format!("m/{name}"), path, kind);
        ledger.append(&UserId::new("u1"), record.clone()).await.unwrap();
        record
    }

    #[tokio::test]
    async fn stale_pair_completes_on_plain_text() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, ledger) = engine(dir.path());
        seed(&ledger, dir.path(), "p.png", ImageKind::Person).await;
        seed(&ledger, dir.path(), "g.png", ImageKind::Garment).await;

        let reply = engine.handle(InboundEvent::text("u1", "hi")).await;
        assert_eq!(reply.text, replies::COMPOSED);
        assert!(reply.artifact.is_some());

        let user = UserId::new("u1");
        assert!(ledger.records(&user).await.unwrap().iter().all(|r| r.consumed));
        assert_eq!(ledger.compositions(&user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn redundant_upload_composes_with_newest_of_its_type() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, ledger) = engine(dir.path());
        let person = seed(&ledger, dir.path(), "p.png", ImageKind::Person).await;
        let old_garment = seed(&ledger, dir.path(), "g.png", ImageKind::Garment).await;

        let reply = engine
            .handle(InboundEvent::with_attachment("u1", "garment", "m/garment"))
            .await;
        assert_eq!(reply.text, replies::COMPOSED);

        let user = UserId::new("u1");
        let records = ledger.records(&user).await.unwrap();
        assert_eq!(records.len(), 3);
        let by_id = |id: &str| records.iter().find(|r| r.id == id).unwrap().clone();
        assert!(by_id(&person.id).consumed);
        assert!(!by_id(&old_garment.id).consumed);
        let newest = records.last().unwrap();
        assert_eq!(newest.source_ref, "m/garment");
        assert!(newest.consumed);

        let compositions = ledger.compositions(&user).await.unwrap();
        assert_eq!(compositions.len(), 1);
        assert_eq!(compositions[0].garment_record, newest.id);
        assert!(ledger.has_unused(&user, Some(ImageKind::Garment)).await.unwrap());
    }

    #[tokio::test]
    async fn vanished_pending_image_degrades_to_failure_reply() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, ledger) = engine(dir.path());
        let pending = seed(&ledger, dir.path(), "pending.png", ImageKind::Unclassified).await;
        tokio::fs::remove_file(&pending.local_path).await.unwrap();

        let reply = engine.handle(InboundEvent::text("u1", "person")).await;
        assert_eq!(reply.text, replies::RECLASSIFY_FAILED);

        let records = ledger.records(&UserId::new("u1")).await.unwrap();
        assert_eq!(records, vec![pending]);
    }
}
