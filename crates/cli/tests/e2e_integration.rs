//! End-to-end tests for the try-on session pipeline.
//!
//! These drive [`SessionEngine`] through whole conversations with the
//! file-backed ledger and conversation log, using scripted fetchers and
//! compositors in place of the network.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tryon_core::error::{CompositionError, FetchFailure};
use tryon_core::{
    ChatTurn, CompositionRequest, Compositor, Fetcher, ImageKind, InboundEvent, SessionLedger,
    UserId,
};
use tryon_ledger::{FileConversationLog, FileLedger};
use tryon_session::{
    ArtifactStore, AttachmentStore, CompositionTrigger, RetryPolicy, SessionEngine, replies,
};

// ── Mock Fetchers ────────────────────────────────────────────────────────

/// Serves fixed bytes per locator and counts every attempt.
struct ScriptedFetcher {
    images: HashMap<String, Vec<u8>>,
    attempts: AtomicUsize,
}

impl ScriptedFetcher {
    fn new(images: &[(&str, &[u8])]) -> Self {
        Self {
            images: images
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
            attempts: AtomicUsize::new(0),
        }
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Fetcher for ScriptedFetcher {
    fn name(&self) -> &str {
        "e2e_fetcher"
    }

    async fn fetch(&self, source_ref: &str) -> Result<Vec<u8>, FetchFailure> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.images
            .get(source_ref)
            .cloned()
            .ok_or_else(|| FetchFailure::Transport("connection reset".into()))
    }
}

// ── Mock Compositors ─────────────────────────────────────────────────────

/// Concatenates person and garment bytes into a new artifact.
struct ConcatCompositor {
    output_dir: PathBuf,
    calls: AtomicUsize,
    delay: Duration,
}

impl ConcatCompositor {
    fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    fn slow(output_dir: &Path, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(output_dir)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Compositor for ConcatCompositor {
    fn name(&self) -> &str {
        "e2e_concat"
    }

    async fn compose(&self, request: CompositionRequest) -> Result<PathBuf, CompositionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let backend_err = |e: std::io::Error| CompositionError::Backend {
            backend: "e2e_concat".into(),
            reason: e.to_string(),
        };

        let mut bytes = tokio::fs::read(&request.person_image)
            .await
            .map_err(backend_err)?;
        bytes.extend(
            tokio::fs::read(&request.garment_image)
                .await
                .map_err(backend_err)?,
        );

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(backend_err)?;
        let out = self
            .output_dir
            .join(format!("{}_{n}.jpeg", request.user_id.file_stem()));
        tokio::fs::write(&out, bytes).await.map_err(backend_err)?;
        Ok(out)
    }
}

/// Always fails, like a model server that is down.
struct BrokenCompositor;

#[async_trait::async_trait]
impl Compositor for BrokenCompositor {
    fn name(&self) -> &str {
        "e2e_broken"
    }

    async fn compose(&self, _request: CompositionRequest) -> Result<PathBuf, CompositionError> {
        Err(CompositionError::Backend {
            backend: "e2e_broken".into(),
            reason: "model unavailable".into(),
        })
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    engine: Arc<SessionEngine>,
    ledger: Arc<FileLedger>,
    log: Arc<FileConversationLog>,
    root: PathBuf,
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        attempt_timeout: Duration::from_secs(2),
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    }
}

fn harness(root: &Path, fetcher: Arc<dyn Fetcher>, compositor: Arc<dyn Compositor>) -> Harness {
    let ledger = Arc::new(FileLedger::new(
        root.join("input_metadata"),
        root.join("output_metadata"),
    ));
    let log = Arc::new(FileConversationLog::new(root.join("chat_history")));
    let store = AttachmentStore::new(fetcher, root.join("input_images"), fast_retry());
    let trigger = CompositionTrigger::new(ledger.clone(), compositor, Duration::from_secs(5));
    let engine = SessionEngine::new(ledger.clone(), store, trigger, log.clone());
    Harness {
        engine: Arc::new(engine),
        ledger,
        log,
        root: root.to_path_buf(),
    }
}

fn images() -> Arc<ScriptedFetcher> {
    Arc::new(ScriptedFetcher::new(&[
        ("https://media.example/garment", b"GARMENT"),
        ("https://media.example/person", b"PERSON"),
        ("https://media.example/person2", b"PERSON2"),
        ("https://media.example/photo", b"PHOTO"),
    ]))
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_garment_then_person_composes() {
    let dir = tempfile::tempdir().unwrap();
    let compositor = Arc::new(ConcatCompositor::new(&dir.path().join("output_images")));
    let h = harness(dir.path(), images(), compositor.clone());
    let user = UserId::new("whatsapp:+15550001");

    // Garment first: acknowledged, person requested.
    let reply = h
        .engine
        .handle(InboundEvent::with_attachment(
            user.clone(),
            "garment",
            "https://media.example/garment",
        ))
        .await;
    assert!(reply.text.contains("Got your garment image"));
    assert!(reply.text.contains("person image"));
    assert!(reply.artifact.is_none());

    // Person second: composition fires.
    let reply = h
        .engine
        .handle(InboundEvent::with_attachment(
            user.clone(),
            "Person",
            "https://media.example/person",
        ))
        .await;
    assert_eq!(reply.text, replies::COMPOSED);
    let artifact = reply.artifact.expect("artifact path");
    assert_eq!(tokio::fs::read(&artifact).await.unwrap(), b"PERSONGARMENT");
    assert_eq!(compositor.calls(), 1);

    let records = h.ledger.records(&user).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.consumed));
    assert!(!h.ledger.has_unused(&user, Some(ImageKind::Person)).await.unwrap());
    assert!(!h.ledger.has_unused(&user, Some(ImageKind::Garment)).await.unwrap());

    let compositions = h.ledger.compositions(&user).await.unwrap();
    assert_eq!(compositions.len(), 1);
    assert_eq!(compositions[0].output_image, artifact);

    // The artifact can be served by name.
    let artifacts = ArtifactStore::new(h.root.join("output_images"), h.ledger.clone());
    let name = compositions[0].artifact_name().unwrap();
    assert_eq!(artifacts.read(name).await.unwrap(), b"PERSONGARMENT");
}

#[tokio::test]
async fn e2e_untyped_upload_then_type_reclassifies() {
    let dir = tempfile::tempdir().unwrap();
    let compositor = Arc::new(ConcatCompositor::new(&dir.path().join("output_images")));
    let h = harness(dir.path(), images(), compositor.clone());
    let user = UserId::new("u-c");

    let reply = h
        .engine
        .handle(InboundEvent::with_attachment(
            user.clone(),
            "",
            "https://media.example/photo",
        ))
        .await;
    assert_eq!(reply.text, replies::SPECIFY_TYPE);
    let before = h.ledger.records(&user).await.unwrap();
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].declared_type, ImageKind::Unclassified);

    let reply = h
        .engine
        .handle(InboundEvent::text(user.clone(), "garment"))
        .await;
    assert!(reply.text.contains("person image"));

    let after = h.ledger.records(&user).await.unwrap();
    assert_eq!(after.len(), 1, "reclassify must not add records");
    assert_eq!(after[0].id, before[0].id);
    assert_eq!(after[0].declared_type, ImageKind::Garment);
    assert!(!after[0].consumed);
    assert!(after[0].local_path.exists());
    assert!(!before[0].local_path.exists());

    // Supplying the other half now completes the pair.
    let reply = h
        .engine
        .handle(InboundEvent::with_attachment(
            user.clone(),
            "person",
            "https://media.example/person",
        ))
        .await;
    assert_eq!(reply.text, replies::COMPOSED);
    assert_eq!(compositor.calls(), 1);
}

#[tokio::test]
async fn e2e_fetch_exhaustion_leaves_ledger_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = images();
    let compositor = Arc::new(ConcatCompositor::new(&dir.path().join("output_images")));
    let h = harness(dir.path(), fetcher.clone(), compositor.clone());
    let user = UserId::new("u-d");

    h.engine
        .handle(InboundEvent::with_attachment(
            user.clone(),
            "garment",
            "https://media.example/garment",
        ))
        .await;
    let snapshot = h.ledger.records(&user).await.unwrap();
    let attempts_before = fetcher.attempts();

    let reply = h
        .engine
        .handle(InboundEvent::with_attachment(
            user.clone(),
            "person",
            "https://media.example/unreachable",
        ))
        .await;
    assert_eq!(reply.text, replies::FETCH_FAILED);
    assert!(reply.artifact.is_none());
    assert_eq!(fetcher.attempts() - attempts_before, 3);
    assert_eq!(h.ledger.records(&user).await.unwrap(), snapshot);
    assert_eq!(compositor.calls(), 0);

    let stored = std::fs::read_dir(h.root.join("input_images")).unwrap().count();
    assert_eq!(stored, 1, "no file left behind for the failed download");
}

#[tokio::test]
async fn e2e_concurrent_completions_consume_pair_once() {
    let dir = tempfile::tempdir().unwrap();
    let compositor = Arc::new(ConcatCompositor::slow(
        &dir.path().join("output_images"),
        Duration::from_millis(50),
    ));
    let h = harness(dir.path(), images(), compositor.clone());
    let user = UserId::new("u-e");

    h.engine
        .handle(InboundEvent::with_attachment(
            user.clone(),
            "garment",
            "https://media.example/garment",
        ))
        .await;

    let turns = ["https://media.example/person", "https://media.example/person2"]
        .into_iter()
        .map(|source| {
            let engine = h.engine.clone();
            let event = InboundEvent::with_attachment(user.clone(), "person", source);
            async move { engine.handle(event).await }
        });
    let results = futures::future::join_all(turns).await;

    let composed = results.iter().filter(|r| r.artifact.is_some()).count();
    assert_eq!(composed, 1);
    assert_eq!(compositor.calls(), 1);

    let loser = results.iter().find(|r| r.artifact.is_none()).unwrap();
    assert!(loser.text.contains("Got your person image"));
    assert!(loser.text.contains("garment image"));

    let records = h.ledger.records(&user).await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records.iter().filter(|r| r.consumed).count(), 2);
    assert!(h.ledger.has_unused(&user, Some(ImageKind::Person)).await.unwrap());
    assert!(!h.ledger.has_unused(&user, Some(ImageKind::Garment)).await.unwrap());
    assert_eq!(h.ledger.compositions(&user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn e2e_users_do_not_share_state() {
    let dir = tempfile::tempdir().unwrap();
    let compositor = Arc::new(ConcatCompositor::new(&dir.path().join("output_images")));
    let h = harness(dir.path(), images(), compositor.clone());
    let alice = UserId::new("alice");
    let bob = UserId::new("bob");

    h.engine
        .handle(InboundEvent::with_attachment(
            alice.clone(),
            "garment",
            "https://media.example/garment",
        ))
        .await;
    let reply = h
        .engine
        .handle(InboundEvent::with_attachment(
            bob.clone(),
            "person",
            "https://media.example/person",
        ))
        .await;

    assert!(reply.artifact.is_none());
    assert_eq!(compositor.calls(), 0);
    assert_eq!(h.ledger.records(&alice).await.unwrap().len(), 1);
    assert_eq!(h.ledger.records(&bob).await.unwrap().len(), 1);
}

#[tokio::test]
async fn e2e_composition_failure_apologizes_and_keeps_inputs_consumed() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), images(), Arc::new(BrokenCompositor));
    let user = UserId::new("u-f");

    h.engine
        .handle(InboundEvent::with_attachment(
            user.clone(),
            "garment",
            "https://media.example/garment",
        ))
        .await;
    let reply = h
        .engine
        .handle(InboundEvent::with_attachment(
            user.clone(),
            "person",
            "https://media.example/person",
        ))
        .await;

    assert_eq!(reply.text, replies::COMPOSITION_FAILED);
    assert!(reply.artifact.is_none());
    assert!(h.ledger.compositions(&user).await.unwrap().is_empty());
    assert!(h.ledger.records(&user).await.unwrap().iter().all(|r| r.consumed));
}

#[tokio::test]
async fn e2e_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let user = UserId::new("u-r");
    let out = dir.path().join("output_images");

    {
        let h = harness(dir.path(), images(), Arc::new(ConcatCompositor::new(&out)));
        h.engine
            .handle(InboundEvent::with_attachment(
                user.clone(),
                "person",
                "https://media.example/person",
            ))
            .await;
    }

    let compositor = Arc::new(ConcatCompositor::new(&out));
    let h = harness(dir.path(), images(), compositor.clone());
    let reply = h
        .engine
        .handle(InboundEvent::with_attachment(
            user.clone(),
            "garment",
            "https://media.example/garment",
        ))
        .await;
    assert_eq!(reply.text, replies::COMPOSED);
    assert_eq!(compositor.calls(), 1);
}

#[tokio::test]
async fn e2e_transcript_records_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        images(),
        Arc::new(ConcatCompositor::new(&dir.path().join("output_images"))),
    );
    let user = UserId::new("u-t");

    h.engine
        .handle(InboundEvent::text(user.clone(), "hello"))
        .await;
    h.engine
        .handle(InboundEvent::text(user.clone(), "person"))
        .await;

    let entries = h.log.entries(&user).await.unwrap();
    let turns: Vec<_> = entries.into_iter().map(|e| e.turn).collect();
    assert_eq!(
        turns,
        vec![
            ChatTurn::UserMessage("hello".into()),
            ChatTurn::BotResponse(replies::INTRO.into()),
            ChatTurn::UserMessage("person".into()),
            ChatTurn::BotResponse(replies::send_image(ImageKind::Person)),
        ]
    );
}
