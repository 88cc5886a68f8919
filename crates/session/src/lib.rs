//! Session core for the try-on bot.
//!
//! An inbound message flows through [`SessionEngine::handle`]:
//! the attachment (if any) is downloaded by the [`AttachmentStore`], the
//! per-user ledger is updated under a [`SessionLocks`] guard, and once one
//! unused person image and one unused garment image exist the
//! [`CompositionTrigger`] produces an artifact.

pub mod artifacts;
pub mod classifier;
pub mod engine;
pub mod locks;
pub mod replies;
pub mod retry;
pub mod store;
pub mod trigger;

pub use artifacts::ArtifactStore;
pub use classifier::declared_kind;
pub use engine::SessionEngine;
pub use locks::SessionLocks;
pub use retry::RetryPolicy;
pub use store::AttachmentStore;
pub use trigger::CompositionTrigger;
