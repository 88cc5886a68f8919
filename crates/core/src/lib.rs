//! # Try-on Core
//!
//! Domain types, traits, and error definitions for the virtual try-on intake
//! pipeline. This crate has **zero framework dependencies**: it defines the
//! session model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the session engine is a trait here:
//! - [`SessionLedger`]: per-user attachment records and composition history
//! - [`Fetcher`]: retrieves the bytes behind an attachment reference
//! - [`Compositor`]: the opaque backend that combines two images
//! - [`ConversationLog`]: best-effort transcript of each turn
//!
//! Implementations live in their respective crates, so storage and backends
//! can be swapped via configuration and replaced with stubs in tests.

pub mod compositor;
pub mod error;
pub mod fetch;
pub mod history;
pub mod image;
pub mod ledger;
pub mod message;
pub mod naming;

// Re-export key types at crate root for ergonomics
pub use compositor::{CompositionRequest, Compositor};
pub use error::{Error, Result};
pub use fetch::Fetcher;
pub use history::{ChatLogEntry, ChatTurn, ConversationLog};
pub use image::{AttachmentRecord, CompositionRecord, ImageKind};
pub use ledger::SessionLedger;
pub use message::{InboundEvent, OutboundReply, UserId};
