//! Compositor trait: the opaque backend that combines a person image and a
//! garment image into a new artifact.
//!
//! The session core never inspects image contents; it hands two local paths
//! to a compositor and records whatever path comes back.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::CompositionError;
use crate::message::UserId;

/// Inputs for one composition.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionRequest {
    /// The user the artifact is produced for
    pub user_id: UserId,
    /// Local path of the person image
    pub person_image: PathBuf,
    /// Local path of the garment image
    pub garment_image: PathBuf,
}

#[async_trait]
pub trait Compositor: Send + Sync {
    /// Backend name (e.g., "merge", "http").
    fn name(&self) -> &str;

    /// Produce a new local artifact and return its path.
    async fn compose(&self, request: CompositionRequest) -> Result<PathBuf, CompositionError>;
}
