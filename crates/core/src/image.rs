//! Image classification and the records kept about each attachment.
//!
//! An [`AttachmentRecord`] is created once an attachment has been stored
//! locally. Its `declared_type` may be rewritten once while it is still
//! [`ImageKind::Unclassified`], and `consumed` only ever moves from `false`
//! to `true`. Records are never deleted by the session core.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The declared type of an inbound image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// A photo of the person who will wear the garment
    Person,
    /// A photo of the garment
    Garment,
    /// Uploaded without a type; waiting for the user to name it
    Unclassified,
}

impl ImageKind {
    /// The two kinds a composition needs, in selection order.
    pub const PAIR: [ImageKind; 2] = [ImageKind::Person, ImageKind::Garment];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::Person => "person",
            ImageKind::Garment => "garment",
            ImageKind::Unclassified => "unclassified",
        }
    }

    /// Tag embedded in stored file names. Untyped uploads use `None`.
    pub fn file_tag(&self) -> &'static str {
        match self {
            ImageKind::Person => "person",
            ImageKind::Garment => "garment",
            ImageKind::Unclassified => "None",
        }
    }

    /// The other half of a composition pair.
    pub fn complement(&self) -> Option<ImageKind> {
        match self {
            ImageKind::Person => Some(ImageKind::Garment),
            ImageKind::Garment => Some(ImageKind::Person),
            ImageKind::Unclassified => None,
        }
    }

    pub fn is_classified(&self) -> bool {
        !matches!(self, ImageKind::Unclassified)
    }
}

impl std::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored attachment in a user's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    /// Unique record ID
    pub id: String,

    /// Opaque locator of the original remote asset
    pub source_ref: String,

    /// Where the downloaded bytes live
    pub local_path: PathBuf,

    /// Declared type at the time of the last write
    pub declared_type: ImageKind,

    /// Whether the record has been used as a composition input
    #[serde(default)]
    pub consumed: bool,

    /// When the attachment was stored
    pub created_at: DateTime<Utc>,
}

impl AttachmentRecord {
    /// Create a fresh, unconsumed record.
    pub fn new(
        source_ref: impl Into<String>,
        local_path: impl Into<PathBuf>,
        declared_type: ImageKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_ref: source_ref.into(),
            local_path: local_path.into(),
            declared_type,
            consumed: false,
            created_at: Utc::now(),
        }
    }

    /// Unconsumed and of the requested kind.
    pub fn is_unused(&self, kind: ImageKind) -> bool {
        !self.consumed && self.declared_type == kind
    }
}

/// One successful composition. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionRecord {
    pub id: String,
    pub person_record: String,
    pub garment_record: String,
    pub person_image: PathBuf,
    pub garment_image: PathBuf,
    pub output_image: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl CompositionRecord {
    pub fn new(
        person: &AttachmentRecord,
        garment: &AttachmentRecord,
        output_image: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            person_record: person.id.clone(),
            garment_record: garment.id.clone(),
            person_image: person.local_path.clone(),
            garment_image: garment.local_path.clone(),
            output_image: output_image.into(),
            created_at: Utc::now(),
        }
    }

    /// File name of the produced artifact, if the path has one.
    pub fn artifact_name(&self) -> Option<&str> {
        self.output_image.file_name().and_then(|n| n.to_str())
    }
}

/// Reverse-insertion-order scan for the newest unconsumed record of a kind.
///
/// Older unconsumed records of the same kind are shadowed, never re-surfaced.
pub fn latest_unused(records: &[AttachmentRecord], kind: ImageKind) -> Option<&AttachmentRecord> {
    records.iter().rev().find(|r| r.is_unused(kind))
}
