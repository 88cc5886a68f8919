//! Inbound events and outbound replies.
//!
//! These are the value objects exchanged with the transport layer:
//! a user sends text and maybe an attachment → the session engine decides →
//! a reply with mandatory text and an optional artifact goes back.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Hex digits of the identifier hash kept in file stems.
const STEM_HASH_LEN: usize = 12;

/// Identifier of the user owning a session (e.g. a phone number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A filesystem-safe rendering of the identifier.
    ///
    /// Anything outside `[A-Za-z0-9_-]` becomes `_`, and a short SHA-256 of
    /// the raw identifier is appended so `a:b` and `a.b` get different
    /// stems: `whatsapp:+1555` maps to `whatsapp__1555-<12 hex>`.
    pub fn file_stem(&self) -> String {
        let readable: String = self
            .0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let digest = hex::encode(Sha256::digest(self.0.as_bytes()));
        format!("{readable}-{}", &digest[..STEM_HASH_LEN])
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A message received from the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Who sent the message
    pub user_id: UserId,

    /// Raw message text
    #[serde(default)]
    pub text: String,

    /// Number of attachments the transport reported
    #[serde(default)]
    pub attachment_count: u32,

    /// Locator of the first attachment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_ref: Option<String>,
}

impl InboundEvent {
    /// A text-only event.
    pub fn text(user_id: impl Into<UserId>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            attachment_count: 0,
            attachment_ref: None,
        }
    }

    /// An event carrying one attachment.
    pub fn with_attachment(
        user_id: impl Into<UserId>,
        text: impl Into<String>,
        attachment_ref: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            attachment_count: 1,
            attachment_ref: Some(attachment_ref.into()),
        }
    }

    /// The attachment to process, if the transport reported one and gave a
    /// non-empty locator for it.
    pub fn attachment(&self) -> Option<&str> {
        if self.attachment_count == 0 {
            return None;
        }
        self.attachment_ref
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

/// The reply for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundReply {
    /// Plain-text message, always present
    pub text: String,

    /// Location of a produced artifact, only after a successful composition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl OutboundReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            artifact: None,
        }
    }

    pub fn with_artifact(text: impl Into<String>, artifact: impl Into<PathBuf>) -> Self {
        Self {
            text: text.into(),
            artifact: Some(artifact.into()),
        }
    }
}
