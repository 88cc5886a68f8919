//! File naming for stored attachments and produced artifacts.
//!
//! Input files embed the user and the declared type:
//! `{user}_{person|garment|None}_{timestamp}.png`. Artifacts are named by the
//! SHA-256 of `{user}_output_{timestamp}` so their URLs do not leak the user.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::image::ImageKind;
use crate::message::UserId;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6f";

/// File name for a stored input image.
pub fn input_file_name(user: &UserId, kind: ImageKind, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.png",
        user.file_stem(),
        kind.file_tag(),
        at.format(TIMESTAMP_FORMAT)
    )
}

/// Full path for a stored input image under `dir`.
pub fn input_path(dir: &Path, user: &UserId, kind: ImageKind) -> PathBuf {
    dir.join(input_file_name(user, kind, Utc::now()))
}

/// File name for a produced artifact.
pub fn artifact_file_name(user: &UserId, at: DateTime<Utc>) -> String {
    let seed = format!("{}_output_{}", user.as_str(), at.to_rfc3339());
    let digest = Sha256::digest(seed.as_bytes());
    format!("{}.jpeg", hex::encode(digest))
}

/// Full path for a produced artifact under `dir`.
pub fn artifact_path(dir: &Path, user: &UserId) -> PathBuf {
    dir.join(artifact_file_name(user, Utc::now()))
}

/// Whether `name` is a bare file name (no separators, no parent hops).
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
}
