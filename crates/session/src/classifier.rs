//! Keyword classification of message text.

use tryon_core::ImageKind;

/// The image type the text declares, if any.
///
/// Matching is a case-insensitive substring check. `garment` wins when both
/// keywords appear.
pub fn declared_kind(text: &str) -> Option<ImageKind> {
    let text = text.trim().to_lowercase();
    if text.contains("garment") {
        Some(ImageKind::Garment)
    } else if text.contains("person") {
        Some(ImageKind::Person)
    } else {
        None
    }
}
