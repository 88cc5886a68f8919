//! User-facing reply texts.

use tryon_core::ImageKind;

pub const SPECIFY_TYPE: &str = "Please specify the image type for the uploaded image.";
pub const INTRO: &str = "Please provide an image along with its type (garment or person) to use the virtual try-on service.";
pub const FETCH_FAILED: &str = "Failed to process the image. Please try again.";
pub const RECLASSIFY_FAILED: &str = "Failed to process your request. Please try again.";
pub const COMPOSED: &str = "Here is the virtual try-on image!";
pub const COMPOSITION_FAILED: &str =
    "Sorry, we could not generate the try-on image. Please send both images again.";
pub const INTERNAL_ERROR: &str =
    "An error occurred while processing your request. Please try again later.";

fn nudge(missing: Option<ImageKind>) -> String {
    match missing {
        Some(kind) => format!("Also, please provide the {kind} image."),
        None => String::new(),
    }
}

/// Acknowledge a typed upload, naming the other half if it is still missing.
pub fn received(kind: ImageKind, missing: Option<ImageKind>) -> String {
    let ack = format!("Got your {kind} image.");
    match missing {
        Some(_) => format!("{ack} {}", nudge(missing)),
        None => ack,
    }
}

/// A type was named but there is no image to apply it to.
pub fn send_image(kind: ImageKind) -> String {
    format!("Please send the {kind} image to proceed.")
}

/// A pending upload was given its type.
pub fn reclassified(kind: ImageKind, missing: Option<ImageKind>) -> String {
    match missing {
        Some(_) => nudge(missing),
        None => format!("Got it, marked your image as {kind}."),
    }
}
