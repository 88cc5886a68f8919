//! Merge compositor: pastes the person and garment images side by side.
//!
//! Lets the whole pipeline run without a model server. The canvas is
//! `person.width + garment.width` wide and as tall as the taller input,
//! person on the left, garment on the right, encoded as JPEG.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImage, ImageError, RgbImage};
use tracing::debug;
use tryon_core::error::CompositionError;
use tryon_core::{CompositionRequest, Compositor, naming};

const BACKEND: &str = "merge";
const JPEG_QUALITY: u8 = 90;

pub struct MergeCompositor {
    output_dir: PathBuf,
}

impl MergeCompositor {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn backend_error(reason: impl Into<String>) -> CompositionError {
        CompositionError::Backend {
            backend: BACKEND.into(),
            reason: reason.into(),
        }
    }

    async fn read(path: &Path) -> Result<Vec<u8>, CompositionError> {
        tokio::fs::read(path)
            .await
            .map_err(|e| Self::backend_error(format!("{}: {e}", path.display())))
    }
}

/// Paste `person` at the origin and `garment` to its right on a black canvas.
pub fn merge_side_by_side(
    person: &DynamicImage,
    garment: &DynamicImage,
) -> Result<RgbImage, ImageError> {
    let person = person.to_rgb8();
    let garment = garment.to_rgb8();

    let width = person.width() + garment.width();
    let height = person.height().max(garment.height());
    let mut canvas = RgbImage::new(width, height);
    canvas.copy_from(&person, 0, 0)?;
    canvas.copy_from(&garment, person.width(), 0)?;
    Ok(canvas)
}

fn merge_to_jpeg(person: &[u8], garment: &[u8]) -> Result<Vec<u8>, String> {
    let person = image::load_from_memory(person).map_err(|e| format!("person image: {e}"))?;
    let garment = image::load_from_memory(garment).map_err(|e| format!("garment image: {e}"))?;
    let canvas = merge_side_by_side(&person, &garment).map_err(|e| e.to_string())?;

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
        .encode_image(&DynamicImage::ImageRgb8(canvas))
        .map_err(|e| format!("jpeg encoding: {e}"))?;
    Ok(bytes)
}

#[async_trait]
impl Compositor for MergeCompositor {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn compose(&self, request: CompositionRequest) -> Result<PathBuf, CompositionError> {
        let person = Self::read(&request.person_image).await?;
        let garment = Self::read(&request.garment_image).await?;

        // Decoding and encoding are CPU-bound.
        let merged = tokio::task::spawn_blocking(move || merge_to_jpeg(&person, &garment))
            .await
            .map_err(|e| Self::backend_error(format!("merge task panicked: {e}")))?
            .map_err(Self::backend_error)?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| Self::backend_error(format!("{}: {e}", self.output_dir.display())))?;
        let output = naming::artifact_path(&self.output_dir, &request.user_id);
        tokio::fs::write(&output, &merged)
            .await
            .map_err(|e| Self::backend_error(format!("{}: {e}", output.display())))?;

        debug!(
            user = %request.user_id,
            output = %output.display(),
            bytes = merged.len(),
            "Merged composition written"
        );
        Ok(output)
    }
}
