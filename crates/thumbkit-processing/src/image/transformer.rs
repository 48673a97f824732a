//! Image transformer - produces the display rendition
//!
//! Chains the optional downscale and the optional format change, then encodes
//! the result. Output that would be identical to the source is never produced;
//! callers check [`ImageTransformer::needs_render`] first.

use crate::image::processor::image_format;
use crate::image::resize::ImageResize;
use crate::progress::ProgressSpan;
use bytes::Bytes;
use image::DynamicImage;
use std::io::Cursor;
use thumbkit_core::{Dimensions, MediaFormat, NormalizeError, NormalizeResult};

/// What the display rendition should look like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPlan {
    pub max_dimension: Option<u32>,
    pub target_format: MediaFormat,
}

/// Encoded display rendition
#[derive(Debug, Clone)]
pub struct Rendition {
    pub bytes: Bytes,
    pub dimensions: Dimensions,
    pub format: MediaFormat,
}

pub struct ImageTransformer;

impl ImageTransformer {
    /// Whether `plan` changes anything about a source of this format and size
    pub fn needs_render(source_format: MediaFormat, source: Dimensions, plan: &RenderPlan) -> bool {
        plan.target_format != source_format
            || ImageResize::target_dimensions(source, plan.max_dimension) != source
    }

    /// Resize and re-encode `img` according to `plan`.
    pub fn render(
        img: &DynamicImage,
        source: Dimensions,
        plan: &RenderPlan,
        progress: &ProgressSpan,
    ) -> NormalizeResult<Rendition> {
        progress.begin();
        let target = ImageResize::target_dimensions(source, plan.max_dimension);
        let resized = ImageResize::resize_image(img, target);
        progress.report_fraction(1, 2);

        let bytes = Self::encode(&resized, plan.target_format)?;
        progress.finish();

        tracing::debug!(
            dimensions = %target,
            format = %plan.target_format,
            size_bytes = bytes.len(),
            "Display rendition encoded"
        );

        Ok(Rendition {
            bytes,
            dimensions: target,
            format: plan.target_format,
        })
    }

    /// Encode an image; JPEG output drops the alpha channel.
    pub fn encode(img: &DynamicImage, format: MediaFormat) -> NormalizeResult<Bytes> {
        let encoder_format = image_format(format)
            .ok_or_else(|| NormalizeError::unsupported(format.mime_type()))?;

        let converted = match format {
            MediaFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
            _ => DynamicImage::ImageRgba8(img.to_rgba8()),
        };

        let estimated_size = (converted.width() as usize) * (converted.height() as usize) * 3;
        let mut buffer = Vec::with_capacity(estimated_size.min(16 * 1024 * 1024));
        converted
            .write_to(&mut Cursor::new(&mut buffer), encoder_format)
            .map_err(|e| NormalizeError::Internal(format!("failed to encode {}: {}", format, e)))?;

        Ok(Bytes::from(buffer))
    }
}
