//! Image processor - metadata extraction and validation

use crate::metadata::ImageMetadata;
use crate::progress::ProgressReader;
use crate::source::MediaSource;
use crate::traits::{DecodeContext, MediaProcessor};
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader};
use std::io::Cursor;
use thumbkit_core::{
    Dimensions, MediaFormat, NormalizeError, NormalizeResult, NormalizerConfig, ResourceLimit,
};

/// Bytes per pixel assumed when estimating decode memory from the header
const ESTIMATED_BYTES_PER_PIXEL: u64 = 4;

/// Map an allow-listed image format onto the decoder's format
pub fn image_format(format: MediaFormat) -> Option<ImageFormat> {
    match format {
        MediaFormat::Jpeg => Some(ImageFormat::Jpeg),
        MediaFormat::Png => Some(ImageFormat::Png),
        MediaFormat::Gif => Some(ImageFormat::Gif),
        MediaFormat::WebP => Some(ImageFormat::WebP),
        MediaFormat::Bmp => Some(ImageFormat::Bmp),
        _ => None,
    }
}

/// A fully decoded image together with its metadata
pub struct DecodedImage {
    pub image: DynamicImage,
    pub metadata: ImageMetadata,
    pub dimensions: Dimensions,
}

#[derive(Debug, Clone)]
pub struct ImageProcessor {
    max_dimension: u32,
    max_alloc: u64,
}

impl ImageProcessor {
    pub fn new(max_dimension: u32, max_alloc: u64) -> Self {
        Self {
            max_dimension,
            max_alloc,
        }
    }

    pub fn from_config(config: &NormalizerConfig) -> Self {
        Self::new(config.max_source_dimension, config.max_decode_alloc_bytes)
    }

    /// Read the intrinsic dimensions from the header without decoding pixels
    pub fn read_dimensions(&self, data: &[u8], format: MediaFormat) -> NormalizeResult<Dimensions> {
        let decoder_format = decoder_format(format)?;
        let (width, height) = ImageReader::with_format(Cursor::new(data), decoder_format)
            .into_dimensions()
            .map_err(|e| NormalizeError::decode(format.token(), e))?;

        Dimensions::new(width, height).ok_or_else(|| {
            NormalizeError::decode(
                format.token(),
                format!("invalid dimensions {}x{}", width, height),
            )
        })
    }

    /// Reject images whose header already exceeds the decode ceilings
    pub fn check_limits(&self, dimensions: Dimensions) -> NormalizeResult<()> {
        let longest = dimensions.longest_side();
        if longest > self.max_dimension {
            return Err(NormalizeError::exhausted(
                ResourceLimit::SourceDimension,
                longest as u64,
                self.max_dimension as u64,
            ));
        }

        let estimated = dimensions.pixel_count() * ESTIMATED_BYTES_PER_PIXEL;
        if estimated > self.max_alloc {
            return Err(NormalizeError::exhausted(
                ResourceLimit::DecodeMemory,
                estimated,
                self.max_alloc,
            ));
        }

        Ok(())
    }

    /// Decode the whole image on the current thread.
    ///
    /// Progress follows the bytes the decoder pulls from the source. Reads fail
    /// as soon as `ctx.cancel` fires.
    pub fn decode_blocking(
        &self,
        data: Bytes,
        format: MediaFormat,
        ctx: &DecodeContext,
    ) -> NormalizeResult<DecodedImage> {
        let decoder_format = decoder_format(format)?;
        if ctx.is_cancelled() {
            return Err(NormalizeError::Cancelled);
        }
        ctx.progress.begin();

        let dimensions = self.read_dimensions(&data, format)?;
        self.check_limits(dimensions)?;

        let size_bytes = data.len() as u64;
        let reader = ProgressReader::new(
            Cursor::new(data),
            size_bytes,
            ctx.progress.clone(),
            ctx.cancel.clone(),
        );
        let mut reader = ImageReader::with_format(reader, decoder_format);

        let mut limits = image::Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        limits.max_alloc = Some(self.max_alloc);
        reader.limits(limits);

        let image = reader
            .decode()
            .map_err(|e| self.map_decode_error(e, format, dimensions, ctx))?;

        if ctx.is_cancelled() {
            return Err(NormalizeError::Cancelled);
        }

        // The decoded frame is authoritative; headers can lie.
        let decoded_dimensions = Dimensions::new(image.width(), image.height())
            .ok_or_else(|| NormalizeError::decode(format.token(), "decoded image is empty"))?;
        if decoded_dimensions != dimensions {
            tracing::warn!(
                header = %dimensions,
                decoded = %decoded_dimensions,
                format = %format,
                "Header dimensions differ from decoded frame"
            );
        }

        ctx.progress.finish();

        let metadata = ImageMetadata {
            width: decoded_dimensions.width,
            height: decoded_dimensions.height,
            format,
            size_bytes,
            color_type: Some(format!("{:?}", image.color())),
        };

        tracing::info!(
            width = metadata.width,
            height = metadata.height,
            format = %format,
            size_bytes = size_bytes,
            "Image decoded"
        );

        Ok(DecodedImage {
            image,
            metadata,
            dimensions: decoded_dimensions,
        })
    }

    fn map_decode_error(
        &self,
        error: ImageError,
        format: MediaFormat,
        dimensions: Dimensions,
        ctx: &DecodeContext,
    ) -> NormalizeError {
        if ctx.is_cancelled() {
            return NormalizeError::Cancelled;
        }
        match error {
            ImageError::Limits(_) => NormalizeError::exhausted(
                ResourceLimit::DecodeMemory,
                dimensions.pixel_count() * ESTIMATED_BYTES_PER_PIXEL,
                self.max_alloc,
            ),
            other => NormalizeError::decode(format.token(), other),
        }
    }
}

fn decoder_format(format: MediaFormat) -> NormalizeResult<ImageFormat> {
    image_format(format).ok_or_else(|| NormalizeError::unsupported(format.mime_type()))
}

/// Decodes on the blocking pool; the decoded frame is kept so the caller can
/// render a display rendition from it
#[async_trait]
impl MediaProcessor for ImageProcessor {
    type Metadata = DecodedImage;

    #[tracing::instrument(skip(self, source, ctx), fields(format = %format, size_bytes = source.body().len()))]
    async fn extract_metadata(
        &self,
        source: &MediaSource,
        format: MediaFormat,
        ctx: DecodeContext,
    ) -> NormalizeResult<Self::Metadata> {
        self.validate(source.body(), format)?;

        let processor = self.clone();
        let data = source.body().clone();
        tokio::task::spawn_blocking(move || processor.decode_blocking(data, format, &ctx))
            .await
            .map_err(|e| NormalizeError::Internal(format!("image decode task failed: {}", e)))?
    }

    fn validate(&self, data: &[u8], format: MediaFormat) -> NormalizeResult<()> {
        let expected = decoder_format(format)?;
        match image::guess_format(data) {
            Ok(found) if found == expected => Ok(()),
            Ok(found) => Err(NormalizeError::decode(
                format.token(),
                format!("content is {:?}, not {}", found, format),
            )),
            Err(_) => Err(NormalizeError::decode(
                format.token(),
                "unrecognized file signature",
            )),
        }
    }

    fn name(&self) -> &'static str {
        "image"
    }
}
