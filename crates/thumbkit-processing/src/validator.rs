use std::path::Path;
use thumbkit_core::{MediaFormat, NormalizeError, NormalizeResult, NormalizerConfig, ResourceLimit};

use crate::source::MediaSource;

/// Media source validator
///
/// Checks everything that can be decided without decoding: the declared type
/// against the allow-list, the byte ceilings, and the body length against the
/// declared size.
#[derive(Debug, Clone)]
pub struct MediaValidator {
    max_image_bytes: u64,
    max_video_bytes: u64,
}

impl MediaValidator {
    pub fn new(max_image_bytes: u64, max_video_bytes: u64) -> Self {
        Self {
            max_image_bytes,
            max_video_bytes,
        }
    }

    pub fn from_config(config: &NormalizerConfig) -> Self {
        Self::new(config.max_image_bytes, config.max_video_bytes)
    }

    /// Resolve the declared content type against the allow-list
    pub fn validate_content_type(&self, content_type: &str) -> NormalizeResult<MediaFormat> {
        MediaFormat::from_content_type(content_type)
            .ok_or_else(|| NormalizeError::unsupported(content_type))
    }

    /// Validate file size
    pub fn validate_file_size(&self, format: MediaFormat, size: u64) -> NormalizeResult<()> {
        if size == 0 {
            return Err(NormalizeError::decode(format.token(), "empty file"));
        }

        let max = if format.is_image() {
            self.max_image_bytes
        } else {
            self.max_video_bytes
        };
        if size > max {
            return Err(NormalizeError::exhausted(
                ResourceLimit::SourceBytes,
                size,
                max,
            ));
        }

        Ok(())
    }

    /// Validate that the readable body matches the declared size
    pub fn validate_body_length(
        &self,
        format: MediaFormat,
        declared: u64,
        actual: u64,
    ) -> NormalizeResult<()> {
        if actual < declared {
            return Err(NormalizeError::decode(
                format.token(),
                format!("truncated: expected {} bytes, got {}", declared, actual),
            ));
        }
        if actual > declared {
            return Err(NormalizeError::decode(
                format.token(),
                format!(
                    "body is {} bytes but {} were declared",
                    actual, declared
                ),
            ));
        }
        Ok(())
    }

    /// Validate that the filename extension agrees with the declared type.
    /// This prevents content-type spoofing, e.g. an `.mp4` declared as `image/png`.
    pub fn validate_extension_content_type_match(
        &self,
        filename: &str,
        format: MediaFormat,
    ) -> NormalizeResult<()> {
        let extension = match Path::new(filename).extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_lowercase(),
            None => return Ok(()),
        };

        let Some(expected) = MediaFormat::from_extension(&extension) else {
            // Unknown extensions carry no information; the declared type decides.
            tracing::debug!(
                extension = %extension,
                format = %format,
                "Unknown extension, skipping extension/content-type cross-validation"
            );
            return Ok(());
        };

        if !same_container_family(expected, format) {
            return Err(NormalizeError::unsupported(format!(
                "{} (does not match extension '{}'. Expected {})",
                format.mime_type(),
                extension,
                expected.mime_type()
            )));
        }

        Ok(())
    }

    /// Validate all aspects of a source, returning its resolved format
    pub fn validate_source(&self, source: &MediaSource) -> NormalizeResult<MediaFormat> {
        let format = self.validate_content_type(source.content_type())?;
        if let Some(filename) = source.filename() {
            self.validate_extension_content_type_match(filename, format)?;
        }
        self.validate_file_size(format, source.declared_size())?;
        self.validate_body_length(format, source.declared_size(), source.body().len() as u64)?;
        Ok(format)
    }
}

/// Formats sharing a container layout are interchangeable for extension checks
fn same_container_family(a: MediaFormat, b: MediaFormat) -> bool {
    let webm_family = |f: MediaFormat| matches!(f, MediaFormat::WebM | MediaFormat::Matroska);
    a == b || (a.is_isobmff() && b.is_isobmff()) || (webm_family(a) && webm_family(b))
}

/// Content type implied by a path's extension
pub fn content_type_for_path(path: &Path) -> &'static str {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(MediaFormat::from_extension)
        .map(MediaFormat::mime_type)
        .unwrap_or("application/octet-stream")
}
