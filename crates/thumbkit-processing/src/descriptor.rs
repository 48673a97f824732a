//! Normalized output of an ingestion.

use crate::display::DisplayHandle;
use crate::metadata::VideoMetadata;
use crate::source::SourceHandle;
use serde::Serialize;
use thumbkit_core::{Dimensions, MediaFormat, MediaKind};

/// Normalized media descriptor.
///
/// Owns exactly one display handle. The handle is released by
/// [`MediaDescriptor::release`] or when the descriptor is dropped.
#[derive(Debug)]
pub struct MediaDescriptor {
    source: SourceHandle,
    display: DisplayHandle,
    kind: MediaKind,
    duration_seconds: Option<f64>,
    dimensions: Dimensions,
    byte_size: u64,
    encoded_format: MediaFormat,
    display_dimensions: Dimensions,
    display_format: MediaFormat,
    codec: Option<String>,
    color_type: Option<String>,
    bitrate: Option<u64>,
    framerate: Option<f32>,
}

/// Display rendition facts recorded on a descriptor
#[derive(Debug, Clone, Copy)]
pub(crate) struct DisplayFacts {
    pub dimensions: Dimensions,
    pub format: MediaFormat,
}

impl MediaDescriptor {
    pub(crate) fn image(
        source: SourceHandle,
        display: DisplayHandle,
        dimensions: Dimensions,
        encoded_format: MediaFormat,
        color_type: Option<String>,
        rendition: DisplayFacts,
    ) -> Self {
        Self {
            byte_size: source.len() as u64,
            source,
            display,
            kind: MediaKind::Image,
            duration_seconds: None,
            dimensions,
            encoded_format,
            display_dimensions: rendition.dimensions,
            display_format: rendition.format,
            codec: None,
            color_type,
            bitrate: None,
            framerate: None,
        }
    }

    pub(crate) fn video(
        source: SourceHandle,
        display: DisplayHandle,
        dimensions: Dimensions,
        encoded_format: MediaFormat,
        metadata: VideoMetadata,
        display_dimensions: Dimensions,
    ) -> Self {
        Self {
            byte_size: source.len() as u64,
            source,
            display,
            kind: MediaKind::Video,
            duration_seconds: Some(metadata.duration),
            dimensions,
            encoded_format,
            display_dimensions,
            display_format: encoded_format,
            codec: Some(metadata.codec),
            color_type: None,
            bitrate: metadata.bitrate,
            framerate: metadata.framerate,
        }
    }

    pub fn source(&self) -> &SourceHandle {
        &self.source
    }

    pub fn display(&self) -> &DisplayHandle {
        &self.display
    }

    pub fn display_uri(&self) -> &str {
        self.display.uri()
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Seconds, set only for video
    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration_seconds
    }

    /// Intrinsic dimensions of the source
    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn encoded_format(&self) -> MediaFormat {
        self.encoded_format
    }

    pub fn display_dimensions(&self) -> Dimensions {
        self.display_dimensions
    }

    pub fn display_format(&self) -> MediaFormat {
        self.display_format
    }

    pub fn codec(&self) -> Option<&str> {
        self.codec.as_deref()
    }

    /// Decoded pixel layout, images only
    pub fn color_type(&self) -> Option<&str> {
        self.color_type.as_deref()
    }

    /// Bits per second, when the container reports or implies one
    pub fn bitrate(&self) -> Option<u64> {
        self.bitrate
    }

    pub fn framerate(&self) -> Option<f32> {
        self.framerate
    }

    /// Release the display handle. Idempotent; returns true only for the call
    /// that performed the release.
    pub fn release(&self) -> bool {
        self.display.release()
    }

    pub fn is_released(&self) -> bool {
        self.display.is_released()
    }

    pub fn summary(&self) -> DescriptorSummary {
        DescriptorSummary {
            kind: self.kind,
            duration_seconds: self.duration_seconds,
            dimensions: self.dimensions,
            byte_size: self.byte_size,
            encoded_format: self.encoded_format,
            display_uri: self.display.uri().to_string(),
            display_dimensions: self.display_dimensions,
            display_format: self.display_format,
            codec: self.codec.clone(),
            color_type: self.color_type.clone(),
            bitrate: self.bitrate,
            framerate: self.framerate,
        }
    }
}

/// Serializable view of a descriptor, without the byte handles
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorSummary {
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub dimensions: Dimensions,
    pub byte_size: u64,
    pub encoded_format: MediaFormat,
    pub display_uri: String,
    pub display_dimensions: Dimensions,
    pub display_format: MediaFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framerate: Option<f32>,
}
