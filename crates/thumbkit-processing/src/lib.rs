//! thumbkit media processing library
//!
//! Turns a user-supplied image or video into a [`MediaDescriptor`]:
//! - Allow-list and size validation (validator)
//! - Image decode and display rendition (image)
//! - Container parsing or ffprobe for video (video)
//! - Progress stream and revocable display handles (progress, display)

pub mod descriptor;
pub mod display;
pub mod image;
pub mod metadata;
pub mod normalizer;
pub mod progress;
pub mod source;
pub mod traits;
pub mod validator;
pub mod video;

pub use descriptor::{DescriptorSummary, MediaDescriptor};
pub use display::{DisplayContent, DisplayHandle, DisplayRegistry};
pub use crate::image::{ImageProcessor, ImageTransformer};
pub use metadata::{ImageMetadata, VideoMetadata};
pub use normalizer::{NormalizeJob, Normalizer};
pub use progress::{ProgressReporter, ProgressSpan, ProgressStream, PROGRESS_COMPLETE};
pub use source::{MediaSource, SourceHandle};
pub use traits::{DecodeContext, MediaProcessor};
pub use validator::{content_type_for_path, MediaValidator};
pub use video::{FfprobeVideoProcessor, NativeVideoProcessor, SharedVideoProcessor};

// Re-export the core types callers need alongside the normalizer
pub use thumbkit_core::{
    is_format_supported, Dimensions, ErrorMetadata, MediaFormat, MediaKind, NormalizeError,
    NormalizeOptions, NormalizeResult, NormalizerConfig, ResourceLimit, SUPPORTED_FORMATS,
};
