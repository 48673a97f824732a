//! Domain models for media ingestion.

pub mod media;
pub mod options;

pub use media::{
    is_format_supported, normalize_content_type, Dimensions, MediaFormat, MediaKind,
    SUPPORTED_FORMATS,
};
pub use options::NormalizeOptions;
