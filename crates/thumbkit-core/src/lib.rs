//! thumbkit core library
//!
//! This crate provides domain models, error types and configuration shared by
//! the thumbkit media ingestion components.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{NormalizerConfig, VideoProbeBackend};
pub use error::{ErrorMetadata, LogLevel, NormalizeError, NormalizeResult, ResourceLimit};
pub use models::{
    is_format_supported, normalize_content_type, Dimensions, MediaFormat, MediaKind,
    NormalizeOptions, SUPPORTED_FORMATS,
};
