//! Error types module
//!
//! All failures of a normalization are unified under [`NormalizeError`]. The
//! taxonomy separates caller errors (unsupported format), data errors (corrupt
//! or truncated input) and policy violations (configured ceilings), so callers
//! can decide on user-visible messaging without inspecting strings.

use serde::Serialize;
use std::fmt;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like unsupported formats
    Debug,
    /// Warning level - for corrupt input and policy violations
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be surfaced.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "DECODE_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether retrying the same operation could succeed
    fn is_recoverable(&self) -> bool;

    /// Whether the caller should have prevented this error
    fn is_caller_error(&self) -> bool;

    /// Message suitable for showing to an end user
    fn client_message(&self) -> String;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// A configured ceiling that a source can exceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceLimit {
    /// Size of the source in bytes
    SourceBytes,
    /// Pixel width or height of the decoded content
    SourceDimension,
    /// Memory the decoder would have to allocate
    DecodeMemory,
}

impl ResourceLimit {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceLimit::SourceBytes => "source_bytes",
            ResourceLimit::SourceDimension => "source_dimension",
            ResourceLimit::DecodeMemory => "decode_memory",
        }
    }
}

impl fmt::Display for ResourceLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Unsupported format: {content_type}")]
    UnsupportedFormat { content_type: String },

    #[error("Failed to decode {format}: {reason}")]
    Decode { format: String, reason: String },

    #[error("Resource limit exceeded: {limit} is {actual} (max: {max})")]
    ResourceExhausted {
        limit: ResourceLimit,
        actual: u64,
        max: u64,
    },

    #[error("Normalization cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for normalization operations
pub type NormalizeResult<T> = Result<T, NormalizeError>;

impl NormalizeError {
    pub fn unsupported(content_type: impl Into<String>) -> Self {
        NormalizeError::UnsupportedFormat {
            content_type: content_type.into(),
        }
    }

    pub fn decode(format: impl Into<String>, reason: impl fmt::Display) -> Self {
        NormalizeError::Decode {
            format: format.into(),
            reason: reason.to_string(),
        }
    }

    pub fn exhausted(limit: ResourceLimit, actual: u64, max: u64) -> Self {
        NormalizeError::ResourceExhausted { limit, actual, max }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, NormalizeError::Cancelled)
    }
}

impl ErrorMetadata for NormalizeError {
    fn error_code(&self) -> &'static str {
        match self {
            NormalizeError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            NormalizeError::Decode { .. } => "DECODE_ERROR",
            NormalizeError::ResourceExhausted { .. } => "RESOURCE_EXHAUSTED",
            NormalizeError::Cancelled => "CANCELLED",
            NormalizeError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn is_recoverable(&self) -> bool {
        // Identical corrupt or oversized input fails the same way again.
        matches!(self, NormalizeError::Cancelled | NormalizeError::Internal(_))
    }

    fn is_caller_error(&self) -> bool {
        matches!(self, NormalizeError::UnsupportedFormat { .. })
    }

    fn client_message(&self) -> String {
        match self {
            NormalizeError::UnsupportedFormat { content_type } => {
                format!("Files of type '{}' are not supported", content_type)
            }
            NormalizeError::Decode { format, .. } => {
                format!("The {} file is damaged or incomplete", format)
            }
            NormalizeError::ResourceExhausted { limit, max, .. } => match limit {
                ResourceLimit::SourceBytes => format!("The file is larger than {} bytes", max),
                ResourceLimit::SourceDimension => {
                    format!("The media is larger than {} pixels per side", max)
                }
                ResourceLimit::DecodeMemory => {
                    "The media needs too much memory to open".to_string()
                }
            },
            NormalizeError::Cancelled => "The import was cancelled".to_string(),
            NormalizeError::Internal(_) => "The file could not be processed".to_string(),
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            NormalizeError::UnsupportedFormat { .. } | NormalizeError::Cancelled => LogLevel::Debug,
            NormalizeError::Decode { .. } | NormalizeError::ResourceExhausted { .. } => {
                LogLevel::Warn
            }
            NormalizeError::Internal(_) => LogLevel::Error,
        }
    }
}
