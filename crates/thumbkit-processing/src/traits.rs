//! Core traits for media processing
//!
//! This module defines the interface shared by the image and video processors.

use async_trait::async_trait;
use thumbkit_core::{MediaFormat, NormalizeResult};
use tokio_util::sync::CancellationToken;

use crate::progress::ProgressSpan;
use crate::source::MediaSource;

/// Per-decode progress slice and cancellation signal
#[derive(Clone)]
pub struct DecodeContext {
    pub progress: ProgressSpan,
    pub cancel: CancellationToken,
}

impl DecodeContext {
    pub fn new(progress: ProgressSpan, cancel: CancellationToken) -> Self {
        Self { progress, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Media processor trait - handles metadata extraction and validation
#[async_trait]
pub trait MediaProcessor: Send + Sync {
    type Metadata: Send + Sync;

    /// Decode enough of the source to extract its metadata
    async fn extract_metadata(
        &self,
        source: &MediaSource,
        format: MediaFormat,
        ctx: DecodeContext,
    ) -> NormalizeResult<Self::Metadata>;

    /// Cheap signature check (magic bytes) before decoding
    fn validate(&self, data: &[u8], format: MediaFormat) -> NormalizeResult<()>;

    /// Short backend name for logs
    fn name(&self) -> &'static str;
}
