//! Video processing module
//!
//! Two interchangeable metadata backends: the in-process container parser
//! (default) and `ffprobe`.

pub mod container;
pub mod ffprobe;
pub mod processor;

pub use ffprobe::FfprobeVideoProcessor;
pub use processor::NativeVideoProcessor;

use crate::metadata::VideoMetadata;
use crate::traits::MediaProcessor;
use std::sync::Arc;
use thumbkit_core::{NormalizerConfig, VideoProbeBackend};

pub type SharedVideoProcessor = Arc<dyn MediaProcessor<Metadata = VideoMetadata>>;

/// Build the video backend selected by `config`
pub fn processor_from_config(config: &NormalizerConfig) -> anyhow::Result<SharedVideoProcessor> {
    Ok(match config.video_probe_backend {
        VideoProbeBackend::Native => Arc::new(NativeVideoProcessor::new()),
        VideoProbeBackend::Ffprobe => Arc::new(FfprobeVideoProcessor::new(&config.ffprobe_path)?),
    })
}
