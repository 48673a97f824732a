//! Test helpers: build a normalizer and collect progress for integration tests.
//!
//! Run from workspace root: `cargo test -p thumbkit-processing`.

#![allow(dead_code)]

pub mod fixtures;

use futures::StreamExt;
use thumbkit_processing::{
    MediaDescriptor, MediaSource, NormalizeOptions, NormalizeResult, Normalizer, NormalizerConfig,
};

/// Config with small ceilings so limit tests stay fast
pub fn test_config() -> NormalizerConfig {
    NormalizerConfig {
        max_image_bytes: 4 * 1024 * 1024,
        max_video_bytes: 16 * 1024 * 1024,
        max_source_dimension: 4096,
        max_decode_alloc_bytes: 128 * 1024 * 1024,
        ..NormalizerConfig::default()
    }
}

pub fn test_normalizer() -> Normalizer {
    thumbkit_infra::try_init_test_telemetry();
    Normalizer::new(test_config()).expect("test config is valid")
}

pub fn normalizer_with(config: NormalizerConfig) -> Normalizer {
    thumbkit_infra::try_init_test_telemetry();
    Normalizer::new(config).expect("config is valid")
}

/// Run a normalization and return its result with every progress value
pub async fn normalize_collecting(
    normalizer: &Normalizer,
    source: MediaSource,
    options: NormalizeOptions,
) -> (NormalizeResult<MediaDescriptor>, Vec<u8>) {
    let mut job = match normalizer.normalize(source, options) {
        Ok(job) => job,
        Err(e) => return (Err(e), Vec::new()),
    };
    let progress = job.take_progress().expect("progress not yet taken");
    let (result, values) = tokio::join!(job.run(), progress.collect::<Vec<u8>>());
    (result, values)
}

/// Progress must be non-decreasing and end at exactly 100
pub fn assert_progress_complete(values: &[u8]) {
    assert!(!values.is_empty(), "no progress was reported");
    assert!(
        values.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {:?}",
        values
    );
    assert_eq!(values.last(), Some(&100), "progress: {:?}", values);
    assert!(values.iter().all(|v| *v <= 100));
}
