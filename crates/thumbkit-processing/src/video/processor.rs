//! Video processor - metadata extraction from the container structure

use crate::metadata::VideoMetadata;
use crate::source::MediaSource;
use crate::traits::{DecodeContext, MediaProcessor};
use crate::video::container::{self, ContainerInfo, ScanProgress};
use async_trait::async_trait;
use thumbkit_core::{MediaFormat, NormalizeError, NormalizeResult};

/// Top-level box types an ISO base media file may start with
const ISOBMFF_LEADING_BOXES: [&[u8; 4]; 6] = [b"ftyp", b"moov", b"mdat", b"wide", b"free", b"skip"];
const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Parses mp4/mov/m4v and webm/mkv containers in-process
#[derive(Debug, Clone, Default)]
pub struct NativeVideoProcessor;

impl NativeVideoProcessor {
    pub fn new() -> Self {
        Self
    }

    fn to_metadata(info: ContainerInfo, size_bytes: u64) -> VideoMetadata {
        let bitrate = (info.duration_seconds > 0.0)
            .then(|| (size_bytes as f64 * 8.0 / info.duration_seconds) as u64);
        VideoMetadata {
            duration: info.duration_seconds,
            width: info.width,
            height: info.height,
            codec: info.codec,
            bitrate,
            framerate: info.framerate,
        }
    }
}

#[async_trait]
impl MediaProcessor for NativeVideoProcessor {
    type Metadata = VideoMetadata;

    #[tracing::instrument(skip(self, source, ctx), fields(format = %format, size_bytes = source.body().len()))]
    async fn extract_metadata(
        &self,
        source: &MediaSource,
        format: MediaFormat,
        ctx: DecodeContext,
    ) -> NormalizeResult<Self::Metadata> {
        self.validate(source.body(), format)?;

        let data = source.body().clone();
        let start = std::time::Instant::now();
        let metadata = tokio::task::spawn_blocking(move || {
            let mut scan = ScanProgress::new(ctx.progress.clone(), ctx.cancel.clone(), data.len() as u64);
            let info = container::probe(&data, format, &mut scan)?;
            Ok::<_, NormalizeError>(Self::to_metadata(info, data.len() as u64))
        })
        .await
        .map_err(|e| NormalizeError::Internal(format!("container parse task failed: {}", e)))??;

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            video_duration = metadata.duration,
            width = metadata.width,
            height = metadata.height,
            codec = %metadata.codec,
            "Video container parsed"
        );

        Ok(metadata)
    }

    fn validate(&self, data: &[u8], format: MediaFormat) -> NormalizeResult<()> {
        if data.len() < 12 {
            return Err(NormalizeError::decode(
                format.token(),
                "file too small to be a valid video",
            ));
        }

        let recognized = if format.is_isobmff() {
            ISOBMFF_LEADING_BOXES.iter().any(|kind| &data[4..8] == *kind)
        } else {
            data[0..4] == EBML_MAGIC
        };

        if recognized {
            Ok(())
        } else {
            Err(NormalizeError::decode(
                format.token(),
                "unrecognized container signature",
            ))
        }
    }

    fn name(&self) -> &'static str {
        "native"
    }
}
