//! Video processor backed by the external `ffprobe` tool.
//!
//! Unlike the native parser this decodes the first video frame, so a file
//! whose container is intact but whose codec payload is garbage still fails.

use crate::metadata::VideoMetadata;
use crate::source::MediaSource;
use crate::traits::{DecodeContext, MediaProcessor};
use crate::video::processor::NativeVideoProcessor;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use thumbkit_core::{MediaFormat, NormalizeError, NormalizeResult};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const WRITE_CHUNK: usize = 256 * 1024;

/// Validate that a path doesn't contain shell metacharacters or dangerous sequences
fn validate_path(path: &str) -> Result<()> {
    let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!("Path contains dangerous characters: {}", path));
    }

    if path.contains("..") {
        return Err(anyhow!("Path contains directory traversal: {}", path));
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct FfprobeVideoProcessor {
    ffprobe_path: String,
}

impl FfprobeVideoProcessor {
    pub fn new(ffprobe_path: impl Into<String>) -> Result<Self> {
        let ffprobe_path = ffprobe_path.into();
        validate_path(&ffprobe_path)
            .context("Invalid ffprobe_path: contains dangerous characters")?;

        if !ffprobe_path.chars().all(|c| {
            c.is_alphanumeric() || c == '/' || c == '-' || c == '_' || c == '.' || c == '\\'
        }) {
            return Err(anyhow!("Invalid ffprobe_path: contains unsafe characters"));
        }

        Ok(Self { ffprobe_path })
    }

    /// Copy the source to a temporary file, reporting the copy as the first
    /// four fifths of the span.
    async fn spool(
        &self,
        source: &MediaSource,
        format: MediaFormat,
        ctx: &DecodeContext,
    ) -> NormalizeResult<tempfile::NamedTempFile> {
        let io_error = |e: std::io::Error| NormalizeError::Internal(format!("failed to spool video: {}", e));

        let temp_file = tempfile::Builder::new()
            .prefix("thumbkit-")
            .suffix(&format!(".{}", format.token()))
            .tempfile()
            .map_err(io_error)?;
        let mut file = tokio::fs::File::from_std(temp_file.reopen().map_err(io_error)?);

        let body = source.body();
        let total = body.len() as u64;
        let units = total + total / 4;
        let mut written = 0u64;
        for chunk in body.chunks(WRITE_CHUNK) {
            if ctx.is_cancelled() {
                return Err(NormalizeError::Cancelled);
            }
            file.write_all(chunk).await.map_err(io_error)?;
            written += chunk.len() as u64;
            ctx.progress.report_fraction(written, units);
        }
        file.flush().await.map_err(io_error)?;

        Ok(temp_file)
    }
}

#[async_trait]
impl MediaProcessor for FfprobeVideoProcessor {
    type Metadata = VideoMetadata;

    #[tracing::instrument(skip(self, source, ctx), fields(
        process.executable.name = "ffprobe",
        process.executable.path = %self.ffprobe_path,
        ffmpeg.operation = "probe",
        format = %format
    ))]
    async fn extract_metadata(
        &self,
        source: &MediaSource,
        format: MediaFormat,
        ctx: DecodeContext,
    ) -> NormalizeResult<Self::Metadata> {
        self.validate(source.body(), format)?;
        ctx.progress.begin();

        let start = std::time::Instant::now();
        let temp_file = self.spool(source, format, &ctx).await?;

        let mut command = Command::new(&self.ffprobe_path);
        command
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-show_frames",
                "-select_streams",
                "v:0",
                "-read_intervals",
                "%+#1",
            ])
            .arg(temp_file.path())
            .kill_on_drop(true);

        let output = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(NormalizeError::Cancelled),
            output = command.output() => output.map_err(|e| {
                NormalizeError::Internal(format!("Failed to execute ffprobe: {}", e))
            })?,
        };

        if !output.status.success() {
            return Err(NormalizeError::decode(
                format.token(),
                format!(
                    "ffprobe failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let probe_data: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| NormalizeError::Internal(format!("Failed to parse ffprobe output: {}", e)))?;
        let metadata = parse_probe_output(&probe_data, format, source.body().len() as u64)?;
        ctx.progress.finish();

        tracing::info!(
            duration_ms = start.elapsed().as_millis(),
            video_duration = metadata.duration,
            width = metadata.width,
            height = metadata.height,
            codec = %metadata.codec,
            "Video probe completed"
        );

        Ok(metadata)
    }

    fn validate(&self, data: &[u8], format: MediaFormat) -> NormalizeResult<()> {
        NativeVideoProcessor.validate(data, format)
    }

    fn name(&self) -> &'static str {
        "ffprobe"
    }
}

/// Extract video metadata from `ffprobe -print_format json` output
pub fn parse_probe_output(
    probe_data: &serde_json::Value,
    format: MediaFormat,
    size_bytes: u64,
) -> NormalizeResult<VideoMetadata> {
    let decode = |reason: &str| NormalizeError::decode(format.token(), reason);

    let stream = probe_data["streams"]
        .get(0)
        .ok_or_else(|| decode("no video stream found"))?;

    let decoded_frames = probe_data["frames"].as_array().map_or(0, |f| f.len());
    if decoded_frames == 0 {
        return Err(decode("no decodable video frames"));
    }

    let parse_f64 = |v: &serde_json::Value| v.as_str().and_then(|d| d.parse::<f64>().ok());
    let duration = parse_f64(&probe_data["format"]["duration"])
        .or_else(|| parse_f64(&stream["duration"]))
        .ok_or_else(|| decode("could not parse duration"))?;
    if !(duration.is_finite() && duration > 0.0) {
        return Err(decode(&format!("non-positive duration {}", duration)));
    }

    let width = stream["width"]
        .as_u64()
        .ok_or_else(|| decode("could not parse width"))?;
    let width = u32::try_from(width).map_err(|_| decode("width out of range"))?;
    let height = stream["height"]
        .as_u64()
        .ok_or_else(|| decode("could not parse height"))?;
    let height = u32::try_from(height).map_err(|_| decode("height out of range"))?;
    if width == 0 || height == 0 {
        return Err(decode(&format!("invalid dimensions {}x{}", width, height)));
    }

    let codec = stream["codec_name"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();

    let bitrate = probe_data["format"]["bit_rate"]
        .as_str()
        .and_then(|b| b.parse::<u64>().ok())
        .or_else(|| Some((size_bytes as f64 * 8.0 / duration) as u64));

    let framerate = stream["r_frame_rate"].as_str().and_then(|r| {
        let (num, den) = r.split_once('/')?;
        let num: f32 = num.parse().ok()?;
        let den: f32 = den.parse().ok()?;
        (den != 0.0).then(|| num / den)
    });

    Ok(VideoMetadata {
        duration,
        width,
        height,
        codec,
        bitrate,
        framerate,
    })
}
