//! Configuration module
//!
//! Normalizer ceilings and backend selection, read from the environment (and a
//! `.env` file when present).

use std::env;

use crate::models::MediaKind;

const MAX_IMAGE_SIZE_MB: u64 = 50;
const MAX_VIDEO_SIZE_MB: u64 = 2048;
const MAX_SOURCE_DIMENSION: u32 = 16384;
const MAX_DECODE_ALLOC_MB: u64 = 512;
const FFPROBE_PATH: &str = "ffprobe";
const DISPLAY_URI_PREFIX: &str = "blob:thumbkit/";

const MB: u64 = 1024 * 1024;

/// How video containers are probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoProbeBackend {
    /// In-process ISO-BMFF / EBML parsing
    #[default]
    Native,
    /// External `ffprobe` decoding the first frame
    Ffprobe,
}

impl VideoProbeBackend {
    pub fn parse(s: &str) -> Result<Self, anyhow::Error> {
        match s.trim().to_lowercase().as_str() {
            "native" => Ok(VideoProbeBackend::Native),
            "ffprobe" => Ok(VideoProbeBackend::Ffprobe),
            other => Err(anyhow::anyhow!(
                "Invalid VIDEO_PROBE_BACKEND: {} (expected 'native' or 'ffprobe')",
                other
            )),
        }
    }
}

/// Normalizer configuration
#[derive(Clone, Debug)]
pub struct NormalizerConfig {
    pub max_image_bytes: u64,
    pub max_video_bytes: u64,
    /// Largest width or height a source may decode to
    pub max_source_dimension: u32,
    /// Upper bound on decoder allocations
    pub max_decode_alloc_bytes: u64,
    pub video_probe_backend: VideoProbeBackend,
    pub ffprobe_path: String,
    pub display_uri_prefix: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: MAX_IMAGE_SIZE_MB * MB,
            max_video_bytes: MAX_VIDEO_SIZE_MB * MB,
            max_source_dimension: MAX_SOURCE_DIMENSION,
            max_decode_alloc_bytes: MAX_DECODE_ALLOC_MB * MB,
            video_probe_backend: VideoProbeBackend::Native,
            ffprobe_path: FFPROBE_PATH.to_string(),
            display_uri_prefix: DISPLAY_URI_PREFIX.to_string(),
        }
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            tracing::warn!(key = key, value = %raw, "Invalid value, using default");
            default
        }),
        None => default,
    }
}

impl NormalizerConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_image_size_mb = parse_or(
            lookup("MAX_IMAGE_SIZE_MB"),
            "MAX_IMAGE_SIZE_MB",
            MAX_IMAGE_SIZE_MB,
        );
        let max_video_size_mb = parse_or(
            lookup("MAX_VIDEO_SIZE_MB"),
            "MAX_VIDEO_SIZE_MB",
            MAX_VIDEO_SIZE_MB,
        );
        let max_source_dimension = parse_or(
            lookup("MAX_SOURCE_DIMENSION"),
            "MAX_SOURCE_DIMENSION",
            MAX_SOURCE_DIMENSION,
        );
        let max_decode_alloc_mb = parse_or(
            lookup("MAX_DECODE_ALLOC_MB"),
            "MAX_DECODE_ALLOC_MB",
            MAX_DECODE_ALLOC_MB,
        );

        let video_probe_backend = match lookup("VIDEO_PROBE_BACKEND") {
            Some(raw) => VideoProbeBackend::parse(&raw)?,
            None => VideoProbeBackend::default(),
        };

        let ffprobe_path = lookup("FFPROBE_PATH").unwrap_or_else(|| FFPROBE_PATH.to_string());
        let display_uri_prefix =
            lookup("DISPLAY_URI_PREFIX").unwrap_or_else(|| DISPLAY_URI_PREFIX.to_string());

        let config = Self {
            max_image_bytes: max_image_size_mb.saturating_mul(MB),
            max_video_bytes: max_video_size_mb.saturating_mul(MB),
            max_source_dimension,
            max_decode_alloc_bytes: max_decode_alloc_mb.saturating_mul(MB),
            video_probe_backend,
            ffprobe_path,
            display_uri_prefix,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_image_bytes == 0 || self.max_video_bytes == 0 {
            return Err(anyhow::anyhow!(
                "MAX_IMAGE_SIZE_MB and MAX_VIDEO_SIZE_MB must be greater than zero"
            ));
        }

        if self.max_source_dimension == 0 {
            return Err(anyhow::anyhow!(
                "MAX_SOURCE_DIMENSION must be greater than zero"
            ));
        }

        if self.max_decode_alloc_bytes == 0 {
            return Err(anyhow::anyhow!(
                "MAX_DECODE_ALLOC_MB must be greater than zero"
            ));
        }

        let dangerous_chars = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
        if self.ffprobe_path.is_empty()
            || self.ffprobe_path.contains("..")
            || self.ffprobe_path.chars().any(|c| dangerous_chars.contains(&c))
        {
            return Err(anyhow::anyhow!(
                "FFPROBE_PATH contains unsafe characters: {}",
                self.ffprobe_path
            ));
        }

        if self.display_uri_prefix.is_empty() {
            return Err(anyhow::anyhow!("DISPLAY_URI_PREFIX must not be empty"));
        }

        Ok(())
    }

    /// Byte ceiling for a source of the given kind
    pub fn max_source_bytes(&self, kind: MediaKind) -> u64 {
        match kind {
            MediaKind::Image => self.max_image_bytes,
            MediaKind::Video => self.max_video_bytes,
        }
    }
}
