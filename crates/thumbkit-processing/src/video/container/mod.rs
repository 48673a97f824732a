//! In-process container parsers.
//!
//! Both parsers walk the container structure over an in-memory buffer and
//! report progress as the parse position advances. Neither decodes codec
//! payloads; a video counts as having frames once the container indexes at
//! least one sample for its first video track.

pub mod isobmff;
pub mod matroska;

use crate::progress::ProgressSpan;
use thumbkit_core::{MediaFormat, NormalizeError, NormalizeResult};
use tokio_util::sync::CancellationToken;

/// Structural facts about the first video track of a container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInfo {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    /// Frames indexed by the container; `None` when the scan stopped early
    pub frame_count: Option<u64>,
    pub framerate: Option<f32>,
}

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("unexpected end of data at offset {offset}")]
    Truncated { offset: u64 },

    #[error("{0}")]
    Invalid(String),

    #[error("parse cancelled")]
    Cancelled,
}

impl ContainerError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ContainerError::Invalid(reason.into())
    }

    fn into_normalize(self, format: MediaFormat) -> NormalizeError {
        match self {
            ContainerError::Cancelled => NormalizeError::Cancelled,
            other => NormalizeError::decode(format.token(), other),
        }
    }
}

pub type ContainerResult<T> = Result<T, ContainerError>;

/// Bounds-checked big-endian reader over a byte slice
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ByteReader<'a> {
    /// `base` is the absolute file offset of `buf[0]`, used in error messages.
    pub fn new(buf: &'a [u8], base: u64) -> Self {
        Self { buf, pos: 0, base }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn truncated(&self) -> ContainerError {
        ContainerError::Truncated {
            offset: self.base + self.pos as u64,
        }
    }

    pub fn bytes(&mut self, n: usize) -> ContainerResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(self.truncated());
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> ContainerResult<()> {
        self.bytes(n).map(|_| ())
    }

    pub fn u8(&mut self) -> ContainerResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> ContainerResult<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn u32(&mut self) -> ContainerResult<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> ContainerResult<u64> {
        let b = self.bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_be_bytes(arr))
    }

    pub fn fourcc(&mut self) -> ContainerResult<[u8; 4]> {
        let b = self.bytes(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }
}

/// Tracks how far a parser has walked through the buffer
pub struct ScanProgress {
    span: ProgressSpan,
    cancel: CancellationToken,
    total: u64,
    reached: u64,
}

impl ScanProgress {
    pub fn new(span: ProgressSpan, cancel: CancellationToken, total: u64) -> Self {
        Self {
            span,
            cancel,
            total,
            reached: 0,
        }
    }

    /// Record that everything before `offset` has been parsed.
    pub fn advance_to(&mut self, offset: u64) -> ContainerResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ContainerError::Cancelled);
        }
        if offset > self.reached {
            self.reached = offset.min(self.total);
            self.span.report_fraction(self.reached, self.total);
        }
        Ok(())
    }

    pub fn reached(&self) -> u64 {
        self.reached
    }

    /// Mark the scan complete
    pub fn finish(&mut self) {
        self.reached = self.total;
        self.span.finish();
    }
}

/// Parse the container of a video `format`.
pub fn probe(
    data: &[u8],
    format: MediaFormat,
    progress: &mut ScanProgress,
) -> NormalizeResult<ContainerInfo> {
    let result = match format {
        MediaFormat::Mp4 | MediaFormat::QuickTime | MediaFormat::M4v => {
            isobmff::parse(data, progress)
        }
        MediaFormat::WebM | MediaFormat::Matroska => matroska::parse(data, progress),
        _ => return Err(NormalizeError::unsupported(format.mime_type())),
    };

    let info = result.map_err(|e| e.into_normalize(format))?;
    progress.finish();
    Ok(info)
}

/// Container-level sanity checks shared by both parsers
fn check_info(info: &ContainerInfo) -> ContainerResult<()> {
    if info.width == 0 || info.height == 0 {
        return Err(ContainerError::invalid(format!(
            "video track has invalid dimensions {}x{}",
            info.width, info.height
        )));
    }
    if !(info.duration_seconds.is_finite() && info.duration_seconds > 0.0) {
        return Err(ContainerError::invalid(format!(
            "non-positive duration {}",
            info.duration_seconds
        )));
    }
    if info.frame_count == Some(0) {
        return Err(ContainerError::invalid("video track has no frames"));
    }
    Ok(())
}
