//! Input sources for normalization.

use bytes::Bytes;
use std::fmt;
use std::path::Path;

use crate::validator::content_type_for_path;

/// A file-like byte source with a declared media type and length.
#[derive(Clone)]
pub struct MediaSource {
    content_type: String,
    declared_size: u64,
    filename: Option<String>,
    body: Bytes,
}

impl MediaSource {
    pub fn new(content_type: impl Into<String>, declared_size: u64, body: impl Into<Bytes>) -> Self {
        Self {
            content_type: content_type.into(),
            declared_size,
            filename: None,
            body: body.into(),
        }
    }

    /// Source whose declared size is the body length
    pub fn from_bytes(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let declared_size = body.len() as u64;
        Self::new(content_type, declared_size, body)
    }

    /// Read a file from disk. Without an explicit content type it is inferred
    /// from the extension (`application/octet-stream` when unknown).
    pub async fn from_path(
        path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> std::io::Result<Self> {
        let path = path.as_ref();
        let body = tokio::fs::read(path).await?;
        let content_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| content_type_for_path(path).to_string());
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string);

        let mut source = Self::from_bytes(content_type, body);
        source.filename = filename;
        Ok(source)
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Read-only reference to the original bytes
    pub fn handle(&self) -> SourceHandle {
        SourceHandle(self.body.clone())
    }
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaSource")
            .field("content_type", &self.content_type)
            .field("declared_size", &self.declared_size)
            .field("filename", &self.filename)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Opaque, read-only reference to a source's original bytes.
///
/// Shares the caller's buffer; no copy is made.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceHandle(Bytes);

impl SourceHandle {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceHandle({} bytes)", self.0.len())
    }
}
