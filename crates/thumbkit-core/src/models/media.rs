use serde::{Deserialize, Serialize};
use std::fmt;

/// Media kind, derived from the declared media type prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Kind from the `image/` or `video/` prefix of a content type.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let normalized = normalize_content_type(content_type);
        if normalized.starts_with("image/") {
            Some(MediaKind::Image)
        } else if normalized.starts_with("video/") {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded formats accepted for ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaFormat {
    #[serde(rename = "jpeg")]
    Jpeg,
    #[serde(rename = "png")]
    Png,
    #[serde(rename = "gif")]
    Gif,
    #[serde(rename = "webp")]
    WebP,
    #[serde(rename = "bmp")]
    Bmp,
    #[serde(rename = "mp4")]
    Mp4,
    #[serde(rename = "mov")]
    QuickTime,
    #[serde(rename = "m4v")]
    M4v,
    #[serde(rename = "webm")]
    WebM,
    #[serde(rename = "mkv")]
    Matroska,
}

/// The fixed allow-list, in display order.
pub const SUPPORTED_FORMATS: [MediaFormat; 10] = [
    MediaFormat::Jpeg,
    MediaFormat::Png,
    MediaFormat::Gif,
    MediaFormat::WebP,
    MediaFormat::Bmp,
    MediaFormat::Mp4,
    MediaFormat::QuickTime,
    MediaFormat::M4v,
    MediaFormat::WebM,
    MediaFormat::Matroska,
];

impl MediaFormat {
    /// Look up a declared content type in the allow-list.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match normalize_content_type(content_type).as_str() {
            "image/jpeg" | "image/jpg" => Some(MediaFormat::Jpeg),
            "image/png" => Some(MediaFormat::Png),
            "image/gif" => Some(MediaFormat::Gif),
            "image/webp" => Some(MediaFormat::WebP),
            "image/bmp" => Some(MediaFormat::Bmp),
            "video/mp4" => Some(MediaFormat::Mp4),
            "video/quicktime" => Some(MediaFormat::QuickTime),
            "video/x-m4v" => Some(MediaFormat::M4v),
            "video/webm" => Some(MediaFormat::WebM),
            "video/x-matroska" => Some(MediaFormat::Matroska),
            _ => None,
        }
    }

    /// Parse a format token such as `jpeg` or `mp4`.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Some(MediaFormat::Jpeg),
            "png" => Some(MediaFormat::Png),
            "gif" => Some(MediaFormat::Gif),
            "webp" => Some(MediaFormat::WebP),
            "bmp" => Some(MediaFormat::Bmp),
            "mp4" => Some(MediaFormat::Mp4),
            "mov" | "quicktime" => Some(MediaFormat::QuickTime),
            "m4v" => Some(MediaFormat::M4v),
            "webm" => Some(MediaFormat::WebM),
            "mkv" | "matroska" => Some(MediaFormat::Matroska),
            _ => None,
        }
    }

    /// Map a file extension to its format
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(MediaFormat::Jpeg),
            "png" => Some(MediaFormat::Png),
            "gif" => Some(MediaFormat::Gif),
            "webp" => Some(MediaFormat::WebP),
            "bmp" => Some(MediaFormat::Bmp),
            "mp4" => Some(MediaFormat::Mp4),
            "mov" => Some(MediaFormat::QuickTime),
            "m4v" => Some(MediaFormat::M4v),
            "webm" => Some(MediaFormat::WebM),
            "mkv" => Some(MediaFormat::Matroska),
            _ => None,
        }
    }

    /// Lowercase format token
    pub fn token(self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "jpeg",
            MediaFormat::Png => "png",
            MediaFormat::Gif => "gif",
            MediaFormat::WebP => "webp",
            MediaFormat::Bmp => "bmp",
            MediaFormat::Mp4 => "mp4",
            MediaFormat::QuickTime => "mov",
            MediaFormat::M4v => "m4v",
            MediaFormat::WebM => "webm",
            MediaFormat::Matroska => "mkv",
        }
    }

    /// Canonical content type
    pub fn mime_type(self) -> &'static str {
        match self {
            MediaFormat::Jpeg => "image/jpeg",
            MediaFormat::Png => "image/png",
            MediaFormat::Gif => "image/gif",
            MediaFormat::WebP => "image/webp",
            MediaFormat::Bmp => "image/bmp",
            MediaFormat::Mp4 => "video/mp4",
            MediaFormat::QuickTime => "video/quicktime",
            MediaFormat::M4v => "video/x-m4v",
            MediaFormat::WebM => "video/webm",
            MediaFormat::Matroska => "video/x-matroska",
        }
    }

    pub fn kind(self) -> MediaKind {
        match self {
            MediaFormat::Jpeg
            | MediaFormat::Png
            | MediaFormat::Gif
            | MediaFormat::WebP
            | MediaFormat::Bmp => MediaKind::Image,
            MediaFormat::Mp4
            | MediaFormat::QuickTime
            | MediaFormat::M4v
            | MediaFormat::WebM
            | MediaFormat::Matroska => MediaKind::Video,
        }
    }

    pub fn is_image(self) -> bool {
        self.kind() == MediaKind::Image
    }

    /// Whether the format is stored in an ISO base media file (ftyp/moov boxes)
    pub fn is_isobmff(self) -> bool {
        matches!(
            self,
            MediaFormat::Mp4 | MediaFormat::QuickTime | MediaFormat::M4v
        )
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Lowercase a content type and strip parameters such as `; codecs=vp9`.
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

/// Check a declared content type against the fixed allow-list.
pub fn is_format_supported(content_type: &str) -> bool {
    MediaFormat::from_content_type(content_type).is_some()
}

/// Pixel dimensions, both sides non-zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            None
        } else {
            Some(Self { width, height })
        }
    }

    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Scale down so the longest side is at most `max_side`, keeping the aspect
    /// ratio. Never upscales; a zero cap leaves the dimensions unchanged.
    pub fn fit_within(&self, max_side: u32) -> Dimensions {
        if max_side == 0 || self.longest_side() <= max_side {
            return *self;
        }

        let (w, h, max) = (self.width as u64, self.height as u64, max_side as u64);
        if w >= h {
            let scaled = ((h * max + w / 2) / w).max(1);
            Dimensions {
                width: max_side,
                height: scaled as u32,
            }
        } else {
            let scaled = ((w * max + h / 2) / h).max(1);
            Dimensions {
                width: scaled as u32,
                height: max_side,
            }
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
