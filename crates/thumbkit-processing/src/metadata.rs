//! Media metadata types

use serde::{Deserialize, Serialize};
use thumbkit_core::{Dimensions, MediaFormat};

/// Image metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: MediaFormat,
    pub size_bytes: u64,
    pub color_type: Option<String>,
}

impl ImageMetadata {
    pub fn dimensions(&self) -> Option<Dimensions> {
        Dimensions::new(self.width, self.height)
    }
}

/// Video metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    pub bitrate: Option<u64>,
    pub framerate: Option<f32>,
}

impl VideoMetadata {
    pub fn dimensions(&self) -> Option<Dimensions> {
        Dimensions::new(self.width, self.height)
    }
}
