//! Image processing module
//!
//! This module provides:
//! - Header inspection, full decode and signature checks (processor)
//! - Aspect-preserving downscale (resize)
//! - Display rendition encoding (transformer)

pub mod processor;
pub mod resize;
pub mod transformer;

pub use processor::{DecodedImage, ImageProcessor};
pub use resize::ImageResize;
pub use transformer::{ImageTransformer, RenderPlan, Rendition};
