use image::{imageops::FilterType, DynamicImage, GenericImageView};
use thumbkit_core::Dimensions;

/// Image resize operations
pub struct ImageResize;

impl ImageResize {
    /// Dimensions after applying an optional longest-side cap.
    pub fn target_dimensions(current: Dimensions, max_side: Option<u32>) -> Dimensions {
        match max_side {
            Some(max) => current.fit_within(max),
            None => current,
        }
    }

    /// Select appropriate filter type based on resize ratio
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> FilterType {
        let width_ratio = orig_width as f32 / new_width.max(1) as f32;
        let height_ratio = orig_height as f32 / new_height.max(1) as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            FilterType::Triangle
        } else if max_ratio > 1.5 {
            FilterType::CatmullRom
        } else {
            FilterType::Lanczos3
        }
    }

    /// Resize image to exact dimensions
    pub fn resize_image(img: &DynamicImage, target: Dimensions) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();
        if (orig_width, orig_height) == (target.width, target.height) {
            return img.clone();
        }
        let filter = Self::select_filter(orig_width, orig_height, target.width, target.height);
        tracing::debug!(
            from = %format!("{}x{}", orig_width, orig_height),
            to = %target,
            filter = ?filter,
            "Resizing image"
        );
        img.resize_exact(target.width, target.height, filter)
    }
}
