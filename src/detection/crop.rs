use image::DynamicImage;

use crate::models::{NormalizedRect, PixelRect};

/// Outward margin applied to every region before cropping
pub const DEFAULT_CROP_MARGIN: f64 = 0.1;

/// Scale a normalized rectangle to absolute pixels
pub fn to_pixel_rect(rect: &NormalizedRect, image_width: u32, image_height: u32) -> PixelRect {
    let width = image_width as f64;
    let height = image_height as f64;
    PixelRect::new(
        rect.x * width,
        rect.y * height,
        rect.width * width,
        rect.height * height,
    )
}

/// Pixel rectangle a region will be cropped to, before clipping
pub fn crop_rect(rect: &NormalizedRect, image_width: u32, image_height: u32, margin: f64) -> PixelRect {
    to_pixel_rect(rect, image_width, image_height).scale_up(margin)
}

/// Clip an expanded rectangle to the image
///
/// Returns `(x, y, width, height)` in whole pixels, or `None` when nothing
/// of the rectangle lies inside the image.
pub fn clip_to_image(rect: &PixelRect, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
    let rect = rect.integral();
    let min_x = rect.x.max(0.0);
    let min_y = rect.y.max(0.0);
    let max_x = rect.max_x().min(image_width as f64);
    let max_y = rect.max_y().min(image_height as f64);

    if !(max_x > min_x && max_y > min_y) {
        return None;
    }

    Some((
        min_x as u32,
        min_y as u32,
        (max_x - min_x) as u32,
        (max_y - min_y) as u32,
    ))
}

/// Crop a normalized region, expanded by `margin`, out of `image`
pub fn crop_region(image: &DynamicImage, rect: &NormalizedRect, margin: f64) -> Option<DynamicImage> {
    let expanded = crop_rect(rect, image.width(), image.height(), margin);
    let (x, y, width, height) = clip_to_image(&expanded, image.width(), image.height())?;
    Some(image.crop_imm(x, y, width, height))
}
