use image::DynamicImage;
use image::imageops::FilterType;

/// Upscale factor for a crop whose shorter side is `min_side` pixels
///
/// Small text recognizes poorly, so tiny crops are enlarged 4x and small
/// ones 2x.
pub fn upscale_factor(min_side: u32) -> u32 {
    if min_side < 100 {
        4
    } else if min_side < 200 {
        2
    } else {
        1
    }
}

/// Prepare a cropped region for recognition
pub fn prepare_for_ocr(crop: &DynamicImage) -> DynamicImage {
    let factor = upscale_factor(crop.width().min(crop.height()));
    if factor == 1 {
        return crop.clone();
    }
    crop.resize_exact(
        crop.width() * factor,
        crop.height() * factor,
        FilterType::CatmullRom,
    )
}
