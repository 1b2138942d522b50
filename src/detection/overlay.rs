use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::detection::crop::{clip_to_image, crop_rect};
use crate::models::TextRegion;

const OUTLINE: Rgb<u8> = Rgb([255, 0, 0]);
const OUTLINE_WIDTH: u32 = 2;

/// Outline every region, expanded by `margin`, on a copy of `image`
pub fn draw_regions(image: &DynamicImage, regions: &[TextRegion], margin: f64) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (width, height) = canvas.dimensions();

    for region in regions {
        let expanded = crop_rect(&region.rect, width, height, margin);
        let Some((x, y, w, h)) = clip_to_image(&expanded, width, height) else {
            continue;
        };
        for inset in 0..OUTLINE_WIDTH {
            if w <= 2 * inset || h <= 2 * inset {
                break;
            }
            let rect = Rect::at((x + inset) as i32, (y + inset) as i32)
                .of_size(w - 2 * inset, h - 2 * inset);
            draw_hollow_rect_mut(&mut canvas, rect, OUTLINE);
        }
    }

    canvas
}
