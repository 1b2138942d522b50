use image::{DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};

use crate::capture::Orientation;
use crate::error::ConvertError;
use crate::models::{Frame, PixelFormat};

/// Convert a raw frame into a standalone bitmap in the requested orientation
pub fn frame_to_image(frame: &Frame, orientation: Orientation) -> Result<DynamicImage, ConvertError> {
    let data = frame.data.as_deref().ok_or(ConvertError::MissingBuffer)?;

    let image = match frame.format {
        PixelFormat::Mjpeg => image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .map_err(|e| ConvertError::Decode(e.to_string()))?,
        PixelFormat::Yuyv => {
            let expected = expected_len(frame)?;
            check_len(expected, data.len())?;
            let rgb = yuyv_to_rgb(&data[..expected], frame.width, frame.height);
            DynamicImage::ImageRgb8(to_buffer(RgbImage::from_raw(frame.width, frame.height, rgb))?)
        }
        PixelFormat::Rgb8 => {
            let expected = expected_len(frame)?;
            check_len(expected, data.len())?;
            let raw = data[..expected].to_vec();
            DynamicImage::ImageRgb8(to_buffer(RgbImage::from_raw(frame.width, frame.height, raw))?)
        }
        PixelFormat::Rgba8 => {
            let expected = expected_len(frame)?;
            check_len(expected, data.len())?;
            let raw = data[..expected].to_vec();
            DynamicImage::ImageRgba8(to_buffer(RgbaImage::from_raw(frame.width, frame.height, raw))?)
        }
        PixelFormat::Gray8 => {
            let expected = expected_len(frame)?;
            check_len(expected, data.len())?;
            let raw = data[..expected].to_vec();
            DynamicImage::ImageLuma8(to_buffer(GrayImage::from_raw(frame.width, frame.height, raw))?)
        }
    };

    Ok(orient(image, frame.sensor_orientation, orientation))
}

/// Turn a buffer written in `sensor` orientation into the `requested` one
///
/// Upright buffers (`sensor` is `None`) and buffers already in the requested
/// orientation are returned as they are.
pub fn orient(image: DynamicImage, sensor: Option<Orientation>, requested: Orientation) -> DynamicImage {
    match (sensor, requested) {
        (Some(Orientation::Landscape), Orientation::Portrait) => image.rotate90(),
        (Some(Orientation::Portrait), Orientation::Landscape) => image.rotate270(),
        _ => image,
    }
}

/// Convert packed YUYV (Y0 U Y1 V) to RGB using BT.601 coefficients
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixel_count = (width * height) as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);

    for chunk in data.chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            if rgb.len() >= pixel_count * 3 {
                break;
            }
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }

    rgb
}

fn expected_len(frame: &Frame) -> Result<usize, ConvertError> {
    let bpp = frame
        .format
        .bytes_per_pixel()
        .ok_or_else(|| ConvertError::Decode(format!("{:?} has no fixed pixel size", frame.format)))?;
    Ok(frame.width as usize * frame.height as usize * bpp)
}

fn check_len(expected: usize, actual: usize) -> Result<(), ConvertError> {
    if actual < expected {
        return Err(ConvertError::BufferSize { expected, actual });
    }
    Ok(())
}

fn to_buffer<T>(buffer: Option<T>) -> Result<T, ConvertError> {
    buffer.ok_or_else(|| ConvertError::Decode("pixel buffer does not match frame size".into()))
}
