use std::sync::Arc;
use std::time::Instant;

use crate::capture::Orientation;

/// Pixel layout of a raw camera buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
    Gray8,
    /// Packed YUV 4:2:2, Y0 U Y1 V
    Yuyv,
    /// One JPEG image per frame
    Mjpeg,
}

impl PixelFormat {
    /// Bytes per pixel for uncompressed formats
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Rgb8 => Some(3),
            PixelFormat::Rgba8 => Some(4),
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Yuyv => Some(2),
            PixelFormat::Mjpeg => None,
        }
    }
}

/// A raw camera sample
///
/// Frames are shared as `Arc<Frame>` between the capture thread and the
/// sampler. `data` is `None` when the device delivered a sample without a
/// pixel buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Option<Arc<[u8]>>,
    pub captured_at: Instant,
    /// Orientation the sensor wrote the buffer in; `None` when the buffer is
    /// already upright
    pub sensor_orientation: Option<Orientation>,
}

impl Frame {
    pub fn new(sequence: u64, width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            sequence,
            width,
            height,
            format,
            data: Some(Arc::from(data)),
            captured_at: Instant::now(),
            sensor_orientation: None,
        }
    }

    /// Frame whose pixel buffer is unavailable
    pub fn without_buffer(sequence: u64, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            sequence,
            width,
            height,
            format,
            data: None,
            captured_at: Instant::now(),
            sensor_orientation: None,
        }
    }

    pub fn from_image(sequence: u64, image: &image::DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(sequence, width, height, PixelFormat::Rgb8, rgb.into_raw())
    }

    pub fn with_sensor_orientation(mut self, orientation: Option<Orientation>) -> Self {
        self.sensor_orientation = orientation;
        self
    }
}

/// Where a detector puts the origin of its unit square
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxOrigin {
    TopLeft,
    BottomLeft,
}

/// Rectangle in [0,1] fractional coordinates of an image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Convert between bottom-left and top-left origin: `y' = 1 - y - height`
    pub fn flip_vertical(&self) -> Self {
        Self {
            x: self.x,
            y: 1.0 - self.y - self.height,
            width: self.width,
            height: self.height,
        }
    }

    /// Non-negative size with the origin inside the unit square
    pub fn is_valid(&self) -> bool {
        self.width >= 0.0
            && self.height >= 0.0
            && (0.0..=1.0).contains(&self.x)
            && (0.0..=1.0).contains(&self.y)
    }
}

/// Raw detector output, in the detector's own coordinate convention
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextObservation {
    pub bbox: NormalizedRect,
    pub confidence: f32,
}

/// A text region with a top-left origin, ready for cropping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextRegion {
    pub rect: NormalizedRect,
    pub confidence: f32,
}

/// Rectangle in absolute pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Grow outward by `factor` of the width on each horizontal side and
    /// `factor` of the height on each vertical side
    pub fn scale_up(&self, factor: f64) -> Self {
        let dx = self.width * factor;
        let dy = self.height * factor;
        Self {
            x: self.x - dx,
            y: self.y - dy,
            width: self.width + 2.0 * dx,
            height: self.height + 2.0 * dy,
        }
    }

    /// Smallest rectangle with integral edges containing this one
    pub fn integral(&self) -> Self {
        let min_x = snap(self.x).floor();
        let min_y = snap(self.y).floor();
        let max_x = snap(self.x + self.width).ceil();
        let max_y = snap(self.y + self.height).ceil();
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }
}

/// Round values within float noise of a whole pixel onto it
fn snap(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < 1e-6 { rounded } else { value }
}

/// A validated card number and security code pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardCandidate {
    pub number: String,
    pub code: String,
}
