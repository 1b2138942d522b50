pub mod crop;
pub mod ocr;
pub mod overlay;
pub mod preprocessing;

use image::DynamicImage;
use tracing::debug;

use crate::error::{DetectError, RecognizeError};
use crate::models::{BoxOrigin, TextObservation, TextRegion};

/// Regions at or below this confidence are discarded before cropping
///
/// Applied to [`ocr::line_confidence`] for the ocrs detector, where a
/// crisply printed line scores near 1.0.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.8;

/// Finds regions of an image that are likely to contain text
pub trait TextDetector: Send + Sync {
    /// Origin convention of the boxes returned by [`TextDetector::detect`]
    fn origin(&self) -> BoxOrigin;

    fn detect(&self, image: &DynamicImage) -> Result<Vec<TextObservation>, DetectError>;
}

/// Reads the text in an image
///
/// Called from the blocking pool, one call per cropped region.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, RecognizeError>;
}

/// Keep confident observations and bring them to a top-left origin
pub fn select_regions(
    observations: &[TextObservation],
    origin: BoxOrigin,
    confidence_threshold: f32,
) -> Vec<TextRegion> {
    observations
        .iter()
        .filter(|obs| obs.confidence > confidence_threshold)
        .filter_map(|obs| {
            let rect = match origin {
                BoxOrigin::TopLeft => obs.bbox,
                BoxOrigin::BottomLeft => obs.bbox.flip_vertical(),
            };
            if !rect.is_valid() {
                debug!(?rect, "dropping region outside the unit square");
                return None;
            }
            Some(TextRegion {
                rect,
                confidence: obs.confidence,
            })
        })
        .collect()
}
