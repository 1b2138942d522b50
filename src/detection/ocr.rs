use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
pub use ocrs::{ImageSource, OcrEngine};
use ocrs::OcrEngineParams;
use rten::Model;
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;
use tracing::{debug, info};

use crate::detection::preprocessing::prepare_for_ocr;
use crate::detection::{TextDetector, TextRecognizer};
use crate::error::{DetectError, RecognizeError};
use crate::models::{BoxOrigin, NormalizedRect, PixelRect, TextObservation};

pub const DETECTION_MODEL: &str = "text-detection.rten";
pub const RECOGNITION_MODEL: &str = "text-recognition.rten";

/// Standard model cache location, `$HOME/.cache/ocrs`
pub fn default_models_dir() -> Option<PathBuf> {
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()?;
    Some(Path::new(&home_dir).join(".cache/ocrs"))
}

/// Initialize the OCR engine with models from `models_dir`
pub fn init_ocr_engine(models_dir: &Path) -> anyhow::Result<OcrEngine> {
    let detection_model_path = models_dir.join(DETECTION_MODEL);
    let recognition_model_path = models_dir.join(RECOGNITION_MODEL);

    if !detection_model_path.exists() || !recognition_model_path.exists() {
        anyhow::bail!(
            "OCR models not found. Please run: ocrs-cli --help (or download models manually)\n\
             Expected locations:\n  - {}\n  - {}",
            detection_model_path.display(),
            recognition_model_path.display()
        );
    }

    let detection_model = Model::load_file(&detection_model_path)?;
    let recognition_model = Model::load_file(&recognition_model_path)?;

    let engine = OcrEngine::new(OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        ..Default::default()
    })?;

    info!(models_dir = %models_dir.display(), "OCR engine initialized");
    Ok(engine)
}

/// Pixel span `(x0, y0, x1, y1)` of `rect` inside the probability map, or
/// `None` when nothing of it lies on the map
pub fn map_span(probabilities: &NdTensor<f32, 2>, rect: &PixelRect) -> Option<(usize, usize, usize, usize)> {
    let map_height = probabilities.size(0);
    let map_width = probabilities.size(1);
    let rect = rect.integral();

    let x0 = (rect.x.max(0.0) as usize).min(map_width);
    let y0 = (rect.y.max(0.0) as usize).min(map_height);
    let x1 = (rect.max_x().max(0.0) as usize).min(map_width);
    let y1 = (rect.max_y().max(0.0) as usize).min(map_height);
    (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
}

/// Summed text probability inside `rect` and the number of pixels summed
pub fn region_sum(probabilities: &NdTensor<f32, 2>, rect: &PixelRect) -> Option<(f32, usize)> {
    let (x0, y0, x1, y1) = map_span(probabilities, rect)?;
    let mut sum = 0.0f32;
    for y in y0..y1 {
        for x in x0..x1 {
            sum += probabilities[[y, x]];
        }
    }
    Some((sum, (x1 - x0) * (y1 - y0)))
}

/// Confidence of one text line: the mean text probability over its word boxes
///
/// Only pixels inside a word box are counted, so the gaps between the groups
/// of a card number do not dilute the score. Word boxes are traced around
/// pixels the detection model already marked as text, which puts a cleanly
/// printed line close to 1.0; faint, blurred or partly covered lines drop
/// under [`DEFAULT_CONFIDENCE_THRESHOLD`].
///
/// [`DEFAULT_CONFIDENCE_THRESHOLD`]: crate::detection::DEFAULT_CONFIDENCE_THRESHOLD
pub fn line_confidence(probabilities: &NdTensor<f32, 2>, words: &[PixelRect]) -> Option<f32> {
    let (sum, count) = words
        .iter()
        .filter_map(|word| region_sum(probabilities, word))
        .fold((0.0f32, 0usize), |(s, c), (ws, wc)| (s + ws, c + wc));
    (count > 0).then(|| sum / count as f32)
}

/// Smallest rectangle holding every word of a line
fn bounding_rect(words: &[PixelRect]) -> Option<PixelRect> {
    let first = words.first()?;
    let (left, top, right, bottom) = words.iter().skip(1).fold(
        (first.x, first.y, first.max_x(), first.max_y()),
        |(l, t, r, b), w| (l.min(w.x), t.min(w.y), r.max(w.max_x()), b.max(w.max_y())),
    );
    Some(PixelRect::new(left, top, right - left, bottom - top))
}

/// Text line detector backed by the ocrs detection model
///
/// Each detected line becomes one observation, confidence from
/// [`line_confidence`].
pub struct OcrsTextDetector {
    engine: Arc<OcrEngine>,
}

impl OcrsTextDetector {
    pub fn new(engine: Arc<OcrEngine>) -> Self {
        Self { engine }
    }
}

impl TextDetector for OcrsTextDetector {
    fn origin(&self) -> BoxOrigin {
        BoxOrigin::TopLeft
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<TextObservation>, DetectError> {
        let img = image.to_rgb8();
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let img_source = ImageSource::from_bytes(img.as_raw(), img.dimensions())
            .map_err(|e| DetectError::Engine(e.to_string()))?;
        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| DetectError::Engine(e.to_string()))?;

        let probabilities = self
            .engine
            .detect_text_pixels(&ocr_input)
            .map_err(|e| DetectError::Engine(e.to_string()))?;
        let word_rects = self
            .engine
            .detect_words(&ocr_input)
            .map_err(|e| DetectError::Engine(e.to_string()))?;
        let line_rects = self.engine.find_text_lines(&ocr_input, &word_rects);

        let mut observations = Vec::with_capacity(line_rects.len());
        for line in &line_rects {
            let words: Vec<PixelRect> = line
                .iter()
                .filter_map(|word| {
                    let mut corners = word.corners().into_iter();
                    let first = corners.next()?;
                    let (left, top, right, bottom) = corners.fold(
                        (first.x, first.y, first.x, first.y),
                        |(l, t, r, b), p| (l.min(p.x), t.min(p.y), r.max(p.x), b.max(p.y)),
                    );
                    Some(PixelRect::new(
                        left as f64,
                        top as f64,
                        (right - left) as f64,
                        (bottom - top) as f64,
                    ))
                })
                .collect();

            let Some(confidence) = line_confidence(&probabilities, &words) else {
                continue;
            };
            let Some((x0, y0, x1, y1)) = bounding_rect(&words).and_then(|r| map_span(&probabilities, &r))
            else {
                continue;
            };

            let bbox = NormalizedRect::new(
                x0 as f64 / width as f64,
                y0 as f64 / height as f64,
                (x1 - x0) as f64 / width as f64,
                (y1 - y0) as f64 / height as f64,
            );
            observations.push(TextObservation { bbox, confidence });
        }

        debug!(words = word_rects.len(), lines = observations.len(), "text detection finished");
        Ok(observations)
    }
}

/// Recognizer backed by the ocrs recognition model
pub struct OcrsRecognizer {
    engine: Arc<OcrEngine>,
}

impl OcrsRecognizer {
    pub fn new(engine: Arc<OcrEngine>) -> Self {
        Self { engine }
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<String, RecognizeError> {
        let img = prepare_for_ocr(image).to_rgb8();

        let img_source = ImageSource::from_bytes(img.as_raw(), img.dimensions())
            .map_err(|e| RecognizeError::Engine(e.to_string()))?;
        let ocr_input = self
            .engine
            .prepare_input(img_source)
            .map_err(|e| RecognizeError::Engine(e.to_string()))?;

        let text = self
            .engine
            .get_text(&ocr_input)
            .map_err(|e| RecognizeError::Engine(e.to_string()))?;

        Ok(text.trim().to_string())
    }
}
