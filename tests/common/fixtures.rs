use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cardscan::capture::{CaptureHandle, FrameSource, LatestFrame};
use cardscan::detection::{TextDetector, TextRecognizer};
use cardscan::error::{CaptureError, DetectError, RecognizeError};
use cardscan::models::{BoxOrigin, Frame, NormalizedRect, TextObservation};
use cardscan::{ScanStatus, StatusObserver};
use image::{DynamicImage, ImageBuffer, Rgb};
use parking_lot::Mutex;

/// Creates a width x height image with a dark band across the middle
pub fn create_card_image(width: u32, height: u32) -> DynamicImage {
    let band_top = height / 3;
    let band_bottom = 2 * height / 3;
    let img = ImageBuffer::from_fn(width, height, |_, y| {
        if (band_top..band_bottom).contains(&y) {
            Rgb([20u8, 20u8, 20u8])
        } else {
            Rgb([240u8, 240u8, 240u8])
        }
    });
    DynamicImage::ImageRgb8(img)
}

/// Observation with a top-left origin box
pub fn observation(x: f64, y: f64, width: f64, height: f64, confidence: f32) -> TextObservation {
    TextObservation {
        bbox: NormalizedRect::new(x, y, width, height),
        confidence,
    }
}

/// Publishes the given frames during `start`, then idles until stopped
///
/// With `finite` set the capture thread exits right away, so the scanner
/// sees the capture end after the held frame was processed.
pub struct StaticSource {
    frames: Vec<Frame>,
    finite: bool,
}

impl StaticSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            finite: false,
        }
    }

    pub fn image(image: &DynamicImage) -> Self {
        Self::new(vec![Frame::from_image(1, image)])
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn finite(mut self) -> Self {
        self.finite = true;
        self
    }
}

impl FrameSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn start(&mut self, slot: Arc<LatestFrame>) -> Result<CaptureHandle, CaptureError> {
        for frame in self.frames.drain(..) {
            slot.publish(frame);
        }
        let finite = self.finite;
        Ok(CaptureHandle::spawn_with("static", move |stop| {
            while !finite && !stop.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }))
    }
}

/// Source whose device cannot be opened
pub struct FailingSource;

impl FrameSource for FailingSource {
    fn name(&self) -> &str {
        "failing"
    }

    fn start(&mut self, _slot: Arc<LatestFrame>) -> Result<CaptureHandle, CaptureError> {
        Err(CaptureError::NoDevice("no camera attached".to_string()))
    }
}

/// Detector returning the same observations for every image
pub struct FakeDetector {
    origin: BoxOrigin,
    observations: Vec<TextObservation>,
    fail: bool,
    calls: AtomicUsize,
    last_image: Mutex<Option<DynamicImage>>,
}

impl FakeDetector {
    pub fn new(observations: Vec<TextObservation>) -> Self {
        Self {
            origin: BoxOrigin::TopLeft,
            observations,
            fail: false,
            calls: AtomicUsize::new(0),
            last_image: Mutex::new(None),
        }
    }

    /// One confident region across the middle of the image
    pub fn single_region() -> Self {
        Self::new(vec![observation(0.1, 0.3, 0.8, 0.3, 0.95)])
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn with_origin(mut self, origin: BoxOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The image passed to the most recent `detect` call
    pub fn last_image(&self) -> Option<DynamicImage> {
        self.last_image.lock().clone()
    }
}

impl TextDetector for FakeDetector {
    fn origin(&self) -> BoxOrigin {
        self.origin
    }

    fn detect(&self, image: &DynamicImage) -> Result<Vec<TextObservation>, DetectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_image.lock() = Some(image.clone());
        if self.fail {
            return Err(DetectError::Engine("model not loaded".to_string()));
        }
        Ok(self.observations.clone())
    }
}

/// Recognizer returning scripted texts, one per call, repeating the last
pub struct FakeRecognizer {
    texts: Mutex<Vec<Result<String, RecognizeError>>>,
    calls: AtomicUsize,
}

impl FakeRecognizer {
    pub fn new(texts: &[&str]) -> Self {
        Self::scripted(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn scripted(mut texts: Vec<Result<String, RecognizeError>>) -> Self {
        texts.reverse();
        Self {
            texts: Mutex::new(texts),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for FakeRecognizer {
    fn recognize(&self, _image: &DynamicImage) -> Result<String, RecognizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut texts = self.texts.lock();
        if texts.len() > 1 {
            texts.pop().unwrap_or_else(|| Ok(String::new()))
        } else {
            texts.last().cloned().unwrap_or_else(|| Ok(String::new()))
        }
    }
}

/// Recognizer that sleeps before answering, one scripted `(delay, text)` per
/// call in call order
pub struct DelayedRecognizer {
    script: Mutex<VecDeque<(Duration, String)>>,
    calls: AtomicUsize,
}

impl DelayedRecognizer {
    pub fn new(script: &[(u64, &str)]) -> Self {
        Self {
            script: Mutex::new(
                script
                    .iter()
                    .map(|(ms, text)| (Duration::from_millis(*ms), text.to_string()))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for DelayedRecognizer {
    fn recognize(&self, _image: &DynamicImage) -> Result<String, RecognizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        let (delay, text) = next.unwrap_or_default();
        std::thread::sleep(delay);
        Ok(text)
    }
}

/// Observer keeping every status it receives
#[derive(Clone, Default)]
pub struct RecordingObserver {
    statuses: Arc<Mutex<Vec<ScanStatus>>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<ScanStatus> {
        self.statuses.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&ScanStatus) -> bool) -> usize {
        self.statuses.lock().iter().filter(|s| predicate(s)).count()
    }
}

impl StatusObserver for RecordingObserver {
    fn on_status(&mut self, status: &ScanStatus) {
        self.statuses.lock().push(status.clone());
    }
}
