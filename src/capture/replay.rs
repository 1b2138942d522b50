//! Still images replayed as a camera
//!
//! Decodes a single image or every image in a directory up front and
//! publishes them in order on a background thread at a fixed frame
//! interval, like a camera delivering frames.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, ImageReader};
use tracing::{debug, info, warn};

use crate::capture::{CaptureHandle, FrameSource, LatestFrame, LoopAction};
use crate::error::CaptureError;
use crate::models::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

pub struct ReplaySource {
    path: PathBuf,
    frame_interval: Duration,
    /// Number of passes over the images; `None` repeats forever
    loops: Option<u32>,
    images: Vec<DynamicImage>,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, frame_interval: Duration) -> Self {
        Self {
            path: path.into(),
            frame_interval,
            loops: None,
            images: Vec::new(),
        }
    }

    /// Replay already decoded images
    pub fn from_images(images: Vec<DynamicImage>, frame_interval: Duration) -> Self {
        Self {
            path: PathBuf::new(),
            frame_interval,
            loops: None,
            images,
        }
    }

    pub fn with_loops(mut self, loops: Option<u32>) -> Self {
        self.loops = loops;
        self
    }

    fn load(&mut self) -> Result<(), CaptureError> {
        if !self.images.is_empty() {
            return Ok(());
        }

        let paths = list_images(&self.path)?;
        for path in &paths {
            let image = ImageReader::open(path)
                .map_err(|e| CaptureError::Input(format!("{}: {}", path.display(), e)))?
                .decode()
                .map_err(|e| CaptureError::Input(format!("{}: {}", path.display(), e)))?;
            debug!(path = %path.display(), width = image.width(), height = image.height(), "loaded replay image");
            self.images.push(image);
        }

        Ok(())
    }
}

impl FrameSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    fn start(&mut self, slot: Arc<LatestFrame>) -> Result<CaptureHandle, CaptureError> {
        self.load()?;
        if self.images.is_empty() {
            return Err(CaptureError::Input(format!("no images in {}", self.path.display())));
        }

        // Still images are upright, so frames carry no sensor orientation
        let frames: Vec<Frame> = self
            .images
            .iter()
            .map(|image| Frame::from_image(0, image))
            .collect();
        let frame_interval = self.frame_interval;
        let loops = self.loops;
        let total = loops.map(|max| frames.len() * max as usize);

        info!(frames = frames.len(), ?loops, interval_ms = frame_interval.as_millis() as u64, "replay started");

        // The first frame is held before start returns
        let mut sequence = 1u64;
        let mut first = frames[0].clone();
        first.sequence = sequence;
        slot.publish(first);
        let mut index = 1usize;

        Ok(CaptureHandle::spawn("replay", move || {
            if total.is_some_and(|total| index >= total) {
                return LoopAction::Stop;
            }

            std::thread::sleep(frame_interval);

            sequence += 1;
            let mut frame = frames[index % frames.len()].clone();
            frame.sequence = sequence;
            frame.captured_at = std::time::Instant::now();
            slot.publish(frame);
            index += 1;
            LoopAction::Continue
        }))
    }
}

/// A single image path, or every image in a directory sorted by name
pub fn list_images(path: &Path) -> Result<Vec<PathBuf>, CaptureError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let entries = std::fs::read_dir(path)
        .map_err(|e| CaptureError::Input(format!("{}: {}", path.display(), e)))?;

    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    images.sort();

    Ok(images)
}
