use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use image::DynamicImage;
use tracing::{debug, warn};

use crate::capture::Orientation;
use crate::capture::convert::frame_to_image;
use crate::detection::crop::{DEFAULT_CROP_MARGIN, crop_region};
use crate::detection::overlay::draw_regions;
use crate::detection::{DEFAULT_CONFIDENCE_THRESHOLD, TextDetector, select_regions};
use crate::error::{ConvertError, DetectError, ScanError};
use crate::models::{Frame, TextRegion};

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    /// Whether debug mode is enabled
    pub enabled: bool,
}

impl DebugConfig {
    /// Enable debug output into `output_dir`
    /// The directory must be empty or non-existent
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(anyhow::anyhow!(
                    "Debug directory is not empty: {}",
                    output_dir.display()
                ));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        Ok(Self {
            output_dir,
            enabled: true,
        })
    }

    fn save(&self, step_dir_name: &str, filename: &str, image: &DynamicImage) -> Result<()> {
        let step_dir = self.output_dir.join(step_dir_name);
        std::fs::create_dir_all(&step_dir)?;
        image
            .save(step_dir.join(filename))
            .map_err(|e| anyhow::anyhow!("Failed to save debug image: {}", e))
    }
}

/// A region cut out of a frame, ready for recognition
#[derive(Clone, Debug)]
pub struct RegionCrop {
    /// Position of the region among the kept regions of its frame
    pub index: usize,
    pub region: TextRegion,
    pub image: DynamicImage,
}

/// Result of running detection and cropping over one frame
#[derive(Clone, Debug)]
pub struct FrameAnalysis {
    pub sequence: u64,
    /// Observations returned by the detector, before filtering
    pub detected: usize,
    pub regions: Vec<TextRegion>,
    pub crops: Vec<RegionCrop>,
    /// Indices of kept regions that fell outside the image
    pub skipped: Vec<usize>,
}

/// Per-frame stages: convert, detect, filter, crop
pub struct FramePipeline {
    detector: Arc<dyn TextDetector>,
    confidence_threshold: f32,
    crop_margin: f64,
    orientation: Orientation,
    debug: Option<DebugConfig>,
}

impl FramePipeline {
    pub fn new(detector: Arc<dyn TextDetector>) -> Self {
        Self {
            detector,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            crop_margin: DEFAULT_CROP_MARGIN,
            orientation: Orientation::default(),
            debug: None,
        }
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_crop_margin(mut self, margin: f64) -> Self {
        self.crop_margin = margin;
        self
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_debug(mut self, debug: DebugConfig) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn debug_dir(&self) -> Option<&Path> {
        self.debug
            .as_ref()
            .filter(|d| d.enabled)
            .map(|d| d.output_dir.as_path())
    }

    /// Raw frame to an upright bitmap
    pub fn convert(&self, frame: &Frame) -> Result<DynamicImage, ConvertError> {
        frame_to_image(frame, self.orientation)
    }

    /// Convert a raw frame and analyze it
    pub fn process_frame(&self, frame: &Frame) -> Result<FrameAnalysis, ScanError> {
        let image = self.convert(frame)?;
        Ok(self.analyze(frame.sequence, &image)?)
    }

    /// Detect text regions in a bitmap and crop each confident one
    pub fn analyze(&self, sequence: u64, image: &DynamicImage) -> Result<FrameAnalysis, DetectError> {
        let observations = self.detector.detect(image)?;
        let regions = select_regions(&observations, self.detector.origin(), self.confidence_threshold);

        let mut crops = Vec::with_capacity(regions.len());
        let mut skipped = Vec::new();
        for (index, region) in regions.iter().enumerate() {
            match crop_region(image, &region.rect, self.crop_margin) {
                Some(cropped) => crops.push(RegionCrop {
                    index,
                    region: *region,
                    image: cropped,
                }),
                None => skipped.push(index),
            }
        }

        debug!(
            sequence,
            detected = observations.len(),
            kept = regions.len(),
            cropped = crops.len(),
            "frame analyzed"
        );

        let analysis = FrameAnalysis {
            sequence,
            detected: observations.len(),
            regions,
            crops,
            skipped,
        };

        if let Err(e) = self.save_debug_output(image, &analysis) {
            warn!(sequence, error = %e, "debug output failed");
        }

        Ok(analysis)
    }

    fn save_debug_output(&self, image: &DynamicImage, analysis: &FrameAnalysis) -> Result<()> {
        let Some(debug_config) = self.debug.as_ref().filter(|d| d.enabled) else {
            return Ok(());
        };

        let frame_name = format!("{:06}", analysis.sequence);
        debug_config.save("00_input", &format!("{frame_name}.png"), image)?;

        let overlay = draw_regions(image, &analysis.regions, self.crop_margin);
        debug_config.save(
            "01_regions",
            &format!("{frame_name}.png"),
            &DynamicImage::ImageRgb8(overlay),
        )?;

        for crop in &analysis.crops {
            let filename = format!("{}-{:02}.png", frame_name, crop.index + 1);
            debug_config.save("02_crops", &filename, &crop.image)?;
        }

        Ok(())
    }
}
