use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::capture::CaptureSettings;
use crate::detection::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::detection::crop::DEFAULT_CROP_MARGIN;
use crate::validate::DigitCleanup;

pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 500;

/// Scanner settings, loadable from a JSON file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub sample_interval_ms: u64,
    pub confidence_threshold: f32,
    /// Fraction of a region's own size added on each side before cropping
    pub crop_margin: f64,
    pub cleanup: DigitCleanup,
    pub capture: CaptureSettings,
    /// Directory holding the OCR models; `$HOME/.cache/ocrs` when unset
    pub models_dir: Option<PathBuf>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            crop_margin: DEFAULT_CROP_MARGIN,
            cleanup: DigitCleanup::default(),
            capture: CaptureSettings::default(),
            models_dir: None,
        }
    }
}

impl ScannerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        config.check()?;
        Ok(config)
    }

    /// Reject values the scanner cannot run with
    pub fn check(&self) -> Result<()> {
        if self.sample_interval_ms == 0 {
            anyhow::bail!("sample_interval_ms must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            anyhow::bail!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            );
        }
        if !(self.crop_margin >= 0.0) {
            anyhow::bail!("crop_margin must be non-negative, got {}", self.crop_margin);
        }
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}
