//! Pipeline status reporting
//!
//! Every cycle outcome, including the ones that leave the display
//! unchanged, is reported as a [`ScanStatus`]. This keeps "camera failed to
//! start" distinguishable from "no card in view".

use tracing::{debug, error, info, trace};

use crate::error::{CaptureError, ConvertError, DetectError, RecognizeError};
use crate::models::CardCandidate;
use crate::validate::Rejection;

#[derive(Debug, Clone, PartialEq)]
pub enum ScanStatus {
    CaptureStarted { source: String },
    CaptureFailed(CaptureError),
    /// The capture thread stopped delivering frames
    CaptureEnded,
    /// Sampler tick with no frame held
    NoFrame,
    FrameSkipped { sequence: u64, error: ConvertError },
    DetectionFailed { sequence: u64, error: DetectError },
    RegionsFound { sequence: u64, detected: usize, kept: usize },
    CropSkipped { sequence: u64, index: usize },
    RecognitionFailed { sequence: u64, index: usize, error: RecognizeError },
    Rejected { sequence: u64, index: usize, text: String, reason: Rejection },
    Accepted { sequence: u64, index: usize, candidate: CardCandidate },
    Stopped,
}

/// Receives every status the scanner produces, on the scanner's own task
pub trait StatusObserver: Send {
    fn on_status(&mut self, status: &ScanStatus);
}

impl<F> StatusObserver for F
where
    F: FnMut(&ScanStatus) + Send,
{
    fn on_status(&mut self, status: &ScanStatus) {
        self(status)
    }
}

/// Writes statuses to the tracing log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl StatusObserver for LogObserver {
    fn on_status(&mut self, status: &ScanStatus) {
        match status {
            ScanStatus::CaptureStarted { source } => info!(source = %source, "capture started"),
            ScanStatus::CaptureFailed(e) => error!(error = %e, "capture setup failed"),
            ScanStatus::CaptureEnded => info!("capture ended"),
            ScanStatus::NoFrame => trace!("no frame available"),
            ScanStatus::FrameSkipped { sequence, error } => {
                debug!(sequence, error = %error, "frame skipped")
            }
            ScanStatus::DetectionFailed { sequence, error } => {
                debug!(sequence, error = %error, "text detection failed")
            }
            ScanStatus::RegionsFound { sequence, detected, kept } => {
                debug!(sequence, detected, kept, "text regions found")
            }
            ScanStatus::CropSkipped { sequence, index } => {
                debug!(sequence, index, "region outside frame, crop skipped")
            }
            ScanStatus::RecognitionFailed { sequence, index, error } => {
                debug!(sequence, index, error = %error, "recognition failed")
            }
            ScanStatus::Rejected { sequence, index, text, reason } => {
                debug!(sequence, index, text = %text, reason = %reason, "recognized text rejected")
            }
            ScanStatus::Accepted { sequence, index, candidate } => info!(
                sequence,
                index,
                number = %candidate.number,
                code = %candidate.code,
                "card recognized"
            ),
            ScanStatus::Stopped => info!("scanner stopped"),
        }
    }
}
