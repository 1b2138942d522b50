//! Error types for the scanning pipeline
//!
//! Every failure degrades to "no update this cycle", but each one is typed
//! so it can be reported to a status observer instead of being dropped.

use std::fmt;

/// Result type alias using ScanError
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors raised while assembling or running a capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No usable device or input was found
    NoDevice(String),
    /// The device refused the requested configuration
    Configuration(String),
    /// Streaming could not be started
    StreamFailed(String),
    /// Replay input could not be read
    Input(String),
}

/// Errors turning a raw frame into a bitmap
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    MissingBuffer,
    BufferSize { expected: usize, actual: usize },
    Decode(String),
}

/// Errors from the text region detector
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    Engine(String),
}

/// Errors from the OCR engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizeError {
    Engine(String),
    /// The blocking OCR task panicked or was aborted
    TaskFailed(String),
}

/// Top-level pipeline error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    Capture(CaptureError),
    Convert(ConvertError),
    Detect(DetectError),
    Recognize(RecognizeError),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::NoDevice(msg) => write!(f, "no capture device: {msg}"),
            CaptureError::Configuration(msg) => write!(f, "capture configuration failed: {msg}"),
            CaptureError::StreamFailed(msg) => write!(f, "capture stream failed: {msg}"),
            CaptureError::Input(msg) => write!(f, "replay input unavailable: {msg}"),
        }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::MissingBuffer => write!(f, "frame has no pixel buffer"),
            ConvertError::BufferSize { expected, actual } => {
                write!(f, "pixel buffer too small: expected {expected} bytes, got {actual}")
            }
            ConvertError::Decode(msg) => write!(f, "frame decode failed: {msg}"),
        }
    }
}

impl fmt::Display for DetectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectError::Engine(msg) => write!(f, "text detection failed: {msg}"),
        }
    }
}

impl fmt::Display for RecognizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognizeError::Engine(msg) => write!(f, "text recognition failed: {msg}"),
            RecognizeError::TaskFailed(msg) => write!(f, "recognition task failed: {msg}"),
        }
    }
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Capture(e) => write!(f, "{e}"),
            ScanError::Convert(e) => write!(f, "{e}"),
            ScanError::Detect(e) => write!(f, "{e}"),
            ScanError::Recognize(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CaptureError {}
impl std::error::Error for ConvertError {}
impl std::error::Error for DetectError {}
impl std::error::Error for RecognizeError {}
impl std::error::Error for ScanError {}

impl From<CaptureError> for ScanError {
    fn from(e: CaptureError) -> Self {
        ScanError::Capture(e)
    }
}

impl From<ConvertError> for ScanError {
    fn from(e: ConvertError) -> Self {
        ScanError::Convert(e)
    }
}

impl From<DetectError> for ScanError {
    fn from(e: DetectError) -> Self {
        ScanError::Detect(e)
    }
}

impl From<RecognizeError> for ScanError {
    fn from(e: RecognizeError) -> Self {
        ScanError::Recognize(e)
    }
}
