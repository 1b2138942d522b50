pub mod capture;
pub mod config;
pub mod detection;
pub mod display;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod scanner;
pub mod status;
pub mod validate;

pub use capture::{CaptureHandle, CaptureSettings, FrameSource, LatestFrame, Orientation};
pub use config::ScannerConfig;
pub use detection::{TextDetector, TextRecognizer};
pub use display::{CardDisplay, ConsoleDisplay, LabelDisplay};
pub use error::{ScanError, ScanResult};
pub use models::{CardCandidate, Frame, NormalizedRect, PixelRect, TextObservation, TextRegion};
pub use pipeline::{DebugConfig, FramePipeline};
pub use scanner::{ScanReport, Scanner};
pub use status::{LogObserver, ScanStatus, StatusObserver};
pub use validate::{Rejection, ValidatorOptions, validate};
