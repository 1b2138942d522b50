#![allow(dead_code, unused_imports)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from cardscan for tests
pub use cardscan::capture::replay::ReplaySource;
pub use cardscan::models::{BoxOrigin, Frame, PixelFormat};
pub use cardscan::{
    CardCandidate, LabelDisplay, ScanStatus, Scanner, ScannerConfig, ValidatorOptions,
};
