//! Frame capture
//!
//! A capture source runs on its own thread and publishes every frame into a
//! single-slot [`LatestFrame`]. Only the newest frame is ever held; frames
//! that arrive before the previous one was read are dropped.

#[cfg(feature = "camera")]
pub mod camera;
pub mod convert;
pub mod replay;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CaptureError;
use crate::models::Frame;

/// Capture resolution preset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPreset {
    Low,
    Medium,
    #[default]
    High,
}

impl QualityPreset {
    /// Requested frame size (width, height) in sensor orientation
    pub fn resolution(&self) -> (u32, u32) {
        match self {
            QualityPreset::Low => (320, 240),
            QualityPreset::Medium => (640, 480),
            QualityPreset::High => (1280, 720),
        }
    }
}

/// Orientation of a frame's content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub preset: QualityPreset,
    /// Orientation frames are analyzed in
    pub orientation: Orientation,
    /// Orientation a sideways-mounted sensor writes its buffers in; unset
    /// when the device delivers upright frames
    pub sensor_orientation: Option<Orientation>,
}

/// Single-slot, most-recent-wins frame handoff
///
/// Written by the capture thread, read by the sampler. Reading does not
/// consume the frame: the sampler sees the same frame again until a newer
/// one is published.
#[derive(Debug, Default)]
pub struct LatestFrame {
    slot: Mutex<Slot>,
    published: AtomicU64,
    superseded: AtomicU64,
}

#[derive(Debug, Default)]
struct Slot {
    frame: Option<Arc<Frame>>,
    read: bool,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame
    pub fn publish(&self, frame: Frame) {
        let mut slot = self.slot.lock();
        if slot.frame.is_some() && !slot.read {
            self.superseded.fetch_add(1, Ordering::Relaxed);
        }
        slot.frame = Some(Arc::new(frame));
        slot.read = false;
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// The most recently published frame, if any
    pub fn latest(&self) -> Option<Arc<Frame>> {
        let mut slot = self.slot.lock();
        slot.read = true;
        slot.frame.clone()
    }

    /// Total frames published
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Frames replaced before anyone read them
    pub fn superseded(&self) -> u64 {
        self.superseded.load(Ordering::Relaxed)
    }
}

/// Anything that can feed frames into a [`LatestFrame`]
pub trait FrameSource: Send {
    fn name(&self) -> &str;

    /// Configure the device and start delivering frames into `slot`
    ///
    /// Returns an error if the session cannot be assembled; in that case no
    /// capture thread is left running.
    fn start(&mut self, slot: Arc<LatestFrame>) -> Result<CaptureHandle, CaptureError>;
}

/// Action returned by a capture loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Continue,
    Stop,
}

/// How a capture loop reacts to a failed read from the device
///
/// Timeouts and interruptions leave the stream usable, so the loop goes
/// round again and re-checks its stop flag. Anything else ends the capture.
pub fn stream_error_action(error: &std::io::Error) -> LoopAction {
    match error.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted => {
            LoopAction::Continue
        }
        _ => LoopAction::Stop,
    }
}

/// Owns a running capture thread
///
/// The thread is stopped and joined on [`CaptureHandle::stop`] or on drop.
pub struct CaptureHandle {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    name: String,
}

impl CaptureHandle {
    /// Run `loop_fn` repeatedly on a new thread until it returns
    /// [`LoopAction::Stop`] or the handle is stopped
    pub fn spawn<F>(name: &str, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let loop_name = name.to_string();
        Self::spawn_with(name, move |stop| {
            while !stop.load(Ordering::SeqCst) {
                if loop_fn() == LoopAction::Stop {
                    debug!(name = %loop_name, "capture loop requested stop");
                    break;
                }
            }
        })
    }

    /// Run `body` once on a new thread; it must return soon after the stop
    /// flag it is given becomes true
    pub fn spawn_with<F>(name: &str, body: F) -> Self
    where
        F: FnOnce(&AtomicBool) + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_finished = Arc::clone(&finished);
        let thread_name = name.to_string();

        info!(name = %name, "starting capture loop");

        let thread_handle = thread::Builder::new()
            .name(format!("capture-{name}"))
            .spawn(move || {
                body(&thread_stop);
                thread_finished.store(true, Ordering::SeqCst);
                info!(name = %thread_name, "capture loop exiting");
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "failed to spawn capture thread");
                finished.store(true, Ordering::SeqCst);
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            finished,
            name: name.to_string(),
        }
    }

    /// Whether the capture loop has ended on its own or was stopped
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop_signal.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!(name = %self.name, "capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for CaptureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}
