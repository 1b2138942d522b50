//! Live V4L2 camera capture
//!
//! Negotiates MJPG (falling back to YUYV) at the preset resolution and
//! streams through memory-mapped buffers on a dedicated thread. Every frame
//! overwrites the shared slot, so late frames are always discarded.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

use crate::capture::{CaptureHandle, CaptureSettings, FrameSource, LatestFrame, LoopAction, stream_error_action};
use crate::error::CaptureError;
use crate::models::{Frame, PixelFormat};

pub const DEFAULT_DEVICE: &str = "/dev/video0";

const BUFFER_COUNT: u32 = 4;
const STREAM_START_TIMEOUT: Duration = Duration::from_secs(3);
/// Upper bound on a blocking dequeue, so a stalled device cannot hold up stop
const STREAM_POLL_TIMEOUT: Duration = Duration::from_millis(500);

pub struct V4lCameraSource {
    device_path: PathBuf,
    settings: CaptureSettings,
}

impl V4lCameraSource {
    pub fn new(device_path: impl Into<PathBuf>, settings: CaptureSettings) -> Self {
        Self {
            device_path: device_path.into(),
            settings,
        }
    }
}

impl FrameSource for V4lCameraSource {
    fn name(&self) -> &str {
        "v4l2"
    }

    fn start(&mut self, slot: Arc<LatestFrame>) -> Result<CaptureHandle, CaptureError> {
        let mut dev = Device::with_path(&self.device_path).map_err(|e| {
            CaptureError::NoDevice(format!("{}: {}", self.device_path.display(), e))
        })?;

        let (width, height) = self.settings.preset.resolution();
        let format = negotiate_format(&mut dev, width, height)?;
        let pixel_format = pixel_format(format.fourcc).ok_or_else(|| {
            CaptureError::Configuration(format!("unsupported pixel format {}", format.fourcc))
        })?;

        info!(
            device = %self.device_path.display(),
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "camera configured"
        );

        // The stream borrows the device, so both live on the capture thread.
        // The thread reports whether streaming started before we return.
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), CaptureError>>();
        let (frame_width, frame_height) = (format.width, format.height);
        let sensor_orientation = self.settings.sensor_orientation;

        let handle = CaptureHandle::spawn_with("v4l2", move |stop| {
            let mut stream = match MmapStream::with_buffers(&mut dev, Type::VideoCapture, BUFFER_COUNT) {
                Ok(mut stream) => {
                    stream.set_timeout(STREAM_POLL_TIMEOUT);
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(CaptureError::StreamFailed(e.to_string())));
                    return;
                }
            };

            let mut sequence = 0u64;
            while !stop.load(Ordering::SeqCst) {
                let (buf, meta) = match stream.next() {
                    Ok(next) => next,
                    Err(e) => match stream_error_action(&e) {
                        LoopAction::Continue => {
                            debug!(error = %e, "no camera frame within poll timeout");
                            continue;
                        }
                        LoopAction::Stop => {
                            warn!(error = %e, "camera stream ended");
                            break;
                        }
                    },
                };

                sequence += 1;
                let used = meta.bytesused as usize;
                let data = if used > 0 && used <= buf.len() {
                    buf[..used].to_vec()
                } else {
                    buf.to_vec()
                };
                slot.publish(Frame {
                    sequence,
                    width: frame_width,
                    height: frame_height,
                    format: pixel_format,
                    data: Some(Arc::from(data)),
                    captured_at: Instant::now(),
                    sensor_orientation,
                });

                if sequence % 120 == 0 {
                    debug!(sequence, superseded = slot.superseded(), "camera frames delivered");
                }
            }
        });

        match ready_rx.recv_timeout(STREAM_START_TIMEOUT) {
            Ok(Ok(())) => Ok(handle),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::StreamFailed("stream did not start".into())),
        }
    }
}

fn negotiate_format(dev: &mut Device, width: u32, height: u32) -> Result<Format, CaptureError> {
    let mut last_error = String::from("no candidate format");
    for fourcc in [FourCC::new(b"MJPG"), FourCC::new(b"YUYV")] {
        match dev.set_format(&Format::new(width, height, fourcc)) {
            Ok(actual) if actual.fourcc == fourcc => return Ok(actual),
            Ok(actual) => {
                debug!(requested = %fourcc, got = %actual.fourcc, "device substituted format");
                last_error = format!("device substituted {}", actual.fourcc);
            }
            Err(e) => {
                debug!(requested = %fourcc, error = %e, "format rejected");
                last_error = e.to_string();
            }
        }
    }
    Err(CaptureError::Configuration(last_error))
}

fn pixel_format(fourcc: FourCC) -> Option<PixelFormat> {
    if fourcc == FourCC::new(b"MJPG") {
        Some(PixelFormat::Mjpeg)
    } else if fourcc == FourCC::new(b"YUYV") {
        Some(PixelFormat::Yuyv)
    } else {
        None
    }
}
