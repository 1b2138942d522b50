//! The sampling loop
//!
//! [`Scanner::run`] owns the display and the status observer. Capture runs
//! on its own thread, OCR runs on the blocking pool, and every OCR result
//! comes back to the loop as a [`ScanEvent`] over a channel. Only the loop
//! validates results and writes the display.

use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::{FrameSource, LatestFrame};
use crate::config::{DEFAULT_SAMPLE_INTERVAL_MS, ScannerConfig};
use crate::detection::{TextDetector, TextRecognizer};
use crate::display::{CardDisplay, show_candidate};
use crate::error::{RecognizeError, ScanResult};
use crate::models::{CardCandidate, Frame};
use crate::pipeline::{DebugConfig, FrameAnalysis, FramePipeline};
use crate::status::{ScanStatus, StatusObserver};
use crate::validate::{ValidatorOptions, validate};

/// Cancel `cancel` once `signal` resolves successfully
///
/// A signal listener that fails to install leaves the token alone, so the
/// scan keeps running until some other stop condition.
pub async fn cancel_on_signal<F>(signal: F, cancel: CancellationToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            info!("interrupt received, stopping");
            cancel.cancel();
        }
        Err(e) => warn!(error = %e, "failed to listen for interrupt, scan continues"),
    }
}

/// Completion of one OCR call
#[derive(Debug, Clone)]
pub struct ScanEvent {
    pub sequence: u64,
    pub index: usize,
    pub result: Result<String, RecognizeError>,
}

/// Counters for one scanner session
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub session: Uuid,
    pub ticks: u64,
    pub frames_processed: u64,
    pub ocr_calls: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub frames_published: u64,
    pub frames_superseded: u64,
    pub last_candidate: Option<CardCandidate>,
}

impl ScanReport {
    fn new() -> Self {
        Self {
            session: Uuid::new_v4(),
            ticks: 0,
            frames_processed: 0,
            ocr_calls: 0,
            accepted: 0,
            rejected: 0,
            frames_published: 0,
            frames_superseded: 0,
            last_candidate: None,
        }
    }
}

pub struct Scanner {
    pipeline: FramePipeline,
    recognizer: Arc<dyn TextRecognizer>,
    validator: ValidatorOptions,
    sample_interval: Duration,
}

impl Scanner {
    pub fn new(detector: Arc<dyn TextDetector>, recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self {
            pipeline: FramePipeline::new(detector),
            recognizer,
            validator: ValidatorOptions::default(),
            sample_interval: Duration::from_millis(DEFAULT_SAMPLE_INTERVAL_MS),
        }
    }

    pub fn from_config(
        config: &ScannerConfig,
        detector: Arc<dyn TextDetector>,
        recognizer: Arc<dyn TextRecognizer>,
    ) -> Self {
        let pipeline = FramePipeline::new(detector)
            .with_confidence_threshold(config.confidence_threshold)
            .with_crop_margin(config.crop_margin)
            .with_orientation(config.capture.orientation);

        Self {
            pipeline,
            recognizer,
            validator: ValidatorOptions {
                cleanup: config.cleanup,
            },
            sample_interval: config.sample_interval(),
        }
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn with_validator(mut self, validator: ValidatorOptions) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_debug(mut self, debug: DebugConfig) -> Self {
        self.pipeline = self.pipeline.with_debug(debug);
        self
    }

    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }

    /// Start `source` and sample it until `cancel` fires or the source ends
    ///
    /// A source that fails to start is reported as
    /// [`ScanStatus::CaptureFailed`] and returned as an error; the sampler
    /// never ticks in that case. On shutdown the capture thread is stopped,
    /// in-flight OCR calls are awaited, and their results are applied.
    pub async fn run<S, D, O>(
        &self,
        source: &mut S,
        display: &mut D,
        observer: &mut O,
        cancel: CancellationToken,
    ) -> ScanResult<ScanReport>
    where
        S: FrameSource + ?Sized,
        D: CardDisplay + ?Sized,
        O: StatusObserver + ?Sized,
    {
        let mut report = ScanReport::new();
        let slot = Arc::new(LatestFrame::new());

        let capture = match source.start(Arc::clone(&slot)) {
            Ok(handle) => handle,
            Err(e) => {
                observer.on_status(&ScanStatus::CaptureFailed(e.clone()));
                return Err(e.into());
            }
        };
        observer.on_status(&ScanStatus::CaptureStarted {
            source: source.name().to_string(),
        });
        info!(
            session = %report.session,
            interval_ms = self.sample_interval.as_millis() as u64,
            "scanner started"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<ScanEvent>();
        let mut tasks = JoinSet::new();
        let mut ticker = interval_at(Instant::now() + self.sample_interval, self.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_sequence: Option<u64> = None;

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!("scanner cancelled");
                    break;
                }
                Some(event) = rx.recv() => {
                    self.apply(event, display, observer, &mut report);
                }
                Some(joined) = tasks.join_next() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "OCR task failed");
                    }
                }
                _ = ticker.tick() => {
                    report.ticks += 1;
                    let frame = slot.latest();
                    let fresh = frame
                        .as_ref()
                        .is_some_and(|f| last_sequence != Some(f.sequence));

                    if capture.is_finished() && !fresh {
                        observer.on_status(&ScanStatus::CaptureEnded);
                        break;
                    }

                    let Some(frame) = frame else {
                        observer.on_status(&ScanStatus::NoFrame);
                        continue;
                    };

                    last_sequence = Some(frame.sequence);
                    report.frames_processed += 1;
                    if let Some(analysis) = self.analyze_frame(&frame, observer) {
                        report.ocr_calls += self.spawn_recognition(analysis, &tx, &mut tasks);
                    }
                }
            }
        }

        let stopping = tokio::task::spawn_blocking(move || capture.stop());
        if let Err(e) = stopping.await {
            warn!(error = %e, "failed to stop capture");
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "OCR task failed");
            }
        }
        while let Ok(event) = rx.try_recv() {
            self.apply(event, display, observer, &mut report);
        }

        report.frames_published = slot.published();
        report.frames_superseded = slot.superseded();
        observer.on_status(&ScanStatus::Stopped);
        info!(
            session = %report.session,
            ticks = report.ticks,
            frames = report.frames_processed,
            accepted = report.accepted,
            rejected = report.rejected,
            "scanner stopped"
        );

        Ok(report)
    }

    /// Run one detection and recognition pass over a still image
    ///
    /// Results are applied in region order once every OCR call finished.
    pub async fn scan_image<D, O>(
        &self,
        image: &DynamicImage,
        display: &mut D,
        observer: &mut O,
    ) -> ScanResult<ScanReport>
    where
        D: CardDisplay + ?Sized,
        O: StatusObserver + ?Sized,
    {
        const SEQUENCE: u64 = 1;
        let mut report = ScanReport::new();
        report.frames_processed = 1;

        let analysis = match self.pipeline.analyze(SEQUENCE, image) {
            Ok(analysis) => analysis,
            Err(error) => {
                observer.on_status(&ScanStatus::DetectionFailed {
                    sequence: SEQUENCE,
                    error: error.clone(),
                });
                return Err(error.into());
            }
        };
        report_regions(&analysis, observer);

        let mut pending = Vec::with_capacity(analysis.crops.len());
        for crop in analysis.crops {
            let recognizer = Arc::clone(&self.recognizer);
            let handle = tokio::task::spawn_blocking(move || recognizer.recognize(&crop.image));
            pending.push((crop.index, handle));
        }
        report.ocr_calls = pending.len() as u64;

        for (index, handle) in pending {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(RecognizeError::TaskFailed(e.to_string())),
            };
            let event = ScanEvent {
                sequence: SEQUENCE,
                index,
                result,
            };
            self.apply(event, display, observer, &mut report);
        }

        Ok(report)
    }

    fn analyze_frame<O>(&self, frame: &Frame, observer: &mut O) -> Option<FrameAnalysis>
    where
        O: StatusObserver + ?Sized,
    {
        let image = match self.pipeline.convert(frame) {
            Ok(image) => image,
            Err(error) => {
                observer.on_status(&ScanStatus::FrameSkipped {
                    sequence: frame.sequence,
                    error,
                });
                return None;
            }
        };

        let analysis = match self.pipeline.analyze(frame.sequence, &image) {
            Ok(analysis) => analysis,
            Err(error) => {
                observer.on_status(&ScanStatus::DetectionFailed {
                    sequence: frame.sequence,
                    error,
                });
                return None;
            }
        };

        report_regions(&analysis, observer);
        Some(analysis)
    }

    fn spawn_recognition(
        &self,
        analysis: FrameAnalysis,
        tx: &mpsc::UnboundedSender<ScanEvent>,
        tasks: &mut JoinSet<()>,
    ) -> u64 {
        let mut spawned = 0;
        for crop in analysis.crops {
            let recognizer = Arc::clone(&self.recognizer);
            let tx = tx.clone();
            let sequence = analysis.sequence;
            tasks.spawn_blocking(move || {
                let result = recognizer.recognize(&crop.image);
                // The receiver lives as long as the loop that drains it
                let _ = tx.send(ScanEvent {
                    sequence,
                    index: crop.index,
                    result,
                });
            });
            spawned += 1;
        }
        spawned
    }

    fn apply<D, O>(
        &self,
        event: ScanEvent,
        display: &mut D,
        observer: &mut O,
        report: &mut ScanReport,
    ) where
        D: CardDisplay + ?Sized,
        O: StatusObserver + ?Sized,
    {
        let ScanEvent {
            sequence,
            index,
            result,
        } = event;

        let text = match result {
            Ok(text) => text,
            Err(error) => {
                observer.on_status(&ScanStatus::RecognitionFailed {
                    sequence,
                    index,
                    error,
                });
                return;
            }
        };

        match validate(&text, &self.validator) {
            Ok(candidate) => {
                show_candidate(display, &candidate);
                report.accepted += 1;
                report.last_candidate = Some(candidate.clone());
                observer.on_status(&ScanStatus::Accepted {
                    sequence,
                    index,
                    candidate,
                });
            }
            Err(reason) => {
                report.rejected += 1;
                observer.on_status(&ScanStatus::Rejected {
                    sequence,
                    index,
                    text,
                    reason,
                });
            }
        }
    }
}

fn report_regions<O>(analysis: &FrameAnalysis, observer: &mut O)
where
    O: StatusObserver + ?Sized,
{
    observer.on_status(&ScanStatus::RegionsFound {
        sequence: analysis.sequence,
        detected: analysis.detected,
        kept: analysis.regions.len(),
    });
    for &index in &analysis.skipped {
        observer.on_status(&ScanStatus::CropSkipped {
            sequence: analysis.sequence,
            index,
        });
    }
}
