mod common;

use std::sync::Arc;
use std::time::Duration;

use cardscan::error::{CaptureError, RecognizeError, ScanError};
use cardscan::scanner::cancel_on_signal;
use cardscan::validate::Rejection;
use common::*;
use tokio_util::sync::CancellationToken;

const VALID: &str = "41111111111111119999";

fn cancel_after(ms: u64) -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        child.cancel();
    });
    token
}

fn build_scanner(detector: &Arc<FakeDetector>, recognizer: &Arc<FakeRecognizer>) -> Scanner {
    Scanner::new(detector.clone(), recognizer.clone())
}

#[tokio::test(start_paused = true)]
async fn test_ticks_every_interval_and_updates_display() {
    let detector = Arc::new(FakeDetector::single_region());
    let recognizer = Arc::new(FakeRecognizer::new(&[VALID]));
    let scanner = build_scanner(&detector, &recognizer);
    let mut source = StaticSource::image(&create_card_image(200, 300));
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    let report = scanner
        .run(&mut source, &mut display, &mut observer, cancel_after(1250))
        .await
        .unwrap();

    // Ticks at 500 ms and 1000 ms; the held frame is read again each tick
    assert_eq!(report.ticks, 2);
    assert_eq!(report.frames_processed, 2);
    assert_eq!(report.ocr_calls, 2);
    assert_eq!(report.accepted, 2);
    assert_eq!(detector.calls(), 2);
    assert_eq!(recognizer.calls(), 2);

    assert_eq!(display.number(), Some("4111111111111111"));
    assert_eq!(display.code(), Some("9999"));
    assert_eq!(
        report.last_candidate,
        Some(CardCandidate {
            number: "4111111111111111".to_string(),
            code: "9999".to_string(),
        })
    );

    let statuses = observer.statuses();
    assert!(matches!(statuses.first(), Some(ScanStatus::CaptureStarted { .. })));
    assert_eq!(statuses.last(), Some(&ScanStatus::Stopped));
}

#[tokio::test(start_paused = true)]
async fn test_no_tick_before_first_interval() {
    let detector = Arc::new(FakeDetector::single_region());
    let recognizer = Arc::new(FakeRecognizer::new(&[VALID]));
    let scanner = build_scanner(&detector, &recognizer);
    let mut source = StaticSource::image(&create_card_image(200, 300));
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    let report = scanner
        .run(&mut source, &mut display, &mut observer, cancel_after(400))
        .await
        .unwrap();

    assert_eq!(report.ticks, 0);
    assert_eq!(detector.calls(), 0);
    assert_eq!(display.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custom_interval() {
    let detector = Arc::new(FakeDetector::single_region());
    let recognizer = Arc::new(FakeRecognizer::new(&[VALID]));
    let scanner = build_scanner(&detector, &recognizer).with_sample_interval(Duration::from_millis(100));
    let mut source = StaticSource::image(&create_card_image(200, 300));
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    let report = scanner
        .run(&mut source, &mut display, &mut observer, cancel_after(550))
        .await
        .unwrap();

    assert_eq!(report.ticks, 5);
}

#[tokio::test(start_paused = true)]
async fn test_setup_failure_never_ticks() {
    let detector = Arc::new(FakeDetector::single_region());
    let recognizer = Arc::new(FakeRecognizer::new(&[VALID]));
    let scanner = build_scanner(&detector, &recognizer);
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    let result = scanner
        .run(&mut FailingSource, &mut display, &mut observer, cancel_after(2000))
        .await;

    let expected = CaptureError::NoDevice("no camera attached".to_string());
    assert_eq!(result.unwrap_err(), ScanError::Capture(expected.clone()));
    assert_eq!(observer.statuses(), vec![ScanStatus::CaptureFailed(expected)]);
    assert_eq!(detector.calls(), 0);
    assert_eq!(display.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_tick_without_frame_does_nothing() {
    let detector = Arc::new(FakeDetector::single_region());
    let recognizer = Arc::new(FakeRecognizer::new(&[VALID]));
    let scanner = build_scanner(&detector, &recognizer);
    let mut source = StaticSource::empty();
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    let report = scanner
        .run(&mut source, &mut display, &mut observer, cancel_after(1250))
        .await
        .unwrap();

    assert_eq!(report.ticks, 2);
    assert_eq!(report.frames_processed, 0);
    assert_eq!(observer.count(|s| *s == ScanStatus::NoFrame), 2);
    assert_eq!(detector.calls(), 0);
    assert_eq!(display.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_last_accepted_result_wins() {
    let detector = Arc::new(FakeDetector::single_region());
    let recognizer = Arc::new(FakeRecognizer::new(&[
        "43214321432143214321",
        "52345678901234567890",
    ]));
    let scanner = build_scanner(&detector, &recognizer);
    let mut source = StaticSource::image(&create_card_image(200, 300));
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    let report = scanner
        .run(&mut source, &mut display, &mut observer, cancel_after(1250))
        .await
        .unwrap();

    assert_eq!(report.accepted, 2);
    assert_eq!(display.number(), Some("5234567890123456"));
    assert_eq!(display.code(), Some("7890"));
    assert_eq!(display.writes(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_text_leaves_display_unchanged() {
    let detector = Arc::new(FakeDetector::single_region());
    let recognizer = Arc::new(FakeRecognizer::new(&["1111222233334444555"]));
    let scanner = build_scanner(&detector, &recognizer);
    let mut source = StaticSource::image(&create_card_image(200, 300));
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    let report = scanner
        .run(&mut source, &mut display, &mut observer, cancel_after(750))
        .await
        .unwrap();

    assert_eq!(report.rejected, 1);
    assert_eq!(display.writes(), 0);
    assert_eq!(
        observer.count(|s| matches!(
            s,
            ScanStatus::Rejected {
                reason: Rejection::NoTwentyDigitRun,
                ..
            }
        )),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_low_confidence_regions_are_not_read() {
    let detector = Arc::new(FakeDetector::new(vec![observation(0.1, 0.3, 0.8, 0.3, 0.8)]));
    let recognizer = Arc::new(FakeRecognizer::new(&[VALID]));
    let scanner = build_scanner(&detector, &recognizer);
    let mut source = StaticSource::image(&create_card_image(200, 300));
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    let report = scanner
        .run(&mut source, &mut display, &mut observer, cancel_after(750))
        .await
        .unwrap();

    assert_eq!(report.ocr_calls, 0);
    assert_eq!(recognizer.calls(), 0);
    assert!(observer.statuses().contains(&ScanStatus::RegionsFound {
        sequence: 1,
        detected: 1,
        kept: 0,
    }));
}

#[tokio::test(start_paused = true)]
async fn test_missing_buffer_skips_cycle() {
    let detector = Arc::new(FakeDetector::single_region());
    let recognizer = Arc::new(FakeRecognizer::new(&[VALID]));
    let scanner = build_scanner(&detector, &recognizer);
    let mut source = StaticSource::new(vec![Frame::without_buffer(3, 640, 480, PixelFormat::Yuyv)]);
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    scanner
        .run(&mut source, &mut display, &mut observer, cancel_after(750))
        .await
        .unwrap();

    assert_eq!(detector.calls(), 0);
    assert_eq!(observer.count(|s| matches!(s, ScanStatus::FrameSkipped { sequence: 3, .. })), 1);
}

#[tokio::test(start_paused = true)]
async fn test_detection_and_recognition_errors_are_reported() {
    let detector = Arc::new(FakeDetector::failing());
    let recognizer = Arc::new(FakeRecognizer::new(&[VALID]));
    let scanner = build_scanner(&detector, &recognizer);
    let mut source = StaticSource::image(&create_card_image(200, 300));
    let mut observer = RecordingObserver::new();

    scanner
        .run(&mut source, &mut LabelDisplay::new(), &mut observer, cancel_after(750))
        .await
        .unwrap();
    assert_eq!(observer.count(|s| matches!(s, ScanStatus::DetectionFailed { .. })), 1);
    assert_eq!(recognizer.calls(), 0);

    let detector = Arc::new(FakeDetector::single_region());
    let recognizer = Arc::new(FakeRecognizer::scripted(vec![Err(RecognizeError::Engine(
        "bad input".to_string(),
    ))]));
    let scanner = build_scanner(&detector, &recognizer);
    let mut source = StaticSource::image(&create_card_image(200, 300));
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    scanner
        .run(&mut source, &mut display, &mut observer, cancel_after(750))
        .await
        .unwrap();
    assert_eq!(observer.count(|s| matches!(s, ScanStatus::RecognitionFailed { .. })), 1);
    assert_eq!(display.writes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_finished_capture_ends_run() {
    let detector = Arc::new(FakeDetector::single_region());
    let recognizer = Arc::new(FakeRecognizer::new(&[VALID]));
    let scanner = build_scanner(&detector, &recognizer);
    let mut source = StaticSource::image(&create_card_image(200, 300)).finite();
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    // Never cancelled: the run ends once the capture thread is gone
    let report = scanner
        .run(&mut source, &mut display, &mut observer, CancellationToken::new())
        .await
        .unwrap();

    assert!(report.frames_processed >= 1);
    assert!(report.accepted >= 1);
    assert_eq!(display.number(), Some("4111111111111111"));
    assert_eq!(observer.count(|s| *s == ScanStatus::CaptureEnded), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_recognition_does_not_hold_up_sampling() {
    let detector = Arc::new(FakeDetector::single_region());
    // The first sample is read slowly, the second one quickly
    let recognizer = Arc::new(DelayedRecognizer::new(&[
        (1000, "41111111111111119999"),
        (10, "52345678901234567890"),
    ]));
    let scanner = Scanner::new(detector.clone(), recognizer.clone())
        .with_sample_interval(Duration::from_millis(200));
    let mut source = StaticSource::image(&create_card_image(200, 300));
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    let report = scanner
        .run(&mut source, &mut display, &mut observer, cancel_after(500))
        .await
        .unwrap();

    // The second tick fired while the first OCR call was still running
    assert_eq!(report.ticks, 2);
    assert_eq!(report.ocr_calls, 2);
    assert_eq!(recognizer.calls(), 2);
    assert_eq!(report.accepted, 2);

    let accepted: Vec<String> = observer
        .statuses()
        .into_iter()
        .filter_map(|s| match s {
            ScanStatus::Accepted { candidate, .. } => Some(candidate.number),
            _ => None,
        })
        .collect();
    assert_eq!(accepted, vec!["5234567890123456", "4111111111111111"]);

    // The display shows the last completion, which came from the first sample
    assert_eq!(display.number(), Some("4111111111111111"));
    assert_eq!(display.code(), Some("9999"));
}

#[tokio::test]
async fn test_replay_landscape_image_reaches_detector_upright() {
    let detector = Arc::new(FakeDetector::single_region());
    let recognizer = Arc::new(FakeRecognizer::new(&[VALID]));
    let scanner = build_scanner(&detector, &recognizer).with_sample_interval(Duration::from_millis(50));
    let mut source = ReplaySource::from_images(vec![create_card_image(300, 200)], Duration::from_millis(5))
        .with_loops(Some(1));
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    let report = scanner
        .run(&mut source, &mut display, &mut observer, cancel_after(5000))
        .await
        .unwrap();
    assert!(report.frames_processed >= 1);

    let seen = detector.last_image().expect("detector was called").to_rgb8();
    assert_eq!(seen.dimensions(), (300, 200));
    // The dark band still runs horizontally through the middle
    assert_eq!(seen.get_pixel(10, 100)[0], 20);
    assert_eq!(seen.get_pixel(290, 100)[0], 20);
    assert_eq!(seen.get_pixel(150, 10)[0], 240);
}

#[tokio::test]
async fn test_interrupt_cancels_scan() {
    let cancel = CancellationToken::new();
    cancel_on_signal(async { Ok::<(), std::io::Error>(()) }, cancel.clone()).await;
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn test_failed_interrupt_listener_keeps_scanning() {
    let cancel = CancellationToken::new();
    cancel_on_signal(
        async { Err::<(), _>(std::io::Error::other("signal handler unavailable")) },
        cancel.clone(),
    )
    .await;
    assert!(!cancel.is_cancelled());
}

#[tokio::test]
async fn test_scan_image_once() {
    let detector = Arc::new(FakeDetector::new(vec![
        observation(0.1, 0.1, 0.8, 0.2, 0.95),
        observation(0.1, 0.5, 0.8, 0.2, 0.9),
    ]));
    let recognizer = Arc::new(FakeRecognizer::new(&["VISA", "52345678901234567890"]));
    let scanner = build_scanner(&detector, &recognizer);
    let mut display = LabelDisplay::new();
    let mut observer = RecordingObserver::new();

    let report = scanner
        .scan_image(&create_card_image(300, 200), &mut display, &mut observer)
        .await
        .unwrap();

    assert_eq!(report.ocr_calls, 2);
    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(display.number(), Some("5234567890123456"));
    assert_eq!(display.code(), Some("7890"));
}
