//! Capture sessions from first tick to delivered archive.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use gpanel::capture::surface::{ManualTicker, MemorySink, StaticSurface};
use gpanel::capture::{
    CaptureGuard, CaptureKind, CapturePhase, CaptureScheduler, ExportCompositor, OverlayControl,
    RecordingFinisher, ScriptedRecorder, StartOutcome, VideoRecorder,
};
use gpanel::color::ColorValue;
use gpanel::config::RecordingConfig;
use gpanel::engine::mock::EngineCall;
use gpanel::engine::{Setting, SettingValue};

use crate::common::{CaptureHarness, headless_engine, init_test_logging, read_tar};

#[derive(Default)]
struct CountingOverlay {
    suppressed: AtomicUsize,
    restored: AtomicUsize,
}

impl OverlayControl for CountingOverlay {
    fn suppress(&self) {
        self.suppressed.fetch_add(1, Ordering::SeqCst);
    }

    fn restore(&self) {
        self.restored.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_time_limit_caps_frames_and_delivers_once() {
    init_test_logging();
    let h = CaptureHarness::new(6, 4);
    assert_eq!(h.scheduler.start(Some(2.0), 10).unwrap(), StartOutcome::Started);

    h.run_ticks(30).await;
    tokio::time::timeout(Duration::from_secs(5), h.scheduler.wait_idle())
        .await
        .unwrap();

    assert_eq!(h.sink.count(), 1);
    let report = h.scheduler.last_report().unwrap();
    assert_eq!(report.frame_count, 20);
    assert_eq!(report.fps, 10);
    assert!(!h.ticker.is_installed());

    // The session already ended itself.
    assert_eq!(h.scheduler.stop().await.unwrap(), None);
    assert_eq!(h.sink.count(), 1);
}

#[tokio::test]
async fn test_archive_layout_and_metadata() {
    let h = CaptureHarness::new(5, 3);
    h.surface.put_pixel(2, 1, ColorValue::rgb(250, 250, 250));
    h.scheduler.start(None, 24).unwrap();
    h.run_ticks(3).await;
    let report = h.scheduler.stop().await.unwrap().unwrap();

    let download = h.sink.last().unwrap();
    assert_eq!(download.file_name, report.file_name);
    assert!(download.file_name.starts_with("galaxy-engine-frames-"));
    assert!(download.file_name.ends_with(".tar"));
    assert!(!download.file_name.contains(':'));
    assert_eq!(report.archive_bytes, download.bytes.len());

    let members = read_tar(&download.bytes);
    let names: Vec<_> = members.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(
        names,
        ["metadata.json", "frame_000000.png", "frame_000001.png", "frame_000002.png"]
    );

    let metadata: serde_json::Value = serde_json::from_slice(&members[0].bytes).unwrap();
    assert_eq!(metadata["fps"], 24);
    assert_eq!(metadata["width"], 5);
    assert_eq!(metadata["height"], 3);
    assert_eq!(metadata["frameCount"], 3);
    assert!(metadata["createdAt"].as_str().unwrap().ends_with('Z'));
    assert!(metadata.get("fileName").is_none());

    let frame = image::load_from_memory(&members[1].bytes).unwrap().to_rgba8();
    assert_eq!(frame.dimensions(), (5, 3));
    assert_eq!(frame.get_pixel(0, 0).0, [12, 14, 40, 255]);
    assert_eq!(frame.get_pixel(2, 1).0, [250, 250, 250, 255]);
}

#[tokio::test]
async fn test_stop_without_frames_delivers_metadata_only() {
    let h = CaptureHarness::new(4, 4);
    h.scheduler.start(None, 30).unwrap();
    let report = h.scheduler.stop().await.unwrap().unwrap();
    assert_eq!(report.frame_count, 0);

    let members = read_tar(&h.sink.last().unwrap().bytes);
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].name, "metadata.json");
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let h = CaptureHarness::new(2, 2);
    assert_eq!(h.scheduler.stop().await.unwrap(), None);

    h.scheduler.start(None, 30).unwrap();
    h.run_ticks(2).await;
    assert!(h.scheduler.stop().await.unwrap().is_some());
    assert_eq!(h.scheduler.stop().await.unwrap(), None);
    assert_eq!(h.sink.count(), 1);
    assert_eq!(h.scheduler.phase(), CapturePhase::Idle);
}

#[tokio::test]
async fn test_ticks_during_capture_are_dropped() {
    let h = CaptureHarness::new(3, 3);
    h.scheduler.start(None, 60).unwrap();

    assert!(h.scheduler.tick());
    assert!(!h.scheduler.tick());
    // Delivered through the hook, and dropped the same way.
    assert!(h.ticker.fire());
    h.scheduler.settle().await;

    assert_eq!(h.scheduler.frame_count(), 1);
    let report = h.scheduler.stop().await.unwrap().unwrap();
    assert_eq!(report.frame_count, 1);
}

#[tokio::test]
async fn test_resize_mid_session_uses_latest_size() {
    let h = CaptureHarness::new(8, 8);
    h.scheduler.start(None, 30).unwrap();
    h.run_ticks(2).await;
    h.surface.resize(12, 6);
    h.run_ticks(2).await;
    let report = h.scheduler.stop().await.unwrap().unwrap();
    assert_eq!(report.frame_count, 4);
    assert_eq!((report.width, report.height), (12, 6));

    let members = read_tar(&h.sink.last().unwrap().bytes);
    let last = image::load_from_memory(&members[4].bytes).unwrap();
    assert_eq!((last.width(), last.height()), (12, 6));
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let h = CaptureHarness::new(2, 2);
    h.scheduler.start(None, 30).unwrap();
    h.run_ticks(3).await;
    h.scheduler.stop().await.unwrap();

    h.scheduler.start(None, 15).unwrap();
    h.run_ticks(1).await;
    let second = h.scheduler.stop().await.unwrap().unwrap();
    assert_eq!(second.frame_count, 1);
    assert_eq!(second.fps, 15);
    assert_eq!(h.sink.count(), 2);
}

#[tokio::test]
async fn test_finish_step_pauses_and_clears_once() {
    let (engine, bridge) = headless_engine();
    bridge
        .set(Setting::PauseAfterRecording, SettingValue::Bool(true))
        .unwrap();
    bridge
        .set(Setting::CleanSceneAfterRecording, SettingValue::Bool(true))
        .unwrap();
    let overlay = Arc::new(CountingOverlay::default());
    let finisher =
        RecordingFinisher::new(bridge.clone(), overlay.clone(), RecordingConfig::default());

    let surface = Arc::new(StaticSurface::new(2, 2, ColorValue::WHITE));
    let sink = Arc::new(MemorySink::new());
    let scheduler = CaptureScheduler::new(
        surface,
        Arc::new(ManualTicker::new()),
        sink.clone(),
        ExportCompositor::new(ColorValue::BLACK),
    )
    .with_finisher(finisher);

    scheduler.start(Some(0.1), 10).unwrap();
    assert_eq!(overlay.suppressed.load(Ordering::SeqCst), 1);
    scheduler.tick();
    tokio::time::timeout(Duration::from_secs(5), scheduler.wait_idle())
        .await
        .unwrap();
    assert_eq!(scheduler.stop().await.unwrap(), None);

    assert_eq!(sink.count(), 1);
    assert_eq!(overlay.restored.load(Ordering::SeqCst), 1);
    assert_eq!(bridge.get(Setting::TimePlaying).unwrap(), SettingValue::Bool(false));
    assert_eq!(engine.call_count("web_clear_scene"), 1);
    engine.assert_contains(&EngineCall::Action {
        symbol: "web_clear_scene".to_string(),
    });
}

#[tokio::test]
async fn test_frame_and_video_paths_exclude_each_other() {
    let guard = CaptureGuard::new();
    let surface = Arc::new(StaticSurface::new(2, 2, ColorValue::WHITE));
    let scheduler = CaptureScheduler::new(
        surface,
        Arc::new(ManualTicker::new()),
        Arc::new(MemorySink::new()),
        ExportCompositor::new(ColorValue::BLACK),
    )
    .with_guard(guard.clone());
    let backend = Arc::new(ScriptedRecorder::new(["video/webm;codecs=vp9"]));
    let video_sink = Arc::new(MemorySink::new());
    let recorder = VideoRecorder::with_options(
        backend.clone(),
        video_sink.clone(),
        guard.clone(),
        None,
        vec!["video/webm;codecs=vp9".to_string()],
    );

    scheduler.start(None, 30).unwrap();
    assert_eq!(recorder.start(30, None).unwrap(), StartOutcome::Busy(CaptureKind::Frames));
    scheduler.stop().await.unwrap();
    assert_eq!(guard.holder(), None);

    assert_eq!(recorder.start(30, None).unwrap(), StartOutcome::Started);
    assert_eq!(scheduler.start(None, 30).unwrap(), StartOutcome::Busy(CaptureKind::Video));
    backend.push_chunk(b"chunk".to_vec());
    recorder.stop();
    recorder.wait_finished().await;
    assert_eq!(guard.holder(), None);
    assert_eq!(video_sink.last().unwrap().bytes, b"chunk");
}
