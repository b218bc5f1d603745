// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the embedded backend state machine

mod common;

use camrec::backends::embedded::pipeline::BusMessage;
use camrec::backends::embedded::{EmbeddedBackend, EmbeddedOptions};
use camrec::backends::{BackendState, Frame, Resolution, VideoBackend};
use camrec::config::PipelineSettings;
use camrec::errors::BackendError;
use common::{ErrorLog, FakeLauncher, PipelineScript, wait_until};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(3);

fn options() -> EmbeddedOptions {
    EmbeddedOptions {
        device: "/dev/video0".to_string(),
        pipeline: PipelineSettings::default(),
        eos_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_millis(10),
    }
}

fn backend_with(options: EmbeddedOptions) -> (EmbeddedBackend, Arc<PipelineScript>) {
    let launcher = FakeLauncher::new();
    let script = Arc::clone(&launcher.script);
    (
        EmbeddedBackend::with_launcher(options, Arc::new(launcher)),
        script,
    )
}

fn res() -> Resolution {
    Resolution::new(1280, 720)
}

const CLIP: &str = "/tmp/camrec-embedded/clip.mp4";

#[test]
fn test_preview_launches_display_graph() {
    let (mut backend, script) = backend_with(options());

    backend.start_preview(res(), 30).unwrap();

    assert_eq!(backend.state(), BackendState::Previewing);
    assert!(!backend.delivers_frames());
    assert_eq!(
        script.launched(),
        vec![
            "v4l2src device=/dev/video0 ! video/x-raw,width=1280,height=720,framerate=30/1 ! \
             videoconvert ! autovideosink sync=false"
                .to_string()
        ]
    );

    // Accepted and ignored
    backend.on_frame(Arc::new(|_: &Frame| {}));
    backend.stop_all();
}

#[test]
fn test_restart_preview_rebuilds_pipeline() {
    let (mut backend, script) = backend_with(options());

    backend.start_preview(res(), 30).unwrap();
    backend.start_preview(Resolution::new(640, 480), 15).unwrap();

    assert_eq!(script.launched().len(), 2);
    assert_eq!(script.shutdowns.load(Ordering::SeqCst), 1);
    assert!(script.last_launched().unwrap().contains("width=640,height=480,framerate=15/1"));
    backend.stop_all();
}

#[test]
fn test_recording_requires_preview() {
    let (mut backend, script) = backend_with(options());

    let result = backend.start_recording(Path::new(CLIP));

    assert_eq!(result, Err(BackendError::PreviewNotActive));
    assert!(script.launched().is_empty());
}

#[test]
fn test_stop_recording_without_recording_does_not_rebuild() {
    let (mut backend, script) = backend_with(options());
    backend.start_preview(res(), 30).unwrap();

    backend.stop_recording().unwrap();

    assert_eq!(script.launched().len(), 1);
    assert_eq!(script.eos_sent.load(Ordering::SeqCst), 0);
    assert_eq!(backend.state(), BackendState::Previewing);
    backend.stop_all();
}

#[test]
fn test_record_then_stop_returns_to_preview() {
    let (mut backend, script) = backend_with(options());
    backend.start_preview(res(), 30).unwrap();

    backend.start_recording(Path::new(CLIP)).unwrap();
    assert_eq!(backend.state(), BackendState::Recording);
    assert_eq!(backend.recording_path(), Some(Path::new(CLIP)));

    let record = script.last_launched().unwrap();
    assert!(record.contains("tee name=t"));
    assert!(record.contains("v4l2h264enc ! h264parse ! mp4mux faststart=true"));
    assert!(record.contains(&format!("filesink location=\"{}\"", CLIP)));

    // Already recording: no rebuild
    backend.start_recording(Path::new(CLIP)).unwrap();
    assert_eq!(script.launched().len(), 2);

    let start = Instant::now();
    backend.stop_recording().unwrap();
    assert!(start.elapsed() < Duration::from_millis(450), "EOS should end the wait early");

    assert_eq!(backend.state(), BackendState::Previewing);
    assert_eq!(backend.recording_path(), None);
    assert_eq!(script.eos_sent.load(Ordering::SeqCst), 1);
    let launched = script.launched();
    assert_eq!(launched.len(), 3);
    assert_eq!(launched[2], launched[0]);
    backend.stop_all();
}

#[test]
fn test_stop_recording_times_out_without_eos() {
    let mut opts = options();
    opts.eos_timeout = Duration::from_millis(150);
    let (mut backend, script) = backend_with(opts);
    script.ignore_eos.store(true, Ordering::SeqCst);

    backend.start_preview(res(), 30).unwrap();
    backend.start_recording(Path::new(CLIP)).unwrap();

    let start = Instant::now();
    backend.stop_recording().unwrap();

    assert!(start.elapsed() >= Duration::from_millis(150));
    assert_eq!(backend.state(), BackendState::Previewing);
    assert!(!script.last_launched().unwrap().contains("tee"));
    backend.stop_all();
}

#[test]
fn test_fatal_bus_error_tears_down() {
    let (mut backend, script) = backend_with(options());
    let errors = ErrorLog::default();
    backend.on_error(errors.callback());

    let handle = backend.start_preview(res(), 30).unwrap();
    let finished = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&finished);
    handle.on_finished(move || {
        f.fetch_add(1, Ordering::SeqCst);
    });

    script.post(BusMessage::Warning {
        message: "dropped a buffer".to_string(),
        debug: None,
    });
    script.post(BusMessage::Error {
        message: "Device '/dev/video0' was disconnected".to_string(),
        debug: None,
    });

    assert!(wait_until(WAIT, || backend.state() == BackendState::Idle));
    assert!(wait_until(WAIT, || finished.load(Ordering::SeqCst) == 1));
    assert_eq!(
        errors.snapshot(),
        vec![BackendError::PipelineFatal(
            "Device '/dev/video0' was disconnected".to_string()
        )]
    );
    assert_eq!(script.shutdowns.load(Ordering::SeqCst), 1);

    // Teardown after the fatal path is a no-op
    backend.stop_all();
    assert_eq!(script.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert_eq!(errors.snapshot().len(), 1);
}

#[test]
fn test_parse_failure_leaves_backend_idle() {
    let (mut backend, script) = backend_with(options());
    let errors = ErrorLog::default();
    backend.on_error(errors.callback());
    *script.parse_fails_on.lock().unwrap() = Some("v4l2src".to_string());

    let result = backend.start_preview(res(), 30);

    assert!(matches!(result, Err(BackendError::PipelineParse(_))));
    assert_eq!(backend.state(), BackendState::Idle);
    assert!(script.launched().is_empty());
    assert_eq!(errors.snapshot().len(), 1);
    assert!(matches!(errors.snapshot()[0], BackendError::PipelineParse(_)));
}

#[test]
fn test_state_failure_shuts_pipeline_down() {
    let (mut backend, script) = backend_with(options());
    let errors = ErrorLog::default();
    backend.on_error(errors.callback());
    *script.play_fails_on.lock().unwrap() = Some("autovideosink".to_string());

    let result = backend.start_preview(res(), 30);

    assert!(matches!(result, Err(BackendError::PipelineState(_))));
    assert_eq!(backend.state(), BackendState::Idle);
    assert_eq!(script.shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(errors.snapshot().len(), 1);
}

#[test]
fn test_zero_fps_uses_default_rate() {
    let (mut backend, script) = backend_with(options());

    backend.start_preview(res(), 0).unwrap();

    assert!(script.last_launched().unwrap().contains("framerate=30/1"));
    backend.stop_all();
}

#[test]
fn test_failed_restore_ends_session() {
    let (mut backend, script) = backend_with(options());
    let errors = ErrorLog::default();
    backend.on_error(errors.callback());
    let handle = backend.start_preview(res(), 30).unwrap();
    let finished = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&finished);
    handle.on_finished(move || {
        f.fetch_add(1, Ordering::SeqCst);
    });

    // Both the recording graph and the preview graph refuse to start
    *script.play_fails_on.lock().unwrap() = Some("videoconvert".to_string());
    let result = backend.start_recording(Path::new(CLIP));

    assert!(matches!(result, Err(BackendError::PipelineState(_))));
    assert_eq!(backend.state(), BackendState::Idle);
    assert_eq!(errors.snapshot().len(), 1);
    assert_eq!(finished.load(Ordering::SeqCst), 1);

    backend.stop_all();
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_fatal_error_while_finalizing_stays_idle() {
    let mut opts = options();
    opts.eos_timeout = Duration::from_millis(1000);
    let (mut backend, script) = backend_with(opts);
    script.ignore_eos.store(true, Ordering::SeqCst);
    let errors = ErrorLog::default();
    backend.on_error(errors.callback());

    let handle = backend.start_preview(res(), 30).unwrap();
    let finished = Arc::new(AtomicUsize::new(0));
    let f = Arc::clone(&finished);
    handle.on_finished(move || {
        f.fetch_add(1, Ordering::SeqCst);
    });
    backend.start_recording(Path::new(CLIP)).unwrap();

    let poster = Arc::clone(&script);
    let crash = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        poster.post(BusMessage::Error {
            message: "Could not write to resource".to_string(),
            debug: None,
        });
    });
    backend.stop_recording().unwrap();
    crash.join().unwrap();

    assert_eq!(backend.state(), BackendState::Idle);
    assert_eq!(script.launched().len(), 2);
    assert_eq!(errors.snapshot().len(), 1);
    assert!(wait_until(WAIT, || finished.load(Ordering::SeqCst) == 1));
}

#[test]
fn test_recording_without_encoder_is_not_implemented() {
    let mut opts = options();
    opts.pipeline.record_encoder = None;
    let (mut backend, script) = backend_with(opts);
    backend.start_preview(res(), 30).unwrap();

    let result = backend.start_recording(Path::new(CLIP));

    assert!(matches!(result, Err(BackendError::NotImplemented(_))));
    assert_eq!(backend.state(), BackendState::Previewing);
    assert_eq!(script.launched().len(), 1);
    backend.stop_all();
}

#[test]
fn test_failed_recording_graph_restores_preview() {
    let (mut backend, script) = backend_with(options());
    backend.start_preview(res(), 30).unwrap();
    *script.play_fails_on.lock().unwrap() = Some("v4l2h264enc".to_string());

    let result = backend.start_recording(Path::new(CLIP));

    assert!(matches!(result, Err(BackendError::PipelineState(_))));
    assert_eq!(backend.state(), BackendState::Previewing);
    let launched = script.launched();
    assert_eq!(launched.len(), 3);
    assert_eq!(launched[2], launched[0]);
    backend.stop_all();
}

#[test]
fn test_stop_all_is_idempotent() {
    let (mut backend, script) = backend_with(options());

    backend.stop_all();
    backend.start_preview(res(), 30).unwrap();
    backend.start_recording(Path::new(CLIP)).unwrap();

    backend.stop_all();
    backend.stop_all();

    assert_eq!(backend.state(), BackendState::Idle);
    // preview torn down for the recording graph, then the recording graph
    assert_eq!(script.shutdowns.load(Ordering::SeqCst), 2);
    assert_eq!(backend.stop_recording(), Ok(()));
}
