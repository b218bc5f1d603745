// SPDX-License-Identifier: GPL-3.0-only

//! Development backend
//!
//! Frames are pulled from the camera on a [`CaptureWorker`] thread, handed to
//! frame observers and, while recording, written to an in-process encoder.
//! The encoder is created lazily on the first recorded frame: only then are
//! the frame size and the effective frame rate known.
//!
//! All frame handling runs on the capture thread. Control calls share the
//! session state with it through a mutex and never hold that lock while
//! waiting for the thread.

pub mod capture;
pub mod encoder;
pub mod gst_source;
pub mod v4l2;
pub mod worker;

use self::capture::{CaptureHints, DeviceOpener, SystemDeviceOpener};
use self::encoder::{EncoderFactory, FrameWriter, GstEncoderFactory, encoder_candidates};
use self::worker::CaptureWorker;
use super::VideoBackend;
use super::events::{Observers, SessionEvents, SessionHandle};
use super::fps::{FrameRateEstimator, TimestampWindow};
use super::types::{
    BackendKind, BackendState, ErrorCallback, Frame, FrameCallback, RecordingOutput, Resolution,
};
use crate::errors::{BackendError, BackendResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Encoder lifecycle within one recording
enum EncoderState {
    /// Waiting for the first frame
    Uninitialized,
    Open {
        candidate: &'static str,
        writer: Box<dyn FrameWriter>,
    },
    /// Every candidate failed
    Unavailable,
}

struct Recording {
    path: PathBuf,
    encoder: EncoderState,
}

/// State shared between control calls and the capture thread
#[derive(Default)]
struct DevSession {
    active: bool,
    /// Bumped for each preview; events of older sessions are ignored
    generation: u64,
    requested_fps: u32,
    timestamps: TimestampWindow,
    recording: Option<Recording>,
}

fn lock(shared: &Mutex<DevSession>) -> MutexGuard<'_, DevSession> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// Camera backend with an in-process encoder
pub struct DevBackend {
    camera_index: u32,
    opener: Arc<dyn DeviceOpener>,
    encoders: Arc<dyn EncoderFactory>,
    frame_observers: Arc<Observers<Frame>>,
    error_observers: Arc<Observers<BackendError>>,
    shared: Arc<Mutex<DevSession>>,
    worker: Option<CaptureWorker>,
    session: Option<SessionHandle>,
}

impl DevBackend {
    /// Backend for camera `camera_index` using the system capture and encoder stack
    pub fn new(camera_index: u32) -> Self {
        Self::with_components(
            camera_index,
            Arc::new(SystemDeviceOpener),
            Arc::new(GstEncoderFactory),
        )
    }

    /// Backend with explicit capture and encoder implementations
    pub fn with_components(
        camera_index: u32,
        opener: Arc<dyn DeviceOpener>,
        encoders: Arc<dyn EncoderFactory>,
    ) -> Self {
        Self {
            camera_index,
            opener,
            encoders,
            frame_observers: Arc::new(Observers::new()),
            error_observers: Arc::new(Observers::new()),
            shared: Arc::new(Mutex::new(DevSession::default())),
            worker: None,
            session: None,
        }
    }

    pub fn camera_index(&self) -> u32 {
        self.camera_index
    }

    /// Whether frames are actually reaching a file
    ///
    /// `None` when not recording.
    pub fn recording_output(&self) -> Option<RecordingOutput> {
        let session = lock(&self.shared);
        session.recording.as_ref().map(|rec| match &rec.encoder {
            EncoderState::Uninitialized => RecordingOutput::Pending,
            EncoderState::Open { candidate, .. } => RecordingOutput::Writing {
                candidate: candidate.to_string(),
            },
            EncoderState::Unavailable => RecordingOutput::Unavailable,
        })
    }

    /// Path of the recording in progress
    pub fn recording_path(&self) -> Option<PathBuf> {
        lock(&self.shared)
            .recording
            .as_ref()
            .map(|rec| rec.path.clone())
    }

    /// Subscribe the backend's internal handlers to a new session's events
    fn wire_session(&self, events: &SessionEvents, generation: u64) {
        let shared = Arc::clone(&self.shared);
        let encoders = Arc::clone(&self.encoders);
        let frame_observers = Arc::clone(&self.frame_observers);
        let error_observers = Arc::clone(&self.error_observers);
        events.frames.subscribe(Arc::new(move |frame: &Frame| {
            handle_frame(
                &shared,
                encoders.as_ref(),
                &frame_observers,
                &error_observers,
                generation,
                frame,
            );
        }));

        let error_observers = Arc::clone(&self.error_observers);
        events.errors.subscribe(Arc::new(move |err: &BackendError| {
            error_observers.emit(err);
        }));

        let shared = Arc::clone(&self.shared);
        events.finished.subscribe(Arc::new(move |_: &()| {
            let recording = {
                let mut session = lock(&shared);
                if session.generation != generation || !session.active {
                    return;
                }
                info!("Capture ended, tearing down session");
                session.active = false;
                session.recording.take()
            };
            if let Some(recording) = recording {
                close_recording(recording);
            }
        }));
    }

    fn stop_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            if !worker.stop() {
                warn!("Capture thread still blocked in a read; it will exit on its own");
            }
        }
    }
}

/// Frame path on the capture thread
fn handle_frame(
    shared: &Mutex<DevSession>,
    encoders: &dyn EncoderFactory,
    frame_observers: &Observers<Frame>,
    error_observers: &Observers<BackendError>,
    generation: u64,
    frame: &Frame,
) {
    let mut unavailable = None;
    {
        let mut session = lock(shared);
        if session.generation != generation || !session.active {
            return;
        }

        session.timestamps.push(Instant::now());
        let fps = FrameRateEstimator::new(session.requested_fps).estimate(&session.timestamps);

        if let Some(recording) = session.recording.as_mut() {
            if matches!(recording.encoder, EncoderState::Uninitialized) {
                recording.encoder = open_encoder(encoders, &recording.path, frame, fps);
                if matches!(recording.encoder, EncoderState::Unavailable) {
                    unavailable = Some(BackendError::EncoderUnavailable(format!(
                        "no encoder could write {}",
                        recording.path.display()
                    )));
                }
            }

            if let EncoderState::Open { candidate, writer } = &mut recording.encoder {
                if let Err(e) = writer.write(frame) {
                    warn!(candidate = *candidate, error = %e, "Failed to write frame");
                }
            }
        }
    }

    if let Some(err) = unavailable {
        error_observers.emit(&err);
    }
    frame_observers.emit(frame);
}

/// Try each candidate for `path` in order
fn open_encoder(
    encoders: &dyn EncoderFactory,
    path: &Path,
    frame: &Frame,
    fps: u32,
) -> EncoderState {
    for candidate in encoder_candidates(path) {
        match encoders.open(candidate, path, frame.width(), frame.height(), fps) {
            Ok(writer) => {
                info!(
                    candidate = candidate.name,
                    path = %path.display(),
                    fps,
                    "Recording started"
                );
                return EncoderState::Open {
                    candidate: candidate.name,
                    writer,
                };
            }
            Err(e) => {
                warn!(candidate = candidate.name, error = %e, "Encoder candidate failed");
            }
        }
    }

    error!(path = %path.display(), "No encoder available, dropping recorded frames");
    EncoderState::Unavailable
}

fn close_recording(recording: Recording) {
    match recording.encoder {
        EncoderState::Open { candidate, writer } => match writer.close() {
            Ok(()) => info!(path = %recording.path.display(), candidate, "Recording saved"),
            Err(e) => warn!(path = %recording.path.display(), error = %e, "Failed to close encoder"),
        },
        EncoderState::Uninitialized => {
            debug!(path = %recording.path.display(), "Recording stopped before the first frame")
        }
        EncoderState::Unavailable => {
            debug!(path = %recording.path.display(), "Recording stopped without output")
        }
    }
}

impl VideoBackend for DevBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dev
    }

    fn start_preview(&mut self, resolution: Resolution, fps: u32) -> BackendResult<SessionHandle> {
        if let Some(handle) = &self.session {
            if lock(&self.shared).active {
                info!("Preview already running");
                return Ok(handle.clone());
            }
        }

        // Worker of a session that ended on its own
        self.stop_worker();
        self.session = None;

        let generation = {
            let mut session = lock(&self.shared);
            session.generation += 1;
            session.active = true;
            session.requested_fps = fps;
            session.timestamps.clear();
            session.recording = None;
            session.generation
        };

        let events = Arc::new(SessionEvents::default());
        self.wire_session(&events, generation);

        let hints = CaptureHints { resolution, fps };
        info!(camera = self.camera_index, %resolution, fps, "Starting preview");
        match CaptureWorker::spawn(
            Arc::clone(&self.opener),
            self.camera_index,
            hints,
            Arc::clone(&events),
        ) {
            Ok(worker) => {
                info!(api = %worker.api(), "Preview started");
                self.worker = Some(worker);
                let handle = SessionHandle::new(events);
                self.session = Some(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                let mut session = lock(&self.shared);
                if session.generation == generation {
                    session.active = false;
                }
                Err(e)
            }
        }
    }

    fn start_recording(&mut self, path: &Path) -> BackendResult<()> {
        let mut session = lock(&self.shared);
        if !session.active {
            return Err(BackendError::PreviewNotActive);
        }
        if session.recording.is_some() {
            info!("Already recording");
            return Ok(());
        }

        info!(path = %path.display(), "Recording requested, encoder opens on next frame");
        session.recording = Some(Recording {
            path: path.to_path_buf(),
            encoder: EncoderState::Uninitialized,
        });
        Ok(())
    }

    fn stop_recording(&mut self) -> BackendResult<()> {
        let recording = lock(&self.shared).recording.take();
        if let Some(recording) = recording {
            close_recording(recording);
        }
        Ok(())
    }

    fn stop_all(&mut self) {
        let _ = self.stop_recording();
        {
            let mut session = lock(&self.shared);
            session.active = false;
        }
        self.stop_worker();
        self.session = None;
        debug!("Dev backend idle");
    }

    fn on_frame(&self, callback: FrameCallback) {
        self.frame_observers.subscribe(callback);
    }

    fn on_error(&self, callback: ErrorCallback) {
        self.error_observers.subscribe(callback);
    }

    fn delivers_frames(&self) -> bool {
        true
    }

    fn state(&self) -> BackendState {
        let session = lock(&self.shared);
        match (session.active, session.recording.is_some()) {
            (false, _) => BackendState::Idle,
            (true, false) => BackendState::Previewing,
            (true, true) => BackendState::Recording,
        }
    }
}

impl Drop for DevBackend {
    fn drop(&mut self) {
        self.stop_all();
    }
}
