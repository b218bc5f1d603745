// SPDX-License-Identifier: GPL-3.0-only

//! Embedded backend
//!
//! Preview and recording run entirely inside GStreamer. The preview graph
//! renders into the framework's own display sink; recording replaces it with
//! a graph that tees the same stream into an H.264 encoder and an MP4 muxer.
//! Graphs are never edited while running: every transition tears the current
//! pipeline down and launches a new one.
//!
//! A [`BusMonitor`](monitor::BusMonitor) thread watches each pipeline. A bus
//! error is fatal: it is reported and the pipeline torn down, leaving the
//! backend idle.

pub mod description;
pub mod monitor;
pub mod pipeline;

use self::description::{preview_description, record_description};
use self::monitor::BusMonitor;
use self::pipeline::{GstLauncher, ManagedPipeline, PipelineLauncher};
use super::VideoBackend;
use super::events::{Observers, SessionEvents, SessionHandle};
use super::types::{BackendKind, BackendState, ErrorCallback, FrameCallback, Resolution};
use crate::config::{PipelineSettings, Settings};
use crate::constants::{defaults, pipeline as consts, timing};
use crate::errors::{BackendError, BackendResult};
use gstreamer as gst;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Construction options for [`EmbeddedBackend`]
#[derive(Debug, Clone)]
pub struct EmbeddedOptions {
    /// Device path handed to the source element
    pub device: String,
    pub pipeline: PipelineSettings,
    /// Maximum wait for end-of-stream when a recording stops
    pub eos_timeout: Duration,
    /// Bus poll interval of the monitor thread
    pub poll_interval: Duration,
}

impl Default for EmbeddedOptions {
    fn default() -> Self {
        Self {
            device: format!("{}0", consts::DEVICE_PATH_PREFIX),
            pipeline: PipelineSettings::default(),
            eos_timeout: timing::EOS_TIMEOUT,
            poll_interval: timing::BUS_POLL_INTERVAL,
        }
    }
}

impl EmbeddedOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            device: settings.device_path(),
            pipeline: settings.pipeline.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    PreviewOnly,
    Recording,
}

/// State shared with the monitor thread
struct Inner {
    mode: Mode,
    /// Bumped for every launched pipeline; stale fatal reports are ignored
    generation: u64,
    pipeline: Option<Box<dyn ManagedPipeline>>,
    events: Option<Arc<SessionEvents>>,
}

fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// GStreamer pipeline backend with a native display sink
pub struct EmbeddedBackend {
    options: EmbeddedOptions,
    launcher: Arc<dyn PipelineLauncher>,
    shared: Arc<Mutex<Inner>>,
    error_observers: Arc<Observers<BackendError>>,
    monitor: Option<BusMonitor>,
    eos_rx: Option<Receiver<()>>,
    resolution: Resolution,
    fps: u32,
    recording_path: Option<PathBuf>,
    session: Option<SessionHandle>,
}

impl EmbeddedBackend {
    /// Initialize GStreamer and check the configured elements exist
    pub fn new(options: EmbeddedOptions) -> BackendResult<Self> {
        gst::init().map_err(|e| BackendError::NotAvailable(format!("GStreamer init: {}", e)))?;

        for element in [
            options.pipeline.source.as_str(),
            "videoconvert",
            options.pipeline.display_sink.as_str(),
        ] {
            if gst::ElementFactory::find(element).is_none() {
                return Err(BackendError::NotAvailable(format!(
                    "GStreamer element '{}' not found",
                    element
                )));
            }
        }
        if let Some(encoder) = &options.pipeline.record_encoder {
            if gst::ElementFactory::find(encoder).is_none() {
                warn!(encoder = %encoder, "Recording encoder not found, recording will fail");
            }
        }

        info!(device = %options.device, "Embedded backend ready");
        Ok(Self::with_launcher(options, Arc::new(GstLauncher)))
    }

    /// Backend over an arbitrary pipeline launcher
    pub fn with_launcher(options: EmbeddedOptions, launcher: Arc<dyn PipelineLauncher>) -> Self {
        Self {
            options,
            launcher,
            shared: Arc::new(Mutex::new(Inner {
                mode: Mode::Idle,
                generation: 0,
                pipeline: None,
                events: None,
            })),
            error_observers: Arc::new(Observers::new()),
            monitor: None,
            eos_rx: None,
            resolution: Resolution::new(0, 0),
            fps: 0,
            recording_path: None,
            session: None,
        }
    }

    pub fn options(&self) -> &EmbeddedOptions {
        &self.options
    }

    /// Path of the recording in progress
    pub fn recording_path(&self) -> Option<&Path> {
        if lock(&self.shared).mode == Mode::Recording {
            self.recording_path.as_deref()
        } else {
            None
        }
    }

    /// Launch `description`, start it and attach a monitor
    ///
    /// On failure nothing stays attached.
    fn launch(&mut self, description: &str, mode: Mode) -> BackendResult<()> {
        let pipeline = self.launcher.launch(description)?;
        if let Err(e) = pipeline.play() {
            pipeline.shutdown();
            return Err(e);
        }

        let bus = pipeline.bus();
        let generation = {
            let mut inner = lock(&self.shared);
            inner.generation += 1;
            inner.pipeline = Some(pipeline);
            inner.mode = mode;
            inner.generation
        };

        let Some(bus) = bus else {
            warn!("Pipeline has no bus, errors will go unnoticed");
            return Ok(());
        };

        let (eos_tx, eos_rx) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let error_observers = Arc::clone(&self.error_observers);
        match BusMonitor::spawn(bus, self.options.poll_interval, eos_tx, move |err| {
            handle_fatal(&shared, &error_observers, generation, err);
        }) {
            Ok(monitor) => {
                self.monitor = Some(monitor);
                self.eos_rx = Some(eos_rx);
                Ok(())
            }
            Err(e) => {
                self.teardown();
                Err(e)
            }
        }
    }

    /// Stop the monitor and the pipeline; safe to call in any state
    fn teardown(&mut self) {
        // The monitor may be waiting on the state lock
        if let Some(mut monitor) = self.monitor.take() {
            monitor.stop();
        }
        self.eos_rx = None;

        let pipeline = {
            let mut inner = lock(&self.shared);
            inner.mode = Mode::Idle;
            inner.pipeline.take()
        };
        if let Some(pipeline) = pipeline {
            debug!("Tearing down pipeline");
            pipeline.shutdown();
        }
    }

    fn launch_preview(&mut self) -> BackendResult<()> {
        let description = preview_description(
            &self.options.pipeline,
            &self.options.device,
            self.resolution,
            self.fps,
        );
        self.launch(&description, Mode::PreviewOnly)
    }

    fn mode(&self) -> Mode {
        lock(&self.shared).mode
    }

    /// Report `err` and end the session after the backend fell idle
    fn end_session(&mut self, err: &BackendError) {
        self.error_observers.emit(err);
        let events = lock(&self.shared).events.take();
        if let Some(events) = events {
            events.errors.emit(err);
            events.finished.emit(&());
        }
        self.session = None;
    }
}

/// Fatal bus error: report, then tear the pipeline down
fn handle_fatal(
    shared: &Mutex<Inner>,
    error_observers: &Observers<BackendError>,
    generation: u64,
    err: BackendError,
) {
    let (pipeline, events) = {
        let mut inner = lock(shared);
        if inner.generation != generation {
            debug!("Ignoring error from a replaced pipeline");
            return;
        }
        inner.mode = Mode::Idle;
        (inner.pipeline.take(), inner.events.take())
    };

    error_observers.emit(&err);
    if let Some(events) = &events {
        events.errors.emit(&err);
    }

    if let Some(pipeline) = pipeline {
        pipeline.shutdown();
    }
    if let Some(events) = events {
        events.finished.emit(&());
    }
    error!(error = %err, "Pipeline stopped after fatal error");
}

impl VideoBackend for EmbeddedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Embedded
    }

    fn start_preview(&mut self, resolution: Resolution, fps: u32) -> BackendResult<SessionHandle> {
        self.teardown();
        self.recording_path = None;
        self.resolution = resolution;
        self.fps = if fps == 0 { defaults::FPS } else { fps };

        let events = Arc::new(SessionEvents::default());
        let replaced = lock(&self.shared).events.replace(Arc::clone(&events));
        if let Some(replaced) = replaced {
            replaced.finished.emit(&());
        }

        info!(device = %self.options.device, %resolution, fps = self.fps, "Starting preview pipeline");
        if let Err(e) = self.launch_preview() {
            error!(error = %e, "Failed to start preview pipeline");
            self.error_observers.emit(&e);
            lock(&self.shared).events = None;
            self.session = None;
            return Err(e);
        }

        let handle = SessionHandle::new(events);
        self.session = Some(handle.clone());
        Ok(handle)
    }

    fn start_recording(&mut self, path: &Path) -> BackendResult<()> {
        match self.mode() {
            Mode::Idle => return Err(BackendError::PreviewNotActive),
            Mode::Recording => {
                info!("Already recording");
                return Ok(());
            }
            Mode::PreviewOnly => {}
        }

        let Some(encoder) = self.options.pipeline.record_encoder.clone() else {
            return Err(BackendError::NotImplemented(
                "recording is not enabled for this pipeline".to_string(),
            ));
        };

        let description = record_description(
            &self.options.pipeline,
            &encoder,
            &self.options.device,
            self.resolution,
            self.fps,
            path,
        );

        self.teardown();
        info!(path = %path.display(), encoder = %encoder, "Starting recording pipeline");
        match self.launch(&description, Mode::Recording) {
            Ok(()) => {
                self.recording_path = Some(path.to_path_buf());
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to start recording pipeline, restoring preview");
                if let Err(restore) = self.launch_preview() {
                    error!(error = %restore, "Failed to restore preview pipeline");
                    self.end_session(&restore);
                }
                Err(e)
            }
        }
    }

    fn stop_recording(&mut self) -> BackendResult<()> {
        if self.mode() != Mode::Recording {
            return Ok(());
        }

        if let Some(eos_rx) = &self.eos_rx {
            while eos_rx.try_recv().is_ok() {}
        }

        let sent = lock(&self.shared)
            .pipeline
            .as_ref()
            .map(|p| p.send_eos())
            .unwrap_or(false);

        if sent {
            let timeout = self.options.eos_timeout;
            match self.eos_rx.as_ref().map(|rx| rx.recv_timeout(timeout)) {
                Some(Ok(())) => info!("Recording finalized"),
                _ => warn!(?timeout, "No end-of-stream before timeout, forcing teardown"),
            }
        } else {
            warn!("Failed to send end-of-stream, forcing teardown");
        }

        // A fatal bus error during the wait already ended the session
        let failed = self.mode() == Mode::Idle;
        self.teardown();
        let path = self.recording_path.take();
        if failed {
            warn!(path = ?path, "Pipeline failed while finalizing, staying idle");
            self.session = None;
            return Ok(());
        }
        if let Some(path) = path {
            info!(path = %path.display(), "Recording saved");
        }

        if let Err(e) = self.launch_preview() {
            error!(error = %e, "Failed to restore preview pipeline");
            self.end_session(&e);
            return Err(e);
        }
        Ok(())
    }

    fn stop_all(&mut self) {
        self.teardown();
        self.recording_path = None;
        let events = lock(&self.shared).events.take();
        if let Some(events) = events {
            events.finished.emit(&());
        }
        self.session = None;
        debug!("Embedded backend idle");
    }

    fn on_frame(&self, _callback: FrameCallback) {
        debug!("Embedded backend renders in its own sink; frame callback ignored");
    }

    fn on_error(&self, callback: ErrorCallback) {
        self.error_observers.subscribe(callback);
    }

    fn delivers_frames(&self) -> bool {
        false
    }

    fn state(&self) -> BackendState {
        match self.mode() {
            Mode::Idle => BackendState::Idle,
            Mode::PreviewOnly => BackendState::Previewing,
            Mode::Recording => BackendState::Recording,
        }
    }
}

impl Drop for EmbeddedBackend {
    fn drop(&mut self) {
        self.stop_all();
    }
}
