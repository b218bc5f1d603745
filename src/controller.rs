// SPDX-License-Identifier: GPL-3.0-only

//! Headless recorder controller
//!
//! Drives one video backend the way a UI would: start preview, toggle
//! recording into a timestamped file, stop everything. The outcome of every
//! action is kept as a one-line status text, and frames reaching the
//! controller feed a live FPS readout.

use crate::backends::fps::LiveFpsMeter;
use crate::backends::{BackendSelection, BackendState, Frame, Resolution, select_backend};
use crate::config::Settings;
use crate::errors::{AppError, AppResult, BackendError};
use crate::storage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info};

type BackendFactory = Box<dyn FnMut(&Settings) -> BackendSelection + Send>;

/// Status and FPS shared with backend callbacks
#[derive(Default)]
struct Shared {
    status: Mutex<String>,
    meter: Mutex<LiveFpsMeter>,
    frames: AtomicU64,
}

impl Shared {
    fn set_status(&self, text: impl Into<String>) {
        let text = text.into();
        info!(status = %text, "Status");
        if let Ok(mut status) = self.status.lock() {
            *status = text;
        }
    }
}

pub struct RecorderController {
    settings: Settings,
    factory: BackendFactory,
    selection: Option<BackendSelection>,
    shared: Arc<Shared>,
    recording_path: Option<PathBuf>,
}

impl RecorderController {
    /// Controller selecting its backend from `settings`
    pub fn new(settings: Settings) -> Self {
        Self::with_factory(settings, select_backend)
    }

    /// Controller with a custom backend factory
    pub fn with_factory<F>(settings: Settings, factory: F) -> Self
    where
        F: FnMut(&Settings) -> BackendSelection + Send + 'static,
    {
        let shared = Arc::new(Shared::default());
        shared.set_status("Ready.");
        Self {
            settings,
            factory: Box::new(factory),
            selection: None,
            shared,
            recording_path: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Create the backend on first use and attach the controller's callbacks
    fn backend(&mut self) -> &mut BackendSelection {
        let settings = &self.settings;
        let factory = &mut self.factory;
        let shared = &self.shared;
        self.selection.get_or_insert_with(|| {
            let selection = factory(settings);
            info!(backend = %selection.label, "Backend selected");
            attach_callbacks(&selection, shared);
            selection
        })
    }

    pub fn start_preview(&mut self) -> AppResult<()> {
        if self.is_previewing() {
            self.shared.set_status("Preview already running.");
            return Ok(());
        }

        let (width, height) = self.settings.width_height();
        let fps = self.settings.fps;

        let selection = self.backend();
        let result = selection
            .backend
            .start_preview(Resolution::new(width, height), fps);
        let label = selection.label.clone();
        let delivers_frames = selection.backend.delivers_frames();

        if let Err(e) = result {
            self.shared
                .set_status(format!("Failed to start preview: {}", e));
            return Err(e.into());
        }

        if let Ok(mut meter) = self.shared.meter.lock() {
            meter.reset();
        }

        let mut status = format!("Preview {}x{}@{} started ({}).", width, height, fps, label);
        if !delivers_frames {
            status.push_str(" A display window should be visible.");
        }
        self.shared.set_status(status);
        Ok(())
    }

    /// Start recording when previewing, stop it when recording
    pub fn toggle_recording(&mut self) -> AppResult<()> {
        if !self.is_previewing() {
            self.shared.set_status("Start Preview first.");
            return Ok(());
        }

        if self.is_recording() {
            let result = self.backend().backend.stop_recording();
            return match result {
                Ok(()) => {
                    self.recording_path = None;
                    self.shared.set_status("Recording stopped.");
                    Ok(())
                }
                Err(e) => {
                    self.shared
                        .set_status(format!("Failed to stop recording: {}", e));
                    Err(e.into())
                }
            };
        }

        let path = storage::next_recording_path(&self.settings.output_dir).map_err(|e| {
            self.shared
                .set_status(format!("Failed to start recording: {}", e));
            AppError::Storage(e.to_string())
        })?;

        match self.backend().backend.start_recording(&path) {
            Ok(()) => {
                self.shared
                    .set_status(format!("Recording → {}", path.display()));
                self.recording_path = Some(path);
                Ok(())
            }
            Err(BackendError::NotImplemented(reason)) => {
                info!(reason = %reason, "Recording not available on this backend");
                self.shared
                    .set_status("Recording is not enabled on this backend.");
                Ok(())
            }
            Err(e) => {
                self.shared
                    .set_status(format!("Failed to start recording: {}", e));
                Err(e.into())
            }
        }
    }

    pub fn stop_all(&mut self) {
        let had_anything = self.is_previewing();
        if let Some(selection) = self.selection.as_mut() {
            selection.backend.stop_all();
        }
        self.recording_path = None;
        if let Ok(mut meter) = self.shared.meter.lock() {
            meter.reset();
        }
        self.shared.set_status(if had_anything {
            "Stopped."
        } else {
            "Nothing to stop."
        });
    }

    /// Change where the next recording is written
    pub fn set_output_dir(&mut self, dir: impl AsRef<Path>) {
        self.settings.output_dir = dir.as_ref().to_path_buf();
        self.shared.set_status("Output folder set.");
    }

    pub fn status_text(&self) -> String {
        self.shared
            .status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Live frame rate, `None` when frames do not reach the controller
    pub fn live_fps(&self) -> Option<f64> {
        let selection = self.selection.as_ref()?;
        if !selection.backend.delivers_frames() || !selection.backend.state().is_active() {
            return None;
        }
        self.shared.meter.lock().ok()?.fps()
    }

    /// Frames received since the controller was created
    pub fn frames_seen(&self) -> u64 {
        self.shared.frames.load(Ordering::Relaxed)
    }

    pub fn backend_state(&self) -> BackendState {
        self.selection
            .as_ref()
            .map(|s| s.backend.state())
            .unwrap_or_default()
    }

    pub fn backend_label(&self) -> Option<&str> {
        self.selection.as_ref().map(|s| s.label.as_str())
    }

    pub fn is_previewing(&self) -> bool {
        self.backend_state().is_active()
    }

    pub fn is_recording(&self) -> bool {
        self.backend_state().is_recording()
    }

    /// File of the recording in progress
    pub fn recording_path(&self) -> Option<&Path> {
        if self.is_recording() {
            self.recording_path.as_deref()
        } else {
            None
        }
    }
}

fn attach_callbacks(selection: &BackendSelection, shared: &Arc<Shared>) {
    let errors = Arc::clone(shared);
    selection.backend.on_error(Arc::new(move |err: &BackendError| {
        error!(error = %err, "Backend error");
        errors.set_status(err.to_string());
    }));

    if selection.backend.delivers_frames() {
        let frames = Arc::clone(shared);
        selection.backend.on_frame(Arc::new(move |_frame: &Frame| {
            frames.frames.fetch_add(1, Ordering::Relaxed);
            if let Ok(mut meter) = frames.meter.lock() {
                meter.record(Instant::now());
            }
        }));
    }
}

impl Drop for RecorderController {
    fn drop(&mut self) {
        if let Some(selection) = self.selection.as_mut() {
            selection.backend.stop_all();
        }
    }
}
