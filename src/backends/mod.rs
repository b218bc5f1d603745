// SPDX-License-Identifier: GPL-3.0-only

//! Video backend abstraction
//!
//! Two interchangeable backends sit behind [`VideoBackend`]:
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │            RecorderController                │
//! └────────────────────┬────────────────────────┘
//!                      │ dyn VideoBackend
//! ┌────────────────────┴────────────────────────┐
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │       Dev        │  │    Embedded     │  │
//! │  │ capture thread + │  │   GStreamer     │  │
//! │  │ frame encoder    │  │   pipelines     │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! One backend is selected per run by [`select_backend`] and never swapped
//! while a session is active.
//!
//! # Modules
//!
//! - [`dev`]: device capture on a worker thread with an in-process encoder
//! - [`embedded`]: declarative pipelines rendering into a native sink
//! - [`fps`]: frame-rate estimation for encoder headers and live display
//! - [`events`]: session handles and observer lists

pub mod dev;
pub mod embedded;
pub mod events;
pub mod fps;
pub mod types;

pub use events::SessionHandle;
pub use types::{
    BackendKind, BackendState, ErrorCallback, Frame, FrameCallback, RecordingOutput, Resolution,
};

use crate::config::{BackendChoice, Settings};
use crate::errors::BackendResult;
use dev::DevBackend;
use embedded::{EmbeddedBackend, EmbeddedOptions};
use std::path::Path;
use tracing::{info, warn};

/// Preview and recording contract shared by both backends
///
/// All operations are safe to call in any state: calls that make no sense in
/// the current state are no-ops or return an error, never panic.
pub trait VideoBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Start previewing, returning the session's event handle
    fn start_preview(&mut self, resolution: Resolution, fps: u32) -> BackendResult<SessionHandle>;

    /// Start recording to `path`; requires an active preview
    fn start_recording(&mut self, path: &Path) -> BackendResult<()>;

    /// Finalize the current recording; a no-op when not recording
    fn stop_recording(&mut self) -> BackendResult<()>;

    /// Stop everything and return to idle
    fn stop_all(&mut self);

    /// Register a frame callback that outlives individual sessions
    fn on_frame(&self, callback: FrameCallback);

    /// Register an error callback that outlives individual sessions
    fn on_error(&self, callback: ErrorCallback);

    /// Whether frames reach `on_frame` callbacks at all
    fn delivers_frames(&self) -> bool;

    fn state(&self) -> BackendState;
}

/// Chosen backend and a label for status display
pub struct BackendSelection {
    pub backend: Box<dyn VideoBackend>,
    pub label: String,
}

/// Pick the backend for `settings`
///
/// The embedded backend falls back to the dev backend when GStreamer or one
/// of its elements is unavailable.
pub fn select_backend(settings: &Settings) -> BackendSelection {
    select_backend_with(settings, |options| {
        EmbeddedBackend::new(options).map(|b| Box::new(b) as Box<dyn VideoBackend>)
    })
}

/// Backend selection with a custom embedded constructor
pub fn select_backend_with<F>(settings: &Settings, make_embedded: F) -> BackendSelection
where
    F: FnOnce(EmbeddedOptions) -> BackendResult<Box<dyn VideoBackend>>,
{
    if settings.video_backend == BackendChoice::Embedded {
        match make_embedded(EmbeddedOptions::from_settings(settings)) {
            Ok(backend) => {
                info!(device = %settings.device_path(), "Using embedded backend");
                return BackendSelection {
                    backend,
                    label: "Embedded (GStreamer)".to_string(),
                };
            }
            Err(e) => {
                warn!(error = %e, "Embedded backend unavailable, falling back to dev backend");
            }
        }
    }

    info!(camera = settings.camera_index, "Using dev backend");
    BackendSelection {
        backend: Box::new(DevBackend::new(settings.camera_index)),
        label: "Dev (V4L2)".to_string(),
    }
}
