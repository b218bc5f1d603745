// SPDX-License-Identifier: GPL-3.0-only

//! camrec - camera preview and recording with interchangeable video backends
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: the [`VideoBackend`] contract and its dev and embedded implementations
//! - [`controller`]: headless controller driving a backend
//! - [`config`]: settings resolved from the environment
//! - [`storage`]: output directory and recording file naming
//! - [`errors`]: error types crossing the backend and application boundaries
//!
//! # Example
//!
//! ```ignore
//! let mut controller = RecorderController::new(Settings::from_env());
//! controller.start_preview()?;
//! controller.toggle_recording()?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod controller;
pub mod errors;
pub mod storage;

// Re-export commonly used types
pub use backends::{BackendState, Frame, Resolution, SessionHandle, VideoBackend, select_backend};
pub use config::Settings;
pub use controller::RecorderController;
pub use errors::{AppError, AppResult, BackendError, BackendResult};
