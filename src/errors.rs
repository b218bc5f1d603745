// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the camera recorder

use std::fmt;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Errors crossing the video backend boundary
///
/// Every backend failure is reported as one of these variants, either as the
/// return value of a backend call or through the registered error callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The capture device could not be opened with any capture API
    DeviceOpen(String),
    /// A frame read failed mid-session; the session has ended
    FrameRead(String),
    /// Recording was requested without an active preview
    PreviewNotActive,
    /// A pipeline description could not be parsed or linked
    PipelineParse(String),
    /// A pipeline refused to change state
    PipelineState(String),
    /// The running pipeline reported a fatal error; it has been torn down
    PipelineFatal(String),
    /// Every encoder candidate failed; recording continues without output
    EncoderUnavailable(String),
    /// The operation is not supported by this backend configuration
    NotImplemented(String),
    /// The backend cannot run on this system
    NotAvailable(String),
    /// General I/O error
    Io(String),
    /// Other errors
    Other(String),
}

impl BackendError {
    /// Whether the error ended the session it was raised in
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BackendError::DeviceOpen(_)
                | BackendError::FrameRead(_)
                | BackendError::PipelineParse(_)
                | BackendError::PipelineState(_)
                | BackendError::PipelineFatal(_)
        )
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::DeviceOpen(msg) => write!(f, "Could not open camera device: {}", msg),
            BackendError::FrameRead(msg) => write!(f, "Failed to read frame from camera: {}", msg),
            BackendError::PreviewNotActive => write!(f, "Preview not active"),
            BackendError::PipelineParse(msg) => write!(f, "Failed to parse pipeline: {}", msg),
            BackendError::PipelineState(msg) => write!(f, "Failed to set pipeline state: {}", msg),
            BackendError::PipelineFatal(msg) => write!(f, "Pipeline error: {}", msg),
            BackendError::EncoderUnavailable(msg) => {
                write!(f, "No encoder could be opened, nothing is being recorded: {}", msg)
            }
            BackendError::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::Io(msg) => write!(f, "I/O error: {}", msg),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

impl From<gstreamer::glib::Error> for BackendError {
    fn from(err: gstreamer::glib::Error) -> Self {
        BackendError::PipelineParse(err.to_string())
    }
}

impl From<gstreamer::StateChangeError> for BackendError {
    fn from(err: gstreamer::StateChangeError) -> Self {
        BackendError::PipelineState(err.to_string())
    }
}

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Backend errors
    Backend(BackendError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Backend(e) => write!(f, "{}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Backend(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}
