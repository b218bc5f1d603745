// SPDX-License-Identifier: GPL-3.0-only

//! Capture device access for the dev backend
//!
//! A device is opened by numeric index through one of two capture APIs. Direct
//! V4L2 is preferred; the GStreamer `v4l2src ! appsink` path is the fallback for
//! devices or drivers the direct path cannot negotiate with.

use super::gst_source::AppSinkSource;
use super::v4l2::V4l2Source;
use crate::backends::types::{Frame, Resolution};
use crate::errors::{BackendError, BackendResult};
use tracing::{debug, info, warn};

/// Capture API used to open a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureApi {
    /// Direct V4L2 memory-mapped streaming
    V4l2,
    /// GStreamer `v4l2src` into an `appsink`
    GStreamer,
}

impl CaptureApi {
    /// Open order: primary first
    pub const PREFERENCE: [CaptureApi; 2] = [CaptureApi::V4l2, CaptureApi::GStreamer];
}

impl std::fmt::Display for CaptureApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureApi::V4l2 => write!(f, "V4L2"),
            CaptureApi::GStreamer => write!(f, "GStreamer"),
        }
    }
}

/// Best-effort device property hints
///
/// Devices may ignore any of these; zero means "no preference".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureHints {
    pub resolution: Resolution,
    pub fps: u32,
}

/// An open capture device producing frames with blocking reads
pub trait FrameSource {
    /// Read the next frame, blocking until one is available
    fn read_frame(&mut self) -> BackendResult<Frame>;

    /// Name of the API the device was opened with
    fn api(&self) -> CaptureApi;
}

/// Opens capture devices
///
/// Implementations are shared with the capture thread, which performs the
/// actual open so the device handle never leaves that thread.
pub trait DeviceOpener: Send + Sync {
    fn open(
        &self,
        api: CaptureApi,
        index: u32,
        hints: &CaptureHints,
    ) -> BackendResult<Box<dyn FrameSource>>;
}

/// Opener for real hardware
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDeviceOpener;

impl DeviceOpener for SystemDeviceOpener {
    fn open(
        &self,
        api: CaptureApi,
        index: u32,
        hints: &CaptureHints,
    ) -> BackendResult<Box<dyn FrameSource>> {
        match api {
            CaptureApi::V4l2 => Ok(Box::new(V4l2Source::open(index, hints)?)),
            CaptureApi::GStreamer => Ok(Box::new(AppSinkSource::open(index, hints)?)),
        }
    }
}

/// Open `index` trying every API in preference order
pub fn open_with_fallback(
    opener: &dyn DeviceOpener,
    index: u32,
    hints: &CaptureHints,
) -> BackendResult<Box<dyn FrameSource>> {
    let mut failures = Vec::new();

    for api in CaptureApi::PREFERENCE {
        debug!(index, %api, "Opening capture device");
        match opener.open(api, index, hints) {
            Ok(source) => {
                info!(index, %api, "Capture device opened");
                return Ok(source);
            }
            Err(e) => {
                warn!(index, %api, error = %e, "Capture API failed to open device");
                failures.push(format!("{}: {}", api, e));
            }
        }
    }

    Err(BackendError::DeviceOpen(format!(
        "camera {} ({})",
        index,
        failures.join("; ")
    )))
}
