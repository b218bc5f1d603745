// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer appsink capture (fallback capture API)
//!
//! Runs `v4l2src ! videoconvert ! video/x-raw,format=BGR ! appsink` and pulls
//! samples synchronously so the capture worker keeps its blocking-read loop.

use super::capture::{CaptureApi, CaptureHints, FrameSource};
use crate::backends::types::Frame;
use crate::constants::{pipeline, timing};
use crate::errors::{BackendError, BackendResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use tracing::{debug, info};

/// A running capture pipeline ending in an appsink
pub struct AppSinkSource {
    pipeline: gst::Pipeline,
    appsink: AppSink,
}

impl AppSinkSource {
    /// Open `/dev/video{index}` through `v4l2src`
    ///
    /// The hinted caps are tried first; a device that cannot negotiate them is
    /// retried with whatever it offers.
    pub fn open(index: u32, hints: &CaptureHints) -> BackendResult<Self> {
        gst::init().map_err(|e| BackendError::NotAvailable(e.to_string()))?;

        let device = format!("{}{}", pipeline::DEVICE_PATH_PREFIX, index);
        let mut last_error = None;

        for with_hints in [true, false] {
            let description = capture_description(&device, hints, with_hints);
            debug!(description = %description, "Trying appsink capture pipeline");
            match Self::start(&description) {
                Ok(source) => {
                    info!(device = %device, with_hints, "GStreamer capture started");
                    return Ok(source);
                }
                Err(e) => {
                    debug!(error = %e, with_hints, "Appsink capture pipeline failed");
                    last_error = Some(e);
                }
            }
        }

        Err(BackendError::DeviceOpen(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| device.clone()),
        ))
    }

    fn start(description: &str) -> BackendResult<Self> {
        let pipeline = gst::parse::launch(description)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| BackendError::PipelineParse("Not a pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| BackendError::PipelineParse("Failed to get appsink".to_string()))?
            .dynamic_cast::<AppSink>()
            .map_err(|_| BackendError::PipelineParse("Failed to cast appsink".to_string()))?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(e.into());
        }

        // Device open and caps negotiation happen during the state change
        let (result, _, _) =
            pipeline.state(gst::ClockTime::from_seconds(timing::START_TIMEOUT_SECS));
        if let Err(e) = result {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(e.into());
        }

        Ok(Self { pipeline, appsink })
    }
}

/// Launch line for the appsink capture pipeline
pub(crate) fn capture_description(device: &str, hints: &CaptureHints, with_hints: bool) -> String {
    let mut caps = Vec::new();
    if with_hints {
        if hints.resolution.width > 0 && hints.resolution.height > 0 {
            caps.push(format!("width={}", hints.resolution.width));
            caps.push(format!("height={}", hints.resolution.height));
        }
        if hints.fps > 0 {
            caps.push(format!("framerate={}/1", hints.fps));
        }
    }

    let hint_caps = if caps.is_empty() {
        String::new()
    } else {
        format!("video/x-raw,{} ! ", caps.join(","))
    };

    format!(
        "v4l2src device={} ! {}videoconvert ! video/x-raw,format=BGR ! \
         appsink name=sink max-buffers={} drop=true sync=false",
        device,
        hint_caps,
        pipeline::APPSINK_MAX_BUFFERS
    )
}

impl FrameSource for AppSinkSource {
    fn read_frame(&mut self) -> BackendResult<Frame> {
        let sample = self
            .appsink
            .try_pull_sample(gst::ClockTime::from_seconds(timing::READ_TIMEOUT_SECS))
            .ok_or_else(|| BackendError::FrameRead("No sample from appsink".to_string()))?;

        let buffer = sample
            .buffer()
            .ok_or_else(|| BackendError::FrameRead("No buffer in sample".to_string()))?;
        let caps = sample
            .caps()
            .ok_or_else(|| BackendError::FrameRead("No caps in sample".to_string()))?;
        let info = VideoInfo::from_caps(caps)
            .map_err(|e| BackendError::FrameRead(format!("Bad caps: {}", e)))?;
        let map = buffer
            .map_readable()
            .map_err(|e| BackendError::FrameRead(format!("Failed to map buffer: {}", e)))?;

        let width = info.width();
        let height = info.height();
        let row_bytes = width as usize * Frame::CHANNELS;
        let stride = info.stride()[0] as usize;
        let offset = info.offset()[0];
        let data = map.as_slice();

        // Strip row padding so the frame is tightly packed
        let mut packed = Vec::with_capacity(Frame::expected_len(width, height));
        for row in 0..height as usize {
            let start = offset + row * stride;
            let line = data
                .get(start..start + row_bytes)
                .ok_or_else(|| BackendError::FrameRead("Short buffer".to_string()))?;
            packed.extend_from_slice(line);
        }

        Frame::from_bgr(width, height, packed)
            .ok_or_else(|| BackendError::FrameRead("Unexpected frame size".to_string()))
    }

    fn api(&self) -> CaptureApi {
        CaptureApi::GStreamer
    }
}

impl Drop for AppSinkSource {
    fn drop(&mut self) {
        // Release the device immediately
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::types::Resolution;

    #[test]
    fn test_capture_description_with_hints() {
        let hints = CaptureHints {
            resolution: Resolution::new(1280, 720),
            fps: 30,
        };
        let desc = capture_description("/dev/video2", &hints, true);
        assert!(desc.starts_with("v4l2src device=/dev/video2 ! video/x-raw,width=1280,height=720,framerate=30/1 ! videoconvert"));
        assert!(desc.contains("appsink name=sink"));
    }

    #[test]
    fn test_capture_description_without_hints() {
        let hints = CaptureHints {
            resolution: Resolution::new(1280, 720),
            fps: 30,
        };
        let desc = capture_description("/dev/video0", &hints, false);
        assert!(desc.starts_with("v4l2src device=/dev/video0 ! videoconvert"));
    }
}
