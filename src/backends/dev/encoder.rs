// SPDX-License-Identifier: GPL-3.0-only

//! Frame-fed video encoders for the dev backend
//!
//! The output container is chosen from the file extension and each container
//! has an ordered list of codec candidates. Candidates are named by their
//! four-character codes; each maps onto an `appsrc` pipeline ending in a muxer
//! and a `filesink`.

use crate::backends::types::Frame;
use crate::constants::timing;
use crate::errors::{BackendError, BackendResult};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::AppSrc;
use gstreamer_video::{VideoFormat, VideoInfo};
use std::path::Path;
use tracing::{debug, info, warn};

/// One codec to try for a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderCandidate {
    /// Four-character code
    pub name: &'static str,
    /// Encoder, parser and muxer chain placed after `videoconvert`
    pub chain: &'static str,
}

const MP4_CANDIDATES: [EncoderCandidate; 2] = [
    EncoderCandidate {
        name: "mp4v",
        chain: "avenc_mpeg4 ! mpeg4videoparse ! mp4mux",
    },
    EncoderCandidate {
        name: "avc1",
        chain: "x264enc tune=zerolatency ! h264parse ! mp4mux",
    },
];

const AVI_CANDIDATES: [EncoderCandidate; 2] = [
    EncoderCandidate {
        name: "XVID",
        chain: "avenc_mpeg4 ! avimux",
    },
    EncoderCandidate {
        name: "MJPG",
        chain: "jpegenc ! avimux",
    },
];

/// Candidates for `path`, in the order they are tried
///
/// `.mp4` (any case) gets MPEG-4 Part 2 then H.264; anything else gets
/// Xvid then Motion JPEG.
pub fn encoder_candidates(path: &Path) -> &'static [EncoderCandidate] {
    let is_mp4 = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp4"));
    if is_mp4 {
        &MP4_CANDIDATES
    } else {
        &AVI_CANDIDATES
    }
}

/// Opens encoders for a recording
pub trait EncoderFactory: Send + Sync {
    fn open(
        &self,
        candidate: &EncoderCandidate,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> BackendResult<Box<dyn FrameWriter>>;
}

/// An open encoder accepting BGR frames
pub trait FrameWriter: Send {
    fn write(&mut self, frame: &Frame) -> BackendResult<()>;

    /// Flush and finalize the file
    fn close(self: Box<Self>) -> BackendResult<()>;
}

/// Encoders built from GStreamer `appsrc` pipelines
#[derive(Debug, Default, Clone, Copy)]
pub struct GstEncoderFactory;

impl EncoderFactory for GstEncoderFactory {
    fn open(
        &self,
        candidate: &EncoderCandidate,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> BackendResult<Box<dyn FrameWriter>> {
        Ok(Box::new(GstFrameWriter::open(
            candidate, path, width, height, fps,
        )?))
    }
}

/// Launch line for a candidate's encoding pipeline
pub(crate) fn encoder_description(candidate: &EncoderCandidate) -> String {
    format!(
        "appsrc name=src is-live=true format=time ! videoconvert ! {} ! filesink name=sink",
        candidate.chain
    )
}

/// Presentation timestamp of frame `index` at a constant `fps`
pub(crate) fn frame_pts(index: u64, fps: u32) -> gst::ClockTime {
    let fps = fps.max(1) as u64;
    gst::ClockTime::from_nseconds(index * 1_000_000_000 / fps)
}

/// A running `appsrc → encoder → muxer → filesink` pipeline
pub struct GstFrameWriter {
    pipeline: gst::Pipeline,
    appsrc: AppSrc,
    width: u32,
    height: u32,
    fps: u32,
    /// Row stride the caps promise downstream
    stride: usize,
    /// Buffer size the caps promise downstream
    size: usize,
    frame_index: u64,
}

impl GstFrameWriter {
    pub fn open(
        candidate: &EncoderCandidate,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> BackendResult<Self> {
        gst::init().map_err(|e| BackendError::NotAvailable(e.to_string()))?;

        let description = encoder_description(candidate);
        debug!(candidate = candidate.name, description = %description, "Creating encoder pipeline");

        let pipeline = gst::parse::launch(&description)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| BackendError::PipelineParse("Not a pipeline".to_string()))?;

        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| BackendError::PipelineParse("Failed to get appsrc".to_string()))?
            .dynamic_cast::<AppSrc>()
            .map_err(|_| BackendError::PipelineParse("Failed to cast appsrc".to_string()))?;

        let info = VideoInfo::builder(VideoFormat::Bgr, width, height)
            .fps(gst::Fraction::new(fps.max(1) as i32, 1))
            .build()
            .map_err(|e| BackendError::Other(format!("Invalid video info: {}", e)))?;
        let caps = info
            .to_caps()
            .map_err(|e| BackendError::Other(format!("Invalid caps: {}", e)))?;
        appsrc.set_caps(Some(&caps));
        // BGR rows are padded to 4 bytes in GStreamer's default layout
        let stride = info.stride()[0] as usize;
        let size = info.size();

        let filesink = pipeline
            .by_name("sink")
            .ok_or_else(|| BackendError::PipelineParse("Failed to get filesink".to_string()))?;
        filesink.set_property("location", path.to_string_lossy().to_string());

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(e.into());
        }

        info!(
            candidate = candidate.name,
            path = %path.display(),
            width,
            height,
            fps,
            "Encoder opened"
        );

        Ok(Self {
            pipeline,
            appsrc,
            width,
            height,
            fps,
            stride,
            size,
            frame_index: 0,
        })
    }
}

impl FrameWriter for GstFrameWriter {
    fn write(&mut self, frame: &Frame) -> BackendResult<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(BackendError::Other(format!(
                "Frame size {}x{} does not match encoder {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let row_bytes = self.width as usize * 3;
        let mut buffer = if self.stride == row_bytes {
            gst::Buffer::from_slice(frame.shared_data())
        } else {
            gst::Buffer::from_mut_slice(pad_rows(
                frame.data(),
                row_bytes,
                self.height as usize,
                self.stride,
                self.size,
            ))
        };
        if let Some(buffer) = buffer.get_mut() {
            buffer.set_pts(frame_pts(self.frame_index, self.fps));
            buffer.set_duration(frame_pts(1, self.fps));
        }
        self.frame_index += 1;

        self.appsrc
            .push_buffer(buffer)
            .map(|_| ())
            .map_err(|e| BackendError::Other(format!("Failed to push frame: {:?}", e)))
    }

    fn close(self: Box<Self>) -> BackendResult<()> {
        info!(frames = self.frame_index, "Closing encoder");
        if let Err(e) = self.appsrc.end_of_stream() {
            warn!(error = ?e, "Failed to signal end of stream to encoder");
        }

        let mut result = Ok(());
        if let Some(bus) = self.pipeline.bus() {
            let timeout = gst::ClockTime::from_mseconds(timing::EOS_TIMEOUT.as_millis() as u64);
            match bus.timed_pop_filtered(
                timeout,
                &[gst::MessageType::Eos, gst::MessageType::Error],
            ) {
                Some(msg) => {
                    if let gst::MessageView::Error(err) = msg.view() {
                        result = Err(BackendError::Other(format!(
                            "Encoder error on close: {}",
                            err.error()
                        )));
                    }
                }
                None => warn!("Encoder did not reach end of stream in time"),
            }
        }

        self.pipeline.set_state(gst::State::Null)?;
        result
    }
}

impl Drop for GstFrameWriter {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Lay tightly packed rows out at `stride`, in a buffer of `size` bytes
pub(crate) fn pad_rows(
    data: &[u8],
    row_bytes: usize,
    height: usize,
    stride: usize,
    size: usize,
) -> Vec<u8> {
    let mut padded = vec![0u8; size.max(stride * height)];
    for (row, src) in data.chunks_exact(row_bytes).take(height).enumerate() {
        let start = row * stride;
        padded[start..start + row_bytes].copy_from_slice(src);
    }
    padded
}
