// SPDX-License-Identifier: GPL-3.0-only

//! Direct V4L2 capture
//!
//! Requests YUYV at the hinted size; drivers that only stream MJPEG are decoded
//! with the `image` crate. Every frame is converted to packed BGR.

use super::capture::{CaptureApi, CaptureHints, FrameSource};
use crate::backends::types::Frame;
use crate::constants::pipeline;
use crate::errors::{BackendError, BackendResult};
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Format, FourCC};

/// Pixel layouts this source can convert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamFormat {
    Yuyv,
    Mjpeg,
}

/// A V4L2 device streaming through mmap buffers
pub struct V4l2Source {
    // Declared before the device so buffers are unmapped first
    stream: Stream<'static>,
    _device: Device,
    width: u32,
    height: u32,
    stride: u32,
    format: StreamFormat,
}

impl V4l2Source {
    /// Open `/dev/video{index}` and start streaming
    pub fn open(index: u32, hints: &CaptureHints) -> BackendResult<Self> {
        let device = Device::new(index as usize)
            .map_err(|e| BackendError::DeviceOpen(format!("/dev/video{}: {}", index, e)))?;

        let current = device
            .format()
            .map_err(|e| BackendError::DeviceOpen(format!("Failed to query format: {}", e)))?;

        let format = negotiate_format(&device, &current, hints)?;
        let stream_format = if format.fourcc == FourCC::new(b"YUYV") {
            StreamFormat::Yuyv
        } else if format.fourcc == FourCC::new(b"MJPG") {
            StreamFormat::Mjpeg
        } else {
            return Err(BackendError::DeviceOpen(format!(
                "Unsupported pixel format {}",
                format.fourcc
            )));
        };

        if hints.fps > 0 {
            // Frame interval is only a hint
            if let Err(e) = device.set_params(&Parameters::with_fps(hints.fps)) {
                debug!(error = %e, fps = hints.fps, "Device ignored frame rate hint");
            }
        }

        let stream = Stream::with_buffers(&device, Type::VideoCapture, pipeline::V4L2_BUFFER_COUNT)
            .map_err(|e| BackendError::DeviceOpen(format!("Failed to create stream: {}", e)))?;

        info!(
            index,
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "V4L2 capture started"
        );

        Ok(Self {
            stream,
            _device: device,
            width: format.width,
            height: format.height,
            stride: format.stride,
            format: stream_format,
        })
    }
}

/// Ask for YUYV, then MJPEG, at the hinted size; keep whatever the driver accepts
fn negotiate_format(
    device: &Device,
    current: &Format,
    hints: &CaptureHints,
) -> BackendResult<Format> {
    let width = if hints.resolution.width > 0 {
        hints.resolution.width
    } else {
        current.width
    };
    let height = if hints.resolution.height > 0 {
        hints.resolution.height
    } else {
        current.height
    };

    for fourcc in [FourCC::new(b"YUYV"), FourCC::new(b"MJPG")] {
        let requested = Format::new(width, height, fourcc);
        match device.set_format(&requested) {
            Ok(actual) if actual.fourcc == fourcc => return Ok(actual),
            Ok(actual) => {
                debug!(requested = %fourcc, got = %actual.fourcc, "Driver substituted format");
            }
            Err(e) => debug!(fourcc = %fourcc, error = %e, "Format rejected"),
        }
    }

    warn!(fourcc = %current.fourcc, "Falling back to current device format");
    Ok(current.clone())
}

impl FrameSource for V4l2Source {
    fn read_frame(&mut self) -> BackendResult<Frame> {
        let (buf, meta) = self
            .stream
            .next()
            .map_err(|e| BackendError::FrameRead(e.to_string()))?;

        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        let data = &buf[..used];

        match self.format {
            StreamFormat::Yuyv => yuyv_to_bgr(data, self.width, self.height, self.stride)
                .ok_or_else(|| BackendError::FrameRead("Short YUYV buffer".to_string())),
            StreamFormat::Mjpeg => mjpeg_to_bgr(data),
        }
    }

    fn api(&self) -> CaptureApi {
        CaptureApi::V4l2
    }
}

/// BT.601 limited-range YUV to one BGR pixel
fn yuv_to_bgr(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    [
        b.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        r.clamp(0, 255) as u8,
    ]
}

/// Convert packed YUYV (4:2:2) rows to a BGR frame
fn yuyv_to_bgr(data: &[u8], width: u32, height: u32, stride: u32) -> Option<Frame> {
    if height == 0 || width % 2 != 0 {
        return None;
    }
    let row_bytes = width as usize * 2;
    let stride = (stride as usize).max(row_bytes);
    if data.len() < stride * (height as usize - 1) + row_bytes {
        return None;
    }

    let mut out = Vec::with_capacity(Frame::expected_len(width, height));
    for row in 0..height as usize {
        let line = &data[row * stride..row * stride + row_bytes];
        for quad in line.chunks_exact(4) {
            let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
            out.extend_from_slice(&yuv_to_bgr(y0, u, v));
            out.extend_from_slice(&yuv_to_bgr(y1, u, v));
        }
    }

    Frame::from_bgr(width, height, out)
}

/// Decode one MJPEG frame to BGR
fn mjpeg_to_bgr(data: &[u8]) -> BackendResult<Frame> {
    let image = image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| BackendError::FrameRead(format!("MJPEG decode failed: {}", e)))?
        .to_rgb8();
    let (width, height) = image.dimensions();

    let mut bgr = image.into_raw();
    for px in bgr.chunks_exact_mut(3) {
        px.swap(0, 2);
    }

    Frame::from_bgr(width, height, bgr)
        .ok_or_else(|| BackendError::FrameRead("Decoded frame has unexpected size".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_black_and_white() {
        // Two pixels per quad: black (Y=16) then white (Y=235), neutral chroma
        let data = [16u8, 128, 235, 128];
        let frame = yuyv_to_bgr(&data, 2, 1, 4).unwrap();
        assert_eq!(frame.pixel(0, 0), Some([0, 0, 0]));
        assert_eq!(frame.pixel(1, 0), Some([255, 255, 255]));
    }

    #[test]
    fn test_yuyv_respects_stride() {
        // 2x2 image with 8 bytes per line (4 padding bytes)
        let data = [
            235u8, 128, 235, 128, 0, 0, 0, 0, //
            16, 128, 16, 128, 0, 0, 0, 0,
        ];
        let frame = yuyv_to_bgr(&data, 2, 2, 8).unwrap();
        assert_eq!(frame.pixel(1, 0), Some([255, 255, 255]));
        assert_eq!(frame.pixel(0, 1), Some([0, 0, 0]));
    }

    #[test]
    fn test_yuyv_short_buffer() {
        assert!(yuyv_to_bgr(&[0u8; 6], 2, 2, 4).is_none());
    }

    #[test]
    fn test_mjpeg_channel_order() {
        let mut rgb = image::RgbImage::new(4, 4);
        for px in rgb.pixels_mut() {
            *px = image::Rgb([250, 0, 0]);
        }
        let mut jpeg = Vec::new();
        image::DynamicImage::ImageRgb8(rgb)
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let frame = mjpeg_to_bgr(&jpeg).unwrap();
        let [b, _, r] = frame.pixel(0, 0).unwrap();
        assert!(r > 200 && b < 50, "expected red in the last channel, got r={r} b={b}");
    }
}
