// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for video backends

use crate::errors::BackendError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Requested capture resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for Resolution {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A single captured frame
///
/// Packed 8-bit BGR, `height` rows of `width * 3` bytes with no padding.
/// The pixel storage is never written after the frame is built, so clones
/// handed to different consumers cannot observe each other.
#[derive(Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Arc<[u8]>,
}

impl Frame {
    /// Bytes per pixel (B, G, R)
    pub const CHANNELS: usize = 3;

    /// Build a frame from packed BGR bytes
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn from_bgr(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Option<Self> {
        let data = data.into();
        if data.len() != Self::expected_len(width, height) {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Build a frame filled with one BGR colour
    pub fn solid(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * Self::CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&bgr);
        }
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * Self::CHANNELS
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw BGR bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the pixel storage (no copy)
    pub fn shared_data(&self) -> Arc<[u8]> {
        Arc::clone(&self.data)
    }

    /// BGR value at `(x, y)`
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Which implementation is behind a `VideoBackend`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Direct device capture with an in-process encoder
    Dev,
    /// Declarative GStreamer pipelines with a native display sink
    Embedded,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Dev => write!(f, "dev"),
            BackendKind::Embedded => write!(f, "embedded"),
        }
    }
}

/// Observable backend state
///
/// `Recording` always implies an active preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendState {
    #[default]
    Idle,
    Previewing,
    Recording,
}

impl BackendState {
    pub fn is_active(&self) -> bool {
        !matches!(self, BackendState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, BackendState::Recording)
    }
}

/// Whether an acknowledged recording is actually producing output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingOutput {
    /// Waiting for the first frame to size the encoder
    Pending,
    /// Frames are being written with the named candidate
    Writing { candidate: String },
    /// Every encoder candidate failed; frames are dropped until recording stops
    Unavailable,
}

/// Callback receiving preview frames
pub type FrameCallback = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Callback receiving backend errors
pub type ErrorCallback = Arc<dyn Fn(&BackendError) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_wrong_length() {
        assert!(Frame::from_bgr(2, 2, vec![0u8; 11]).is_none());
        assert!(Frame::from_bgr(2, 2, vec![0u8; 12]).is_some());
    }

    #[test]
    fn test_frame_pixel_order() {
        let frame = Frame::from_bgr(2, 1, vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(frame.pixel(1, 0), Some([4, 5, 6]));
        assert_eq!(frame.pixel(2, 0), None);
    }

    #[test]
    fn test_clones_share_storage() {
        let frame = Frame::solid(4, 4, [9, 8, 7]);
        let copy = frame.clone();
        assert!(Arc::ptr_eq(&frame.shared_data(), &copy.shared_data()));
        assert_eq!(copy.pixel(3, 3), Some([9, 8, 7]));
    }
}
