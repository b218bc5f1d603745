// SPDX-License-Identifier: GPL-3.0-only

//! Frame-rate estimation from frame arrival times
//!
//! The estimator picks the frame rate written into recorded file headers when
//! the camera cannot be trusted to deliver what was requested. Measured rates
//! close to a common broadcast rate are snapped to it so players do not see
//! odd values like 29 or 31 fps.

use crate::constants::{defaults, fps};
use std::collections::VecDeque;
use std::time::Instant;

/// Bounded FIFO of frame arrival instants
#[derive(Debug, Clone)]
pub struct TimestampWindow {
    samples: VecDeque<Instant>,
    capacity: usize,
}

impl TimestampWindow {
    pub fn new() -> Self {
        Self::with_capacity(fps::WINDOW_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an instant, evicting the oldest once full
    pub fn push(&mut self, at: Instant) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(at);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn oldest(&self) -> Option<Instant> {
        self.samples.front().copied()
    }

    pub fn newest(&self) -> Option<Instant> {
        self.samples.back().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Raw rate over the window, `None` with fewer than two samples or zero span
    pub fn measured_rate(&self) -> Option<f64> {
        let (oldest, newest) = (self.oldest()?, self.newest()?);
        let span = newest.duration_since(oldest).as_secs_f64();
        if self.len() < 2 || span <= 0.0 {
            return None;
        }
        Some((self.len() - 1) as f64 / span)
    }
}

impl Default for TimestampWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Integer frame rate for encoder headers
#[derive(Debug, Clone, Copy)]
pub struct FrameRateEstimator {
    requested: u32,
}

impl FrameRateEstimator {
    /// `requested` of zero means "nothing requested" and falls back to 30
    pub fn new(requested: u32) -> Self {
        let requested = if requested == 0 {
            defaults::FPS
        } else {
            requested
        };
        Self { requested }
    }

    pub fn requested(&self) -> u32 {
        self.requested
    }

    /// Estimate the effective frame rate of `window`
    pub fn estimate(&self, window: &TimestampWindow) -> u32 {
        if window.len() < fps::MIN_SAMPLES {
            return self.requested;
        }
        match window.measured_rate() {
            Some(rate) => snap_rate(rate),
            None => self.requested,
        }
    }
}

/// Snap to the first canonical rate within tolerance, else round (minimum 1)
pub fn snap_rate(rate: f64) -> u32 {
    for canonical in fps::SNAP_RATES {
        if (rate - canonical as f64).abs() < fps::SNAP_TOLERANCE {
            return canonical;
        }
    }
    (rate.round() as u32).max(1)
}

/// Un-snapped frame rate for live display
#[derive(Debug, Clone, Default)]
pub struct LiveFpsMeter {
    window: TimestampWindow,
}

impl LiveFpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, at: Instant) {
        self.window.push(at);
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn fps(&self) -> Option<f64> {
        self.window.measured_rate()
    }
}
