// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Defaults used when configuration is missing or malformed
pub mod defaults {
    /// Default capture width
    pub const WIDTH: u32 = 1280;

    /// Default capture height
    pub const HEIGHT: u32 = 720;

    /// Default requested frame rate
    pub const FPS: u32 = 30;

    /// Default camera index
    pub const CAMERA_INDEX: u32 = 0;

    /// Default directory for recordings
    pub const OUTPUT_DIR: &str = "./output";

    /// Default model path (carried through configuration, unused by the backends)
    pub const MODEL_PATH: &str = "./models/current.onnx";

    /// Default container extension for recordings
    pub const RECORDING_EXTENSION: &str = "mp4";

    /// Dotenv file read at startup; process variables take precedence
    pub const ENV_FILE: &str = ".env";
}

/// Frame-rate estimation constants
pub mod fps {
    /// Capacity of the frame arrival window
    pub const WINDOW_CAPACITY: usize = 120;

    /// Minimum samples before the measured rate is trusted
    pub const MIN_SAMPLES: usize = 15;

    /// Canonical rates, checked in this order
    pub const SNAP_RATES: [u32; 7] = [30, 25, 24, 20, 15, 12, 10];

    /// Maximum distance from a canonical rate to snap to it
    pub const SNAP_TOLERANCE: f64 = 2.0;
}

/// GStreamer pipeline constants
pub mod pipeline {
    /// Default embedded capture source element
    pub const SOURCE_ELEMENT: &str = "v4l2src";

    /// Default embedded display sink
    pub const DISPLAY_SINK: &str = "autovideosink";

    /// Default embedded hardware H.264 encoder
    pub const RECORD_ENCODER: &str = "v4l2h264enc";

    /// Device path prefix used to map a camera index on the embedded backend
    pub const DEVICE_PATH_PREFIX: &str = "/dev/video";

    /// Buffers kept by the capture appsink (latest frame only)
    pub const APPSINK_MAX_BUFFERS: u32 = 1;

    /// V4L2 mmap buffers for direct capture
    pub const V4L2_BUFFER_COUNT: u32 = 4;
}

/// Timing constants
pub mod timing {
    use std::time::Duration;

    /// Time allowed for a capture worker to open its device
    pub const WORKER_START_TIMEOUT: Duration = Duration::from_secs(5);

    /// Bounded wait for a capture worker to finish after a stop request
    pub const WORKER_STOP_TIMEOUT: Duration = Duration::from_millis(1500);

    /// Bounded wait for the bus monitor thread to exit
    pub const MONITOR_STOP_TIMEOUT: Duration = Duration::from_secs(1);

    /// Bus poll interval for the monitor thread
    pub const BUS_POLL_INTERVAL: Duration = Duration::from_millis(200);

    /// How long stop_recording waits for end-of-stream before forcing teardown
    pub const EOS_TIMEOUT: Duration = Duration::from_secs(4);

    /// Pipeline state change timeout on start
    pub const START_TIMEOUT_SECS: u64 = 5;

    /// Maximum time a single blocking frame read may take on the appsink path
    pub const READ_TIMEOUT_SECS: u64 = 5;

    /// Frame counter modulo for periodic logging
    pub const FRAME_LOG_INTERVAL: u64 = 300;
}
