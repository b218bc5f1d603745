// SPDX-License-Identifier: GPL-3.0-only

//! Startup configuration
//!
//! Settings are resolved once from the process environment, an optional `.env`
//! file and command line overrides, then handed to the backend selector. Only the resolution string is
//! re-parsed on use, falling back to 1280x720 when it is malformed.

use crate::constants::{defaults, pipeline};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which capture/encode backend to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Direct device capture with an in-process encoder (development machines)
    #[default]
    Dev,
    /// Declarative GStreamer pipelines (embedded target)
    Embedded,
}

impl BackendChoice {
    /// Parse the `VIDEO_BACKEND` value. Unknown values select the dev backend.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gstreamer" | "gst" | "embedded" => BackendChoice::Embedded,
            "opencv" | "dev" | "" => BackendChoice::Dev,
            other => {
                warn!(value = other, "Unknown VIDEO_BACKEND, using dev backend");
                BackendChoice::Dev
            }
        }
    }
}

impl std::fmt::Display for BackendChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendChoice::Dev => write!(f, "dev"),
            BackendChoice::Embedded => write!(f, "embedded"),
        }
    }
}

/// Element choices for the embedded pipeline graphs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Source element (e.g. `v4l2src`)
    pub source: String,
    /// Display sink element (e.g. `autovideosink`)
    pub display_sink: String,
    /// H.264 encoder for the recording branch; `None` disables recording
    pub record_encoder: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            source: pipeline::SOURCE_ELEMENT.to_string(),
            display_sink: pipeline::DISPLAY_SINK.to_string(),
            record_encoder: Some(pipeline::RECORD_ENCODER.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Backend requested by configuration
    pub video_backend: BackendChoice,
    /// Model path, carried for downstream consumers
    pub model_path: PathBuf,
    /// Directory receiving recordings
    pub output_dir: PathBuf,
    /// Target resolution as `WxH`
    pub resolution: String,
    /// Target frame rate
    pub fps: u32,
    /// Camera device index
    pub camera_index: u32,
    /// Embedded pipeline elements
    pub pipeline: PipelineSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            video_backend: BackendChoice::default(),
            model_path: PathBuf::from(defaults::MODEL_PATH),
            output_dir: PathBuf::from(defaults::OUTPUT_DIR),
            resolution: format!("{}x{}", defaults::WIDTH, defaults::HEIGHT),
            fps: defaults::FPS,
            camera_index: defaults::CAMERA_INDEX,
            pipeline: PipelineSettings::default(),
        }
    }
}

impl Settings {
    /// Resolve settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings from the process environment, filling gaps from a
    /// dotenv file. A missing file is not an error.
    pub fn from_env_with_file(path: &Path) -> Self {
        let file = read_env_file(path);
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file.get(key).cloned()))
    }

    /// Resolve settings through an arbitrary key lookup
    ///
    /// Numeric values that fail to parse keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(v) = lookup("VIDEO_BACKEND") {
            settings.video_backend = BackendChoice::parse(&v);
        }
        if let Some(v) = lookup("MODEL_PATH") {
            settings.model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("OUTPUT_DIR") {
            settings.output_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("RESOLUTION") {
            settings.resolution = v;
        }
        if let Some(v) = lookup("FPS") {
            match v.trim().parse() {
                Ok(fps) => settings.fps = fps,
                Err(_) => warn!(value = %v, "Invalid FPS, keeping default"),
            }
        }
        if let Some(v) = lookup("CAMERA_INDEX") {
            match v.trim().parse() {
                Ok(index) => settings.camera_index = index,
                Err(_) => warn!(value = %v, "Invalid CAMERA_INDEX, keeping default"),
            }
        }
        if let Some(v) = lookup("GST_SOURCE") {
            settings.pipeline.source = v;
        }
        if let Some(v) = lookup("GST_SINK") {
            settings.pipeline.display_sink = v;
        }
        if let Some(v) = lookup("GST_ENCODER") {
            // An empty encoder turns recording off on the embedded backend
            settings.pipeline.record_encoder = if v.trim().is_empty() { None } else { Some(v) };
        }

        settings
    }

    /// Parsed `(width, height)`, falling back to 1280x720
    pub fn width_height(&self) -> (u32, u32) {
        parse_resolution(&self.resolution).unwrap_or_else(|| {
            warn!(resolution = %self.resolution, "Invalid resolution, using default");
            (defaults::WIDTH, defaults::HEIGHT)
        })
    }

    /// Device path for the embedded backend (`/dev/video{index}`)
    pub fn device_path(&self) -> String {
        format!("{}{}", pipeline::DEVICE_PATH_PREFIX, self.camera_index)
    }
}

/// Read `KEY=value` pairs from a dotenv file
///
/// Malformed lines are skipped; an unreadable or missing file yields no values.
pub fn read_env_file(path: &Path) -> HashMap<String, String> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => {
            debug!(path = %path.display(), "No env file");
            return HashMap::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read env file");
            return HashMap::new();
        }
    };

    let mut values = HashMap::new();
    for item in iter {
        match item {
            Ok((key, value)) => {
                values.insert(key, value);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping malformed env file line"),
        }
    }
    values
}

/// Parse a `WxH` resolution string (case-insensitive separator)
pub fn parse_resolution(value: &str) -> Option<(u32, u32)> {
    let lower = value.trim().to_ascii_lowercase();
    let (w, h) = lower.split_once('x')?;
    let width = w.trim().parse().ok()?;
    let height = h.trim().parse().ok()?;
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("1920x1080"), Some((1920, 1080)));
        assert_eq!(parse_resolution("640X480"), Some((640, 480)));
        assert_eq!(parse_resolution(" 800 x 600 "), Some((800, 600)));
        assert_eq!(parse_resolution("1080p"), None);
        assert_eq!(parse_resolution("x720"), None);
    }

    #[test]
    fn test_backend_choice_parse() {
        assert_eq!(BackendChoice::parse("GStreamer"), BackendChoice::Embedded);
        assert_eq!(BackendChoice::parse("opencv"), BackendChoice::Dev);
        assert_eq!(BackendChoice::parse("something"), BackendChoice::Dev);
    }

    #[test]
    fn test_empty_encoder_disables_recording() {
        let settings = Settings::from_lookup(|key| match key {
            "GST_ENCODER" => Some(String::new()),
            _ => None,
        });
        assert_eq!(settings.pipeline.record_encoder, None);
    }
}
