// SPDX-License-Identifier: GPL-3.0-only

//! Launch lines for the embedded backend

use crate::backends::types::Resolution;
use crate::config::PipelineSettings;
use std::path::Path;

/// Shared `source ! caps ! videoconvert` head of both graphs
fn capture_head(settings: &PipelineSettings, device: &str, resolution: Resolution, fps: u32) -> String {
    format!(
        "{} device={} ! video/x-raw,width={},height={},framerate={}/1 ! videoconvert",
        settings.source, device, resolution.width, resolution.height, fps
    )
}

/// Preview-only graph: capture into the display sink
pub fn preview_description(
    settings: &PipelineSettings,
    device: &str,
    resolution: Resolution,
    fps: u32,
) -> String {
    format!(
        "{} ! {} sync=false",
        capture_head(settings, device, resolution, fps),
        settings.display_sink
    )
}

/// Recording graph: the preview branch plus an encoder branch through a tee
pub fn record_description(
    settings: &PipelineSettings,
    encoder: &str,
    device: &str,
    resolution: Resolution,
    fps: u32,
    path: &Path,
) -> String {
    format!(
        "{} ! tee name=t \
         t. ! queue ! {} sync=false \
         t. ! queue ! {} ! h264parse ! mp4mux faststart=true name=mux ! \
         filesink location=\"{}\" name=fsink",
        capture_head(settings, device, resolution, fps),
        settings.display_sink,
        encoder,
        escape_location(path)
    )
}

/// Quote-safe file location for a launch line
fn escape_location(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}
