// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera operations
//!
//! This module provides command-line functionality for:
//! - Previewing until stopped
//! - Recording for a fixed duration
//! - Printing the resolved configuration

use camrec::config::{BackendChoice, Settings};
use camrec::controller::RecorderController;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Settings overrides accepted by every subcommand
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Backend to use (dev, embedded)
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Camera index
    #[arg(short, long, global = true)]
    camera: Option<u32>,

    /// Capture resolution as WIDTHxHEIGHT
    #[arg(short, long, global = true)]
    resolution: Option<String>,

    /// Requested frame rate
    #[arg(long, global = true)]
    fps: Option<u32>,

    /// Directory for recordings
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,
}

impl Overrides {
    /// Apply command line values on top of environment settings
    pub fn apply(self, mut settings: Settings) -> Settings {
        if let Some(backend) = self.backend {
            settings.video_backend = BackendChoice::parse(&backend);
        }
        if let Some(camera) = self.camera {
            settings.camera_index = camera;
        }
        if let Some(resolution) = self.resolution {
            settings.resolution = resolution;
        }
        if let Some(fps) = self.fps {
            settings.fps = fps;
        }
        if let Some(dir) = self.output_dir {
            settings.output_dir = dir;
        }
        settings
    }
}

fn install_stop_flag() -> Result<Arc<AtomicBool>, Box<dyn std::error::Error>> {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;
    Ok(stop_flag)
}

fn print_progress(label: &str, controller: &RecorderController, elapsed: Duration) {
    let secs = elapsed.as_secs();
    let fps = controller
        .live_fps()
        .map(|f| format!("{:.1} fps", f))
        .unwrap_or_else(|| "-- fps".to_string());
    print!("\r{}: {:02}:{:02}  {}", label, secs / 60, secs % 60, fps);
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

/// Preview until Ctrl+C, the optional time limit, or the session ending
pub fn preview(settings: Settings, seconds: Option<u64>) -> Result<(), Box<dyn std::error::Error>> {
    let stop_flag = install_stop_flag()?;
    let mut controller = RecorderController::new(settings);

    controller.start_preview()?;
    println!("{}", controller.status_text());
    println!("Previewing... (press Ctrl+C to stop)");

    let start = Instant::now();
    let limit = seconds.map(Duration::from_secs);
    loop {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping...");
            break;
        }
        if limit.is_some_and(|limit| start.elapsed() >= limit) {
            println!();
            break;
        }
        if !controller.is_previewing() {
            println!();
            println!("{}", controller.status_text());
            break;
        }

        print_progress("Preview", &controller, start.elapsed());
        std::thread::sleep(Duration::from_millis(100));
    }

    controller.stop_all();
    println!("{}", controller.status_text());
    Ok(())
}

/// Record `duration` seconds into a timestamped file under the output directory
pub fn record(settings: Settings, duration: u64) -> Result<(), Box<dyn std::error::Error>> {
    let stop_flag = install_stop_flag()?;
    let mut controller = RecorderController::new(settings);

    controller.start_preview()?;
    println!("{}", controller.status_text());

    controller.toggle_recording()?;
    println!("{}", controller.status_text());
    let Some(path) = controller.recording_path().map(|p| p.to_path_buf()) else {
        controller.stop_all();
        return Err("Recording did not start".into());
    };

    println!("Duration: {} seconds", duration);
    println!();
    println!("Recording... (press Ctrl+C to stop early)");

    let start = Instant::now();
    let target_duration = Duration::from_secs(duration);
    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        if !controller.is_recording() {
            println!();
            println!("{}", controller.status_text());
            break;
        }

        print_progress("Recording", &controller, start.elapsed());
        std::thread::sleep(Duration::from_millis(100));
    }
    println!();

    if controller.is_recording() {
        controller.toggle_recording()?;
    }
    controller.stop_all();
    println!("Video saved: {}", path.display());
    Ok(())
}

/// Print the resolved settings as JSON
pub fn print_config(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(settings)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_only_given_values() {
        let overrides = Overrides {
            backend: Some("gstreamer".to_string()),
            fps: Some(15),
            ..Default::default()
        };
        let settings = overrides.apply(Settings::default());
        assert_eq!(settings.video_backend, BackendChoice::Embedded);
        assert_eq!(settings.fps, 15);
        assert_eq!(settings.resolution, "1280x720");
        assert_eq!(settings.camera_index, 0);
    }
}
