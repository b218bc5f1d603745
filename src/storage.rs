// SPDX-License-Identifier: GPL-3.0-only

//! Storage utilities for recordings

use crate::constants::defaults;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Create the output directory (and parents) if missing
pub fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    debug!(path = %dir.display(), "Output directory ready");
    Ok(())
}

/// File name for a recording started at `now`: `capture-YYYYmmdd-HHMMSS.mp4`
pub fn recording_file_name(now: DateTime<Local>) -> String {
    format!(
        "capture-{}.{}",
        now.format("%Y%m%d-%H%M%S"),
        defaults::RECORDING_EXTENSION
    )
}

/// Create `dir` if needed and return a timestamped recording path inside it
pub fn next_recording_path(dir: &Path) -> std::io::Result<PathBuf> {
    ensure_dir(dir)?;
    Ok(dir.join(recording_file_name(Local::now())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_recording_file_name() {
        let ts = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(recording_file_name(ts), "capture-20240309-070501.mp4");
    }

    #[test]
    fn test_next_recording_path_creates_dir() {
        let dir = std::env::temp_dir().join(format!("camrec-storage-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let path = next_recording_path(&dir.join("nested")).unwrap();
        assert!(dir.join("nested").is_dir());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("mp4"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
