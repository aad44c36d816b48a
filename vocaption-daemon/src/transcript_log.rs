//! Transcript persistence
//!
//! Appends each finalized transcript to a plain-text file. Logging failures
//! are reported and swallowed; a full disk must not stop live captioning.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::TranscriptLogSettings;

/// Line-oriented transcript file sink.
pub struct TranscriptLog {
    settings: TranscriptLogSettings,
    file: Mutex<Option<File>>,
}

impl TranscriptLog {
    pub fn new(settings: TranscriptLogSettings) -> Self {
        Self {
            settings,
            file: Mutex::new(None),
        }
    }

    /// Open the transcript file. A no-op when logging is disabled or no
    /// path is configured.
    pub fn open(&self) -> Result<()> {
        if !self.settings.enabled {
            return Ok(());
        }
        let Some(path) = &self.settings.file_path else {
            return Ok(());
        };

        let file = open_log_file(path, self.settings.overwrite)?;
        info!("Transcript log opened at {}", path.display());
        *self.file.lock() = Some(file);
        Ok(())
    }

    /// Append one finalized transcript line. Errors are logged, not raised.
    pub fn log_final(&self, text: &str) {
        let mut guard = self.file.lock();
        let Some(file) = guard.as_mut() else {
            return;
        };

        let result = if self.settings.include_timestamps {
            let stamp = Local::now().format("[%Y-%m-%dT%H:%M:%S]");
            writeln!(file, "{stamp} {text}")
        } else {
            writeln!(file, "{text}")
        };

        // Flush per line so a crash loses at most the line being written.
        if let Err(e) = result.and_then(|_| file.flush()) {
            warn!("Failed to write transcript line: {e}");
        }
    }

    /// Close the transcript file.
    pub fn close(&self) {
        self.file.lock().take();
    }

    pub fn is_open(&self) -> bool {
        self.file.lock().is_some()
    }
}

fn open_log_file(path: &Path, overwrite: bool) -> Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .context("Failed to create transcript log directory")?;
        }
    }

    let mut options = OpenOptions::new();
    options.create(true).write(true);
    if overwrite {
        options.truncate(true);
    } else {
        options.append(true);
    }

    options
        .open(path)
        .with_context(|| format!("Failed to open transcript log {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn settings(path: PathBuf, overwrite: bool) -> TranscriptLogSettings {
        TranscriptLogSettings {
            enabled: true,
            file_path: Some(path),
            include_timestamps: false,
            overwrite,
        }
    }

    #[test]
    fn test_disabled_log_stays_closed() {
        let log = TranscriptLog::new(TranscriptLogSettings::default());
        log.open().unwrap();
        assert!(!log.is_open());
        // Writing to a closed log is a quiet no-op.
        log.log_final("dropped");
    }

    #[test]
    fn test_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.txt");

        let log = TranscriptLog::new(settings(path.clone(), false));
        log.open().unwrap();
        log.log_final("first line");
        log.log_final("second line");
        log.close();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first line\nsecond line\n");
    }

    #[test]
    fn test_append_mode_preserves_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.txt");
        std::fs::write(&path, "old session\n").unwrap();

        let log = TranscriptLog::new(settings(path.clone(), false));
        log.open().unwrap();
        log.log_final("new session");
        log.close();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "old session\nnew session\n");
    }

    #[test]
    fn test_overwrite_mode_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.txt");
        std::fs::write(&path, "old session\n").unwrap();

        let log = TranscriptLog::new(settings(path.clone(), true));
        log.open().unwrap();
        log.log_final("fresh");
        log.close();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "fresh\n");
    }

    #[test]
    fn test_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deep").join("t.txt");

        let log = TranscriptLog::new(settings(path.clone(), false));
        log.open().unwrap();
        log.log_final("hello");
        log.close();

        assert!(path.exists());
    }

    #[test]
    fn test_timestamp_prefix_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");

        let log = TranscriptLog::new(TranscriptLogSettings {
            enabled: true,
            file_path: Some(path.clone()),
            include_timestamps: true,
            overwrite: false,
        });
        log.open().unwrap();
        log.log_final("stamped");
        log.close();

        let contents = std::fs::read_to_string(&path).unwrap();
        // "[2026-08-25T12:34:56] stamped"
        assert!(contents.starts_with('['), "missing timestamp: {contents}");
        assert!(contents.trim_end().ends_with("] stamped"));
        assert_eq!(contents.find(']').unwrap(), 20);
    }
}
