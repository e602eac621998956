//! Operational log shown to the shop operator.
//!
//! Append-only text file, one entry per line:
//! `[2026-01-31 14:02:11] [WARN] [stock_reconcile v0.1.0] message`.
//! Every entry is also forwarded to the `log` facade so it shows up in the
//! process log. The log is an explicit value handed to each component.

use std::collections::VecDeque;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::utils::{format_size, now_display};

/// Number of lines returned by [`ActivityLog::tail`] when the caller has no preference
pub const DEFAULT_TAIL_LINES: usize = 30;

/// Log entry severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// Handle on the operational log file
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
    component: String,
}

impl ActivityLog {
    /// Log tagged with this crate's name and version
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_component(
            path,
            format!("{} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        )
    }

    pub fn with_component(path: impl Into<PathBuf>, component: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            component: component.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.write(Severity::Info, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.write(Severity::Warn, message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.write(Severity::Error, message.as_ref());
    }

    pub fn critical(&self, message: impl AsRef<str>) {
        self.write(Severity::Critical, message.as_ref());
    }

    /// Appends one entry. A failing append is reported through `log` and otherwise ignored.
    pub fn write(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Info => log::info!("{}", message),
            Severity::Warn => log::warn!("{}", message),
            Severity::Error | Severity::Critical => log::error!("{}", message),
        }

        let line = format!(
            "[{}] [{}] [{}] {}\n",
            now_display(),
            severity,
            self.component,
            message
        );
        if let Err(e) = self.append(&line) {
            log::error!(
                "Failed to append to operational log {}: {}",
                self.path.display(),
                e
            );
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }

    /// Last `lines` non-empty entries, oldest first. Missing log yields an empty list.
    ///
    /// Reads the file line by line and keeps only a window of `lines` entries.
    pub fn tail(&self, lines: usize) -> std::io::Result<Vec<String>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if lines == 0 {
            return Ok(Vec::new());
        }
        let mut window = VecDeque::with_capacity(lines.min(1024));
        for line in BufReader::new(file).lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if window.len() == lines {
                window.pop_front();
            }
            window.push_back(trimmed.to_string());
        }
        Ok(window.into_iter().collect())
    }

    /// Size of the log in bytes (0 when it does not exist yet)
    pub fn size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Size of the log in human units, e.g. `"12.4 KB"`
    pub fn size_human(&self, decimals: u32) -> String {
        format_size(self.size(), decimals)
    }

    /// Copies the whole log to `dest` (download). Returns the number of bytes copied.
    pub fn export(&self, dest: impl AsRef<Path>) -> std::io::Result<u64> {
        if !self.path.exists() {
            File::create(dest.as_ref())?;
            return Ok(0);
        }
        std::fs::copy(&self.path, dest)
    }

    /// Truncates the log to empty
    pub fn clear(&self) -> std::io::Result<()> {
        File::create(&self.path)?;
        log::info!("Operational log cleared: {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_log(dir: &TempDir) -> ActivityLog {
        ActivityLog::with_component(dir.path().join("ops.log"), "stock_reconcile v9.9.9")
    }

    #[test]
    fn entries_follow_line_format() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        log.warn("Invalid line #3 in a.txt");

        let content = std::fs::read_to_string(log.path()).unwrap();
        let line = content.lines().next().unwrap();
        // "[YYYY-mm-dd HH:MM:SS] " is 22 characters
        assert!(line.starts_with('['));
        assert_eq!(&line[20..22], "] ");
        assert!(line.ends_with("[WARN] [stock_reconcile v9.9.9] Invalid line #3 in a.txt"));
    }

    #[test]
    fn default_component_carries_crate_version() {
        let dir = TempDir::new().unwrap();
        let log = ActivityLog::new(dir.path().join("ops.log"));
        log.info("hello");
        let content = std::fs::read_to_string(log.path()).unwrap();
        assert!(content.contains(&format!("[stock_reconcile v{}]", env!("CARGO_PKG_VERSION"))));
    }

    #[test]
    fn tail_returns_last_lines_in_order() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        for i in 0..10 {
            log.info(format!("entry {i}"));
        }

        let tail = log.tail(3).unwrap();
        assert_eq!(tail.len(), 3);
        assert!(tail[0].ends_with("entry 7"));
        assert!(tail[2].ends_with("entry 9"));
    }

    #[test]
    fn tail_skips_blank_lines_and_handles_short_files() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        std::fs::write(log.path(), "first\n\n   \nsecond\n").unwrap();

        let tail = log.tail(DEFAULT_TAIL_LINES).unwrap();
        assert_eq!(tail, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn tail_of_missing_log_is_empty() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        assert!(log.tail(5).unwrap().is_empty());
        assert_eq!(log.size(), 0);
        assert_eq!(log.size_human(2), "0 B");
    }

    #[test]
    fn clear_truncates_and_export_copies() {
        let dir = TempDir::new().unwrap();
        let log = test_log(&dir);
        log.info("something happened");

        let dest = dir.path().join("download.log");
        let copied = log.export(&dest).unwrap();
        assert_eq!(copied, log.size());
        assert!(copied > 0);

        log.clear().unwrap();
        assert_eq!(log.size(), 0);
        assert!(std::fs::read_to_string(&dest)
            .unwrap()
            .contains("something happened"));
    }
}
