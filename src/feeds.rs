//! Pending feeds area: uploaded `.txt` feeds waiting to be previewed or applied.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::activity_log::ActivityLog;
use crate::error::{ReconcileError, Result};
use crate::utils::file_timestamp;

/// Only feeds with this extension are accepted
pub const FEED_EXTENSION: &str = "txt";

/// One uploaded feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedFile {
    pub name: String,
    pub size: u64,
    pub modified: String,
}

/// Directory holding uploaded feeds
#[derive(Debug, Clone)]
pub struct PendingFeeds {
    dir: PathBuf,
    log: ActivityLog,
}

fn is_feed(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(FEED_EXTENSION))
        .unwrap_or(false)
}

impl PendingFeeds {
    pub fn new(dir: impl Into<PathBuf>, log: ActivityLog) -> Self {
        Self {
            dir: dir.into(),
            log,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Feeds in the area, sorted by name
    pub fn list(&self) -> Result<Vec<FeedFile>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut feeds = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() || !is_feed(&path) {
                continue;
            }
            let meta = entry.metadata()?;
            let modified = meta
                .modified()
                .map(|t| {
                    DateTime::<Local>::from(t)
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string()
                })
                .unwrap_or_default();
            feeds.push(FeedFile {
                name: entry.file_name().to_string_lossy().to_string(),
                size: meta.len(),
                modified,
            });
        }
        feeds.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(feeds)
    }

    /// Copy a feed into the area and return its stored name
    ///
    /// A name already taken gets a `_<timestamp>` suffix before the extension.
    pub fn import(&self, source: &Path) -> Result<String> {
        if !is_feed(source) {
            return Err(ReconcileError::InvalidFeed(format!(
                "{} (only .{} files are accepted)",
                source.display(),
                FEED_EXTENSION
            )));
        }
        let original = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ReconcileError::InvalidFeed(source.display().to_string()))?;

        std::fs::create_dir_all(&self.dir)?;
        let mut target_name = original.clone();
        if self.dir.join(&target_name).exists() {
            let stem = source
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let ext = source
                .extension()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| FEED_EXTENSION.to_string());
            target_name = format!("{}_{}.{}", stem, file_timestamp(), ext);
        }

        std::fs::copy(source, self.dir.join(&target_name))?;
        if target_name == original {
            self.log.info(format!("File uploaded: {}", target_name));
        } else {
            self.log.info(format!(
                "File uploaded (renamed from {}): {}",
                original, target_name
            ));
        }
        Ok(target_name)
    }

    /// Delete one feed; only its file name is used
    pub fn delete(&self, name: &str) -> Result<()> {
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| ReconcileError::FeedNotFound(name.to_string()))?;
        let path = self.dir.join(file_name);
        if !path.is_file() {
            return Err(ReconcileError::FeedNotFound(name.to_string()));
        }
        std::fs::remove_file(&path)?;
        self.log
            .info(format!("File deleted: {}", file_name.to_string_lossy()));
        Ok(())
    }
}
