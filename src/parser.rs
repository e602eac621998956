//! Barcode feed parsing
//!
//! A feed is a text file with one article per line: `<barcode>;<ignored...>`.
//! Every occurrence of a barcode counts as one unit, so the tally of a barcode
//! across all selected feeds is its new physical quantity.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crate::activity_log::ActivityLog;

/// Field separator of feed lines
pub const FEED_DELIMITER: char = ';';

/// Invalid lines reported per file before going quiet
const MAX_REPORTED_INVALID_LINES: usize = 5;

/// Barcode occurrence counts across one or more feeds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedTally {
    counts: BTreeMap<String, i64>,
}

impl FeedTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_counts<I, S>(counts: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self {
            counts: counts.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Count one occurrence of `barcode`
    pub fn add(&mut self, barcode: &str) {
        *self.counts.entry(barcode.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, barcode: &str) -> Option<i64> {
        self.counts.get(barcode).copied()
    }

    /// Number of distinct barcodes
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all occurrences
    pub fn total_units(&self) -> i64 {
        self.counts.values().sum()
    }

    /// `(barcode, count)` pairs in barcode order
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Per-file parse statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub lines: usize,
    pub valid: usize,
    pub invalid: usize,
}

/// Barcode of a feed line, `None` when the line does not count
///
/// The first field, trimmed, must be non-empty and all ASCII digits.
pub fn parse_feed_line(line: &str) -> Option<&str> {
    let barcode = line.split(FEED_DELIMITER).next()?.trim();
    if barcode.is_empty() || !barcode.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(barcode)
}

/// Tally one feed from any line reader
///
/// Lines are read as bytes and decoded lossily so a stray non-UTF-8 byte only
/// spoils its own line.
pub fn tally_reader<R: BufRead>(
    mut reader: R,
    source: &str,
    tally: &mut FeedTally,
    log: &ActivityLog,
) -> io::Result<FileStats> {
    let mut stats = FileStats::default();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        stats.lines += 1;

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_feed_line(line) {
            Some(barcode) => {
                tally.add(barcode);
                stats.valid += 1;
            }
            None => {
                stats.invalid += 1;
                if stats.invalid <= MAX_REPORTED_INVALID_LINES {
                    let field = line.split(FEED_DELIMITER).next().unwrap_or("").trim();
                    log.warn(format!(
                        "Invalid line #{} in {}: '{}' (barcode parsed as '{}')",
                        stats.lines, source, line, field
                    ));
                }
            }
        }
    }

    Ok(stats)
}

/// Tally the named feeds inside `dir`
///
/// Only the file name of each entry is used, so names cannot escape `dir`.
/// Missing or unreadable files are logged and skipped. An empty result means
/// no file produced a single valid line; callers treat that as "no valid data".
pub fn parse_feeds<S: AsRef<str>>(dir: &Path, files: &[S], log: &ActivityLog) -> FeedTally {
    let mut tally = FeedTally::new();
    log.info(format!("Parsing files from: {}", dir.display()));

    for name in files {
        let name = name.as_ref();
        let Some(file_name) = Path::new(name).file_name() else {
            log.warn(format!("Skipping invalid feed name: '{}'", name));
            continue;
        };
        let path = dir.join(file_name);
        let display_name = file_name.to_string_lossy();

        if !path.is_file() {
            log.warn(format!("File to parse not found: {}", path.display()));
            continue;
        }

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                log.error(format!("Could not open file {}: {}", path.display(), e));
                continue;
            }
        };

        match tally_reader(BufReader::new(file), &display_name, &mut tally, log) {
            Ok(stats) => log.info(format!(
                "Parsed {}: {} lines, {} valid barcodes.",
                display_name, stats.lines, stats.valid
            )),
            Err(e) => log.error(format!("Failed reading {}: {}", path.display(), e)),
        }
    }

    tally
}
