use chrono::{Local, NaiveDateTime};

/// Format used in artifact names (`backup_<ts>.sql`, `preview_<ts>.csv`, ...)
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Timestamp suffix for generated files, local time with second resolution
pub fn file_timestamp() -> String {
    Local::now().format(FILE_TIMESTAMP_FORMAT).to_string()
}

/// Timestamp used in operational log lines and listings
pub fn display_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Current local time formatted for the operational log
pub fn now_display() -> String {
    display_timestamp(&Local::now().naive_local())
}

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Human-readable byte size in 1024 steps, e.g. `1536 -> "1.5 KB"`.
///
/// The value is rounded to `decimals` places and printed without trailing zeros.
pub fn format_size(bytes: u64, decimals: u32) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let factor = 10f64.powi(decimals as i32);
    let rounded = (size * factor).round() / factor;
    format!("{} {}", rounded, SIZE_UNITS[unit])
}
