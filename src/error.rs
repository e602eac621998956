//! Error types for stock_reconcile

use thiserror::Error;

/// Unified error type for reconciliation operations
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Stock store query or statement failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// File system operation failed (feeds, backups, reports, log)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Report file could not be written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// None of the selected feeds contained a single valid barcode line
    #[error("No valid data found in selected files.")]
    NoValidData,
    /// Pre-apply backup could not be written, nothing was changed
    #[error("Failed to create backup. Inventory execution aborted. ({0})")]
    BackupFailed(String),
    /// Backup id is well-formed but no such artifact exists
    #[error("Backup not found: {0}")]
    BackupNotFound(String),
    /// Backup id does not look like `backup_YYYYmmdd_HHMMSS.sql`
    #[error("Invalid backup name: {0}")]
    InvalidBackupId(String),
    /// Restore failed; the store was rolled back to its pre-restore state
    #[error("Failed to restore backup {id}: {reason}")]
    RestoreFailed { id: String, reason: String },
    /// Uploaded feed was rejected (wrong extension, unreadable name)
    #[error("Invalid feed file: {0}")]
    InvalidFeed(String),
    /// Feed to delete does not exist in the pending area
    #[error("Feed not found: {0}")]
    FeedNotFound(String),
}

/// Result alias for reconciliation operations
pub type Result<T> = std::result::Result<T, ReconcileError>;
