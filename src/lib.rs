//! Stock Reconcile - barcode feed inventory reconciliation
//!
//! Tallies barcode feeds, diffs them against the SQLite stock store, applies
//! the result behind a backup and audits the store for consistency.

pub mod activity_log;
pub mod audit;
pub mod backup;
pub mod config;
pub mod diff;
pub mod error;
pub mod feeds;
pub mod models;
pub mod parser;
pub mod reconcile;
pub mod reports;
pub mod store;
pub mod utils;

pub use activity_log::{ActivityLog, Severity};
pub use audit::ConsistencyAuditor;
pub use backup::{BackupInfo, BackupManager};
pub use config::Settings;
pub use diff::compute_changes;
pub use error::{ReconcileError, Result};
pub use feeds::{FeedFile, PendingFeeds};
pub use models::{
    AuditResult, ChangeKind, ChangePlan, Inconsistency, InconsistencyKind, LocationId, Scope,
    StockChange, StockLevel,
};
pub use parser::{parse_feeds, FeedTally};
pub use reconcile::{ApplyOutcome, PreviewOutcome, Reconciler, RunRequest};
pub use reports::{ReportSet, ReportWriter};
pub use store::init_schema;
