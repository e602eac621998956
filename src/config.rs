//! Runtime settings: where the stock database and the operator-managed areas live.

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "stock_reconcile";
const PENDING_FEEDS_DIR: &str = "pending_feeds";
const BACKUPS_DIR: &str = "backups";
const REPORTS_DIR: &str = "reports";
const LOG_FILE: &str = "stock_reconcile.log";

/// How long a connection waits for another run's write lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Paths for one reconciler installation
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: PathBuf,
    pub data_dir: PathBuf,
}

impl Settings {
    pub fn new(database: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            data_dir: data_dir.into(),
        }
    }

    /// Settings rooted in a single directory (database inside it)
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self::new(data_dir.join("stock.db"), data_dir)
    }

    /// Uploaded feeds waiting to be previewed/applied
    pub fn pending_feeds_dir(&self) -> PathBuf {
        self.data_dir.join(PENDING_FEEDS_DIR)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join(BACKUPS_DIR)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join(REPORTS_DIR)
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }

    /// Creates the data directory and its sub-areas if missing
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [
            self.pending_feeds_dir(),
            self.backups_dir(),
            self.reports_dir(),
        ] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                log::info!("Created directory: {}", dir.display());
            }
        }
        if let Some(parent) = self.database.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Opens the stock database with a busy timeout so concurrent runs queue up
    pub fn open_database(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.database)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        log::debug!("Opened database: {}", self.database.display());
        Ok(conn)
    }
}

/// Returns the default data directory: ~/.local/share/stock_reconcile
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Returns the default database path: ~/.local/share/stock_reconcile/stock.db
pub fn default_db_path() -> PathBuf {
    default_data_dir().join("stock.db")
}
