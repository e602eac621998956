//! Backup and restore of the stock tables
//!
//! A backup is a plain SQL dump `backup_<YYYYmmdd_HHMMSS>.sql` in the backups
//! directory: for every table of [`BACKUP_TABLES`] that exists, a
//! `DROP TABLE IF EXISTS`, the table and index DDL, then one `INSERT` per row.
//!
//! Restore is all-or-nothing:
//! 1. every live table of the set is renamed to a shadow name (a failed rename
//!    undoes the renames already done),
//! 2. the dump is replayed statement by statement, stopping at the first error,
//! 3. on success the shadows are dropped and the transaction commits; on failure
//!    whatever the replay created is dropped, the shadows are renamed back and
//!    the transaction is rolled back.
//!
//! The whole protocol runs inside one immediate transaction, which also keeps
//! other writers out while tables are swapped. A backup taken on a connection
//! in autocommit mode reads all tables inside one read transaction.

use chrono::NaiveDateTime;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::activity_log::ActivityLog;
use crate::error::{ReconcileError, Result};
use crate::store::{self, quote_ident};
use crate::utils::{display_timestamp, file_timestamp, format_size, FILE_TIMESTAMP_FORMAT};

/// Tables captured by a backup. Missing tables are skipped.
pub const BACKUP_TABLES: [&str; 4] = ["stock_available", "stock", "product", "product_shop"];

/// A dump smaller than this is treated as a broken connection, not a backup
pub const MIN_BACKUP_BYTES: u64 = 128;

const BACKUP_PREFIX: &str = "backup_";
const BACKUP_SUFFIX: &str = ".sql";

/// One backup artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    /// File name, e.g. `backup_20260131_140211.sql`
    pub id: String,
    pub created_at: String,
    pub size: u64,
    pub size_human: String,
}

/// Creation time embedded in a backup id, `None` if the id is not a backup name
pub fn parse_backup_id(id: &str) -> Option<NaiveDateTime> {
    let stamp = id.strip_prefix(BACKUP_PREFIX)?.strip_suffix(BACKUP_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, FILE_TIMESTAMP_FORMAT).ok()
}

/// SQL literal for a stored value
///
/// NULL stays `NULL`, text is single-quoted with `''` doubling. Line breaks in
/// text are spliced in with `char()` so no statement ever spans a `;` + newline.
pub fn sql_literal(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) if f.is_infinite() => {
            if f > 0.0 {
                "9e999".to_string()
            } else {
                "-9e999".to_string()
            }
        }
        ValueRef::Real(f) => format!("{:?}", f),
        ValueRef::Text(bytes) => quote_text(&String::from_utf8_lossy(bytes)),
        ValueRef::Blob(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
            format!("X'{}'", hex)
        }
    }
}

fn quote_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\n' => out.push_str("' || char(10) || '"),
            '\r' => out.push_str("' || char(13) || '"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// A live table parked under a shadow name during restore
#[derive(Debug)]
struct Shadow {
    original: String,
    shadow: String,
    /// Explicit indexes dropped from the shadow, recreated on rollback
    indexes: Vec<(String, String)>,
}

/// Creates, lists, restores and deletes backup artifacts
#[derive(Debug, Clone)]
pub struct BackupManager {
    dir: PathBuf,
    log: ActivityLog,
}

impl BackupManager {
    pub fn new(dir: impl Into<PathBuf>, log: ActivityLog) -> Self {
        Self {
            dir: dir.into(),
            log,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn artifact_path(&self, id: &str) -> Result<PathBuf> {
        if parse_backup_id(id).is_none() {
            return Err(ReconcileError::InvalidBackupId(id.to_string()));
        }
        let path = self.dir.join(id);
        if !path.is_file() {
            return Err(ReconcileError::BackupNotFound(id.to_string()));
        }
        Ok(path)
    }

    // ── Create ─────────────────────────────────────────────────────────────

    /// Dump the backup tables to a new artifact
    ///
    /// Fails with [`ReconcileError::BackupFailed`] (and leaves no file behind)
    /// when the dump cannot be written or is below [`MIN_BACKUP_BYTES`].
    ///
    /// Inside a caller's transaction the dump reads that transaction's view.
    /// Otherwise it opens its own read transaction so all tables come from
    /// the same snapshot.
    pub fn create_backup(&self, conn: &Connection) -> Result<BackupInfo> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| self.backup_failed(format!("cannot create {}: {}", self.dir.display(), e)))?;

        let snapshot = if conn.is_autocommit() {
            Some(
                conn.unchecked_transaction()
                    .map_err(|e| self.backup_failed(format!("cannot begin snapshot: {}", e)))?,
            )
        } else {
            None
        };

        let id = format!("{}{}{}", BACKUP_PREFIX, file_timestamp(), BACKUP_SUFFIX);
        let path = self.dir.join(&id);

        let written = File::create(&path)
            .map_err(|e| e.to_string())
            .and_then(|file| {
                let mut out = BufWriter::new(file);
                dump_tables(conn, &mut out)?;
                out.flush().map_err(|e| e.to_string())?;
                Ok(())
            })
            .and_then(|_| std::fs::metadata(&path).map(|m| m.len()).map_err(|e| e.to_string()));

        // Read-only; ending it releases the shared lock
        if let Some(tx) = snapshot {
            if let Err(e) = tx.rollback() {
                log::warn!("Failed to end backup snapshot: {}", e);
            }
        }

        let size = match written {
            Ok(size) => size,
            Err(reason) => {
                remove_partial(&path);
                return Err(self.backup_failed(reason));
            }
        };

        if size < MIN_BACKUP_BYTES {
            remove_partial(&path);
            return Err(self.backup_failed(format!(
                "dump is only {} bytes, refusing to keep it",
                size
            )));
        }

        self.log.info(format!(
            "Backup created: {} ({})",
            id,
            format_size(size, 2)
        ));
        let created_at = parse_backup_id(&id)
            .map(|ts| display_timestamp(&ts))
            .unwrap_or_default();
        Ok(BackupInfo {
            id,
            created_at,
            size,
            size_human: format_size(size, 2),
        })
    }

    fn backup_failed(&self, reason: String) -> ReconcileError {
        self.log.error(format!("Backup failed: {}", reason));
        ReconcileError::BackupFailed(reason)
    }

    // ── List / delete ──────────────────────────────────────────────────────

    /// All artifacts, newest first by the timestamp in their name
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut found: Vec<(NaiveDateTime, BackupInfo)> = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let id = entry.file_name().to_string_lossy().to_string();
            let Some(created) = parse_backup_id(&id) else {
                continue;
            };
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            found.push((
                created,
                BackupInfo {
                    id,
                    created_at: display_timestamp(&created),
                    size: meta.len(),
                    size_human: format_size(meta.len(), 2),
                },
            ));
        }
        found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.id.cmp(&a.1.id)));
        Ok(found.into_iter().map(|(_, info)| info).collect())
    }

    pub fn has_backups(&self) -> Result<bool> {
        Ok(!self.list_backups()?.is_empty())
    }

    pub fn latest_backup(&self) -> Result<Option<BackupInfo>> {
        Ok(self.list_backups()?.into_iter().next())
    }

    pub fn delete_backup(&self, id: &str) -> Result<()> {
        let path = self.artifact_path(id)?;
        std::fs::remove_file(path)?;
        self.log.info(format!("Backup deleted: {}", id));
        Ok(())
    }

    // ── Restore ────────────────────────────────────────────────────────────

    /// Restore the newest artifact, returning its id
    pub fn restore_latest(&self, conn: &mut Connection) -> Result<String> {
        let latest = self
            .latest_backup()?
            .ok_or_else(|| ReconcileError::BackupNotFound("no backups available".to_string()))?;
        self.restore_backup(conn, &latest.id)?;
        Ok(latest.id)
    }

    /// Replace the backup tables with the content of artifact `id`
    ///
    /// On return the store holds either the full artifact content or exactly
    /// its previous content.
    pub fn restore_backup(&self, conn: &mut Connection, id: &str) -> Result<()> {
        let path = self.artifact_path(id)?;
        let restore_failed = |reason: String| ReconcileError::RestoreFailed {
            id: id.to_string(),
            reason,
        };

        if std::fs::metadata(&path)?.len() == 0 {
            self.log.error(format!("Failed to restore backup {}: file is empty", id));
            return Err(restore_failed("backup file is empty".to_string()));
        }
        let file = File::open(&path)?;

        self.log.info(format!("Restoring backup: {}", id));
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Phase a: park live tables under shadow names
        let shadows = match park_tables(&tx) {
            Ok(shadows) => shadows,
            Err(reason) => {
                self.log
                    .error(format!("Failed to restore backup {}: {}", id, reason));
                // Dropping the transaction rolls back anything left over
                return Err(restore_failed(reason));
            }
        };
        let tables_before: HashSet<String> = store::list_tables(&tx)?.into_iter().collect();

        // Phase b: replay the artifact
        match replay(&tx, BufReader::new(file)) {
            Ok(executed) => {
                // Phase c (commit): drop the shadows
                for shadow in &shadows {
                    store::drop_table(&tx, &shadow.shadow)?;
                }
                tx.commit()?;
                self.log.info(format!(
                    "Backup restored successfully: {} ({} statements)",
                    id, executed
                ));
                Ok(())
            }
            Err(reason) => {
                // Phase c (rollback): drop what the replay created, put the shadows back.
                // Renames rewrite the stored DDL, so the transaction is rolled back
                // either way and the schema text stays as it was.
                if let Err(e) = drop_created_tables(&tx, &tables_before)
                    .and_then(|_| unpark_tables(&tx, &shadows))
                {
                    log::error!("Restore compensation failed: {}", e);
                }
                tx.rollback()?;
                self.log.error(format!(
                    "Failed to restore backup {}: {}. Previous data kept.",
                    id, reason
                ));
                Err(restore_failed(reason))
            }
        }
    }
}

fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            log::error!("Failed to remove partial backup {}: {}", path.display(), e);
        }
    }
}

/// Write the dump of every existing backup table
fn dump_tables<W: Write>(conn: &Connection, out: &mut W) -> std::result::Result<(), String> {
    for table in BACKUP_TABLES {
        if !store::table_exists(conn, table).map_err(|e| e.to_string())? {
            log::debug!("Backup: table {} not present, skipped", table);
            continue;
        }
        let rows = dump_table(conn, table, out).map_err(|e| format!("{}: {}", table, e))?;
        log::debug!("Backup: dumped {} rows from {}", rows, table);
    }
    Ok(())
}

fn dump_table<W: Write>(
    conn: &Connection,
    table: &str,
    out: &mut W,
) -> std::result::Result<usize, Box<dyn std::error::Error>> {
    let ident = quote_ident(table);
    writeln!(out, "DROP TABLE IF EXISTS {};", ident)?;
    if let Some(ddl) = store::table_ddl(conn, table)? {
        writeln!(out, "{};", ddl)?;
    }
    for (_, ddl) in store::index_ddl(conn, table)? {
        writeln!(out, "{};", ddl)?;
    }

    let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", ident))?;
    let columns = stmt.column_count();
    let mut rows = stmt.query([])?;
    let mut count = 0;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns);
        for i in 0..columns {
            values.push(sql_literal(row.get_ref(i)?));
        }
        writeln!(out, "INSERT INTO {} VALUES ({});", ident, values.join(", "))?;
        count += 1;
    }
    writeln!(out)?;
    Ok(count)
}

fn shadow_name(conn: &Connection, table: &str, stamp: &str) -> rusqlite::Result<String> {
    let base = format!("{}_shadow_{}", table, stamp);
    let mut name = base.clone();
    let mut n = 1;
    while store::table_exists(conn, &name)? {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    Ok(name)
}

/// Rename every existing backup table to a shadow name
///
/// On failure the renames already done are undone before returning.
fn park_tables(conn: &Connection) -> std::result::Result<Vec<Shadow>, String> {
    park_tables_with(conn, store::rename_table)
}

fn park_tables_with<F>(conn: &Connection, mut rename: F) -> std::result::Result<Vec<Shadow>, String>
where
    F: FnMut(&Connection, &str, &str) -> rusqlite::Result<()>,
{
    let stamp = file_timestamp();
    let mut parked: Vec<Shadow> = Vec::new();

    for table in BACKUP_TABLES {
        let mut step = || -> rusqlite::Result<Option<Shadow>> {
            if !store::table_exists(conn, table)? {
                return Ok(None);
            }
            let shadow = shadow_name(conn, table, &stamp)?;
            let indexes = store::index_ddl(conn, table)?;
            rename(conn, table, &shadow)?;
            let mut parked_shadow = Shadow {
                original: table.to_string(),
                shadow,
                indexes: Vec::new(),
            };
            // Indexes follow the table; free their names for the replay
            for (name, ddl) in indexes {
                store::drop_index(conn, &name)?;
                parked_shadow.indexes.push((name, ddl));
            }
            Ok(Some(parked_shadow))
        };

        match step() {
            Ok(Some(shadow)) => parked.push(shadow),
            Ok(None) => {}
            Err(e) => {
                let reason = format!("could not rename {}: {}", table, e);
                if let Err(undo) = unpark_tables(conn, &parked) {
                    return Err(format!("{}; undoing renames failed: {}", reason, undo));
                }
                return Err(reason);
            }
        }
    }
    Ok(parked)
}

/// Rename shadows back to their original names and recreate their indexes
fn unpark_tables(conn: &Connection, shadows: &[Shadow]) -> rusqlite::Result<()> {
    for shadow in shadows.iter().rev() {
        store::rename_table(conn, &shadow.shadow, &shadow.original)?;
        for (_, ddl) in &shadow.indexes {
            store::execute_raw(conn, ddl)?;
        }
    }
    Ok(())
}

fn drop_created_tables(conn: &Connection, before: &HashSet<String>) -> rusqlite::Result<()> {
    for table in store::list_tables(conn)? {
        if !before.contains(&table) {
            log::debug!("Restore rollback: dropping partially restored table {}", table);
            store::drop_table(conn, &table)?;
        }
    }
    Ok(())
}

/// Execute the statements of a dump in file order, stopping at the first failure
///
/// Statements end with `;` at the end of a line.
fn replay<R: BufRead>(conn: &Connection, reader: R) -> std::result::Result<usize, String> {
    let mut pending = String::new();
    let mut executed = 0;
    let mut run = |sql: &str| -> std::result::Result<(), String> {
        store::execute_raw(conn, sql).map_err(|e| {
            let preview: String = sql.chars().take(80).collect();
            format!("statement #{} failed ({}): {}", executed + 1, e, preview)
        })?;
        executed += 1;
        Ok(())
    };

    for line in reader.lines() {
        let line = line.map_err(|e| format!("cannot read backup: {}", e))?;
        pending.push_str(&line);
        pending.push('\n');
        if line.trim_end().ends_with(';') {
            let statement = pending.trim();
            if !statement.is_empty() {
                run(statement)?;
            }
            pending.clear();
        }
    }
    let rest = pending.trim();
    if !rest.is_empty() {
        run(rest)?;
    }
    Ok(executed)
}
