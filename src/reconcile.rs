//! Apply engine and preview orchestration
//!
//! Preview: parse → diff → preview report. The store is only read.
//!
//! Apply: parse, then inside one immediate transaction backup → diff → write
//! updates → re-derive parents → write zeroes → disable products, commit,
//! then a report-only audit and the run reports. Any store failure before the
//! commit rolls back every write of the run.

use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::activity_log::ActivityLog;
use crate::audit::ConsistencyAuditor;
use crate::backup::{BackupInfo, BackupManager};
use crate::config::Settings;
use crate::diff::compute_changes;
use crate::error::{ReconcileError, Result};
use crate::feeds::PendingFeeds;
use crate::models::{AuditResult, ChangePlan, LocationId, ProductId, Scope};
use crate::parser::{parse_feeds, FeedTally};
use crate::reports::{ReportSet, ReportWriter};
use crate::store;

/// What to reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Feed file names inside the pending feeds area
    pub files: Vec<String>,
    /// Which stock records the run writes
    pub scope: Scope,
    /// Location audited after the run
    pub location_id: LocationId,
    /// Zero every record of a product absent from the feeds
    pub include_zeroing: bool,
}

impl RunRequest {
    /// Request for a single location
    pub fn single(files: Vec<String>, location_id: LocationId, include_zeroing: bool) -> Self {
        Self {
            files,
            scope: Scope::Single(location_id),
            location_id,
            include_zeroing,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewOutcome {
    pub plan: ChangePlan,
    pub report: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    pub backup: BackupInfo,
    pub plan: ChangePlan,
    pub audit: AuditResult,
    pub reports: ReportSet,
}

/// Wires the reconciliation components to one installation
#[derive(Debug, Clone)]
pub struct Reconciler {
    settings: Settings,
    log: ActivityLog,
    feeds: PendingFeeds,
    backups: BackupManager,
    reports: ReportWriter,
    auditor: ConsistencyAuditor,
}

impl Reconciler {
    pub fn new(settings: Settings, log: ActivityLog) -> Self {
        Self {
            feeds: PendingFeeds::new(settings.pending_feeds_dir(), log.clone()),
            backups: BackupManager::new(settings.backups_dir(), log.clone()),
            reports: ReportWriter::new(settings.reports_dir(), log.clone()),
            auditor: ConsistencyAuditor::new(log.clone()),
            settings,
            log,
        }
    }

    /// Reconciler with its operational log at the configured location
    pub fn from_settings(settings: Settings) -> Self {
        let log = ActivityLog::new(settings.log_file());
        Self::new(settings, log)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn feeds(&self) -> &PendingFeeds {
        &self.feeds
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    fn tally(&self, files: &[String]) -> Result<FeedTally> {
        let tally = parse_feeds(&self.settings.pending_feeds_dir(), files, &self.log);
        if tally.is_empty() {
            self.log.error("No valid data found in selected files.");
            return Err(ReconcileError::NoValidData);
        }
        Ok(tally)
    }

    /// Diff the feeds against the store and write the preview report
    pub fn preview(&self, conn: &Connection, request: &RunRequest) -> Result<PreviewOutcome> {
        let tally = self.tally(&request.files)?;
        let plan = compute_changes(conn, &tally, request.scope, request.include_zeroing)?;
        let report = self.reports.write_preview(&plan)?;
        self.log
            .info(format!("Preview for {}: {}", request.scope, plan.summary()));
        Ok(PreviewOutcome { plan, report })
    }

    /// Apply the feeds to the store behind a fresh backup
    ///
    /// The plan is always recomputed against the live store; a previous
    /// preview is never reused.
    pub fn process_inventory(
        &self,
        conn: &mut Connection,
        request: &RunRequest,
    ) -> Result<ApplyOutcome> {
        let tally = self.tally(&request.files)?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let backup = match self.backups.create_backup(&tx) {
            Ok(info) => info,
            Err(e) => {
                self.log
                    .critical("Failed to create backup. Inventory execution aborted.");
                return Err(e);
            }
        };

        let plan = compute_changes(&tx, &tally, request.scope, request.include_zeroing)?;
        if let Err(e) = apply_plan(&tx, &plan, request.scope) {
            self.log.error(format!(
                "Stock update failed, all changes rolled back: {}",
                e
            ));
            return Err(e.into());
        }
        tx.commit()?;
        self.log
            .info(format!("Stock update finished. {}", plan.summary()));

        let audit = self
            .auditor
            .run_checks(conn, request.location_id, false)?;
        let reports = self.reports.write_run_reports(&plan, &audit)?;

        Ok(ApplyOutcome {
            backup,
            plan,
            audit,
            reports,
        })
    }

    /// Run the consistency checks for a location
    pub fn run_audit(
        &self,
        conn: &mut Connection,
        location_id: LocationId,
        auto_fix: bool,
    ) -> Result<AuditResult> {
        self.auditor.run_checks(conn, location_id, auto_fix)
    }

    /// Run the checks with auto-fix, returning the number of fixes applied
    pub fn apply_consistency_fixes(
        &self,
        conn: &mut Connection,
        location_id: LocationId,
    ) -> Result<usize> {
        let result = self.auditor.run_checks(conn, location_id, true)?;
        Ok(result.fixes_applied())
    }
}

/// Write a change plan: updates, parent re-derivation, zeroes, then deactivations
fn apply_plan(conn: &Connection, plan: &ChangePlan, scope: Scope) -> store::DbResult<()> {
    let mut touched: BTreeSet<ProductId> = BTreeSet::new();
    for change in &plan.updated {
        store::write_stock(
            conn,
            change.product_id,
            change.variant_id,
            scope,
            change.new_quantity,
            change.new_physical,
            change.reserved,
        )?;
        touched.insert(change.product_id);
    }

    for product_id in &touched {
        store::rederive_parent(conn, *product_id, scope)?;
    }

    // Zeroed entries target the record they were read from
    for change in &plan.zeroed {
        let target = change.location_id.map(Scope::Single).unwrap_or(scope);
        store::write_stock(
            conn,
            change.product_id,
            change.variant_id,
            target,
            change.new_quantity,
            0,
            change.reserved,
        )?;
    }

    for product in &plan.disabled {
        store::set_product_inactive(conn, product.product_id, scope)?;
    }

    log::debug!(
        "Applied plan: {} writes, {} parents re-derived, {} products disabled",
        plan.updated.len() + plan.zeroed.len(),
        touched.len(),
        plan.disabled.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StockLevel;
    use crate::store::fixtures::*;
    use tempfile::TempDir;

    fn setup(tmp: &TempDir) -> Reconciler {
        let settings = Settings::in_dir(tmp.path());
        settings.ensure_dirs().unwrap();
        Reconciler::from_settings(settings)
    }

    fn write_feed(rec: &Reconciler, name: &str, body: &str) {
        std::fs::write(rec.settings().pending_feeds_dir().join(name), body).unwrap();
    }

    #[test]
    fn apply_without_valid_lines_creates_no_backup() {
        let tmp = TempDir::new().unwrap();
        let rec = setup(&tmp);
        let mut conn = test_db();
        write_feed(&rec, "junk.txt", "EAN;QTY\n");

        let request = RunRequest::single(vec!["junk.txt".to_string()], 1, false);
        let err = rec.process_inventory(&mut conn, &request).unwrap_err();
        assert!(matches!(err, ReconcileError::NoValidData));
        assert!(!rec.backups().has_backups().unwrap());
    }

    #[test]
    fn apply_aborts_when_backup_fails() {
        let tmp = TempDir::new().unwrap();
        let rec = setup(&tmp);
        // Nothing to dump: the backup is rejected as too small
        let mut conn = Connection::open_in_memory().unwrap();
        write_feed(&rec, "a.txt", "111;\n");

        let request = RunRequest::single(vec!["a.txt".to_string()], 1, false);
        let err = rec.process_inventory(&mut conn, &request).unwrap_err();
        assert!(matches!(err, ReconcileError::BackupFailed(_)));

        let logged = rec.log().tail(10).unwrap().join("\n");
        assert!(logged.contains("[CRITICAL]"));
        assert!(logged.contains("Inventory execution aborted."));
    }

    #[test]
    fn apply_writes_zeroes_and_disables() {
        let tmp = TempDir::new().unwrap();
        let rec = setup(&tmp);
        let mut conn = test_db();
        add_product(&conn, 1, "111", "Seen");
        add_shop_row(&conn, 1, 1, true);
        add_stock(&conn, 1, 0, 1, 1, 1, 0);
        add_product(&conn, 2, "222", "Gone");
        add_shop_row(&conn, 2, 1, true);
        add_stock(&conn, 2, 0, 1, 4, 4, 0);
        write_feed(&rec, "a.txt", "111;\n111;\n111;\n");

        let request = RunRequest::single(vec!["a.txt".to_string()], 1, true);
        let outcome = rec.process_inventory(&mut conn, &request).unwrap();

        assert_eq!(outcome.plan.summary(), "Updates: 1, Zeroed: 1, Disabled: 1, Unknown: 0");
        assert_eq!(level_of(&conn, 1, 0, 1), StockLevel::new(3, 3, 0));
        assert_eq!(level_of(&conn, 2, 0, 1), StockLevel::new(0, 0, 0));
        assert!(!is_active(&conn, 2));
        assert!(!is_active_in_shop(&conn, 2, 1));
        assert!(is_active(&conn, 1));
        assert!(outcome.audit.is_clean(), "{:?}", outcome.audit.inconsistencies);
        assert!(outcome.reports.inconsistencies.is_none());
    }

    #[test]
    fn apply_all_locations_updates_every_record() {
        let tmp = TempDir::new().unwrap();
        let rec = setup(&tmp);
        let mut conn = test_db();
        add_product(&conn, 1, "111", "Shirt");
        add_stock(&conn, 1, 0, 1, 1, 1, 0);
        add_stock(&conn, 1, 0, 2, 8, 8, 0);
        write_feed(&rec, "a.txt", "111;\n111;\n");

        let request = RunRequest {
            files: vec!["a.txt".to_string()],
            scope: Scope::AllLocations,
            location_id: 1,
            include_zeroing: false,
        };
        rec.process_inventory(&mut conn, &request).unwrap();
        assert_eq!(level_of(&conn, 1, 0, 1), StockLevel::new(2, 2, 0));
        assert_eq!(level_of(&conn, 1, 0, 2), StockLevel::new(2, 2, 0));
    }

    #[test]
    fn apply_all_locations_zeroes_each_record_with_its_own_reserved() {
        let tmp = TempDir::new().unwrap();
        let rec = setup(&tmp);
        let mut conn = test_db();
        add_product(&conn, 1, "111", "Seen");
        add_stock(&conn, 1, 0, 1, 1, 1, 0);
        add_product(&conn, 2, "", "Gone");
        add_shop_row(&conn, 2, 1, true);
        add_shop_row(&conn, 2, 2, true);
        add_stock(&conn, 2, 0, 1, 4, 4, 0);
        add_stock(&conn, 2, 0, 2, 5, 8, 3);
        write_feed(&rec, "a.txt", "111;\n");

        let request = RunRequest {
            files: vec!["a.txt".to_string()],
            scope: Scope::AllLocations,
            location_id: 1,
            include_zeroing: true,
        };
        let outcome = rec.process_inventory(&mut conn, &request).unwrap();

        assert_eq!(outcome.plan.disabled.len(), 1);
        assert_eq!(level_of(&conn, 2, 0, 1), StockLevel::new(0, 0, 0));
        assert_eq!(level_of(&conn, 2, 0, 2), StockLevel::new(-3, 0, 3));
        assert!(!is_active_in_shop(&conn, 2, 1));
        assert!(!is_active_in_shop(&conn, 2, 2));
        assert!(outcome.audit.is_clean(), "{:?}", outcome.audit.inconsistencies);

        let other = rec.run_audit(&mut conn, 2, false).unwrap();
        assert!(other
            .inconsistencies
            .iter()
            .all(|i| i.kind != crate::models::InconsistencyKind::EquationMismatch));
    }

    #[test]
    fn post_apply_audit_reports_negative_quantity_from_reservations() {
        let tmp = TempDir::new().unwrap();
        let rec = setup(&tmp);
        let mut conn = test_db();
        add_product(&conn, 1, "111", "Mug");
        add_stock(&conn, 1, 0, 1, 2, 5, 3);
        write_feed(&rec, "a.txt", "111;\n");

        let request = RunRequest::single(vec!["a.txt".to_string()], 1, false);
        let outcome = rec.process_inventory(&mut conn, &request).unwrap();
        assert_eq!(level_of(&conn, 1, 0, 1), StockLevel::new(-2, 1, 3));
        assert!(outcome.audit.critical_errors);
        assert!(outcome.reports.inconsistencies.is_some());

        assert_eq!(rec.apply_consistency_fixes(&mut conn, 1).unwrap(), 2);
        assert!(rec.run_audit(&mut conn, 1, false).unwrap().is_clean());
    }

    #[test]
    fn preview_leaves_store_untouched() {
        let tmp = TempDir::new().unwrap();
        let rec = setup(&tmp);
        let conn = test_db();
        add_product(&conn, 1, "111", "Shirt");
        add_stock(&conn, 1, 0, 1, 9, 9, 0);
        write_feed(&rec, "a.txt", "111;\n");

        let request = RunRequest::single(vec!["a.txt".to_string()], 1, true);
        let outcome = rec.preview(&conn, &request).unwrap();
        assert_eq!(outcome.plan.updated[0].new_quantity, 1);
        assert!(outcome.report.exists());
        assert_eq!(level_of(&conn, 1, 0, 1), StockLevel::new(9, 9, 0));
        assert!(!rec.backups().has_backups().unwrap());
    }
}
