//! CSV reports of preview and apply runs

use csv::WriterBuilder;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::activity_log::ActivityLog;
use crate::error::Result;
use crate::models::{AuditResult, ChangePlan};
use crate::utils::file_timestamp;

/// Files written for one apply run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSet {
    pub inventory_log: PathBuf,
    pub zeroed_disabled: PathBuf,
    pub unknown_barcodes: PathBuf,
    /// Only written when the audit found something
    pub inconsistencies: Option<PathBuf>,
}

impl ReportSet {
    pub fn files(&self) -> Vec<&Path> {
        let mut files = vec![
            self.inventory_log.as_path(),
            self.zeroed_disabled.as_path(),
            self.unknown_barcodes.as_path(),
        ];
        if let Some(path) = &self.inconsistencies {
            files.push(path.as_path());
        }
        files
    }
}

/// Writes timestamped report files into one directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
    log: ActivityLog,
}

fn write_csv<I, R>(path: &Path, header: &[&str], rows: I) -> Result<()>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator,
    R::Item: AsRef<[u8]>,
{
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>, log: ActivityLog) -> Self {
        Self {
            dir: dir.into(),
            log,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reports of an applied plan and its post-apply audit
    pub fn write_run_reports(&self, plan: &ChangePlan, audit: &AuditResult) -> Result<ReportSet> {
        std::fs::create_dir_all(&self.dir)?;
        let ts = file_timestamp();

        let inventory_log = self.dir.join(format!("inventory_log_{}.csv", ts));
        write_csv(
            &inventory_log,
            &["EAN", "Product Name", "Quantity Before", "Quantity After"],
            plan.updated.iter().map(|c| {
                [
                    c.barcode.clone(),
                    c.name.clone(),
                    c.old_quantity.to_string(),
                    c.new_physical.to_string(),
                ]
            }),
        )?;

        let zeroed_disabled = self.dir.join(format!("zeroed_disabled_{}.csv", ts));
        let zeroed = plan
            .zeroed
            .iter()
            .map(|c| [c.product_id.to_string(), c.name.clone(), "Set to 0".to_string()]);
        let disabled = plan
            .disabled
            .iter()
            .map(|d| [d.product_id.to_string(), d.name.clone(), "Disabled".to_string()]);
        write_csv(
            &zeroed_disabled,
            &["ID Product", "Product Name", "Status"],
            zeroed.chain(disabled),
        )?;

        let unknown_barcodes = self.dir.join(format!("unknown_eans_{}.csv", ts));
        write_csv(
            &unknown_barcodes,
            &["EAN"],
            plan.unknown.iter().map(|ean| [ean.as_str()]),
        )?;

        let inconsistencies = if audit.inconsistencies.is_empty() {
            None
        } else {
            let path = self.dir.join(format!("inconsistencies_{}.csv", ts));
            write_csv(
                &path,
                &["Type", "ID Product", "ID Attr", "Before", "Corrected"],
                audit.inconsistencies.iter().map(|i| {
                    [
                        i.kind.label().to_string(),
                        i.product_id.to_string(),
                        i.variant_id.to_string(),
                        i.before.clone(),
                        i.corrected.clone(),
                    ]
                }),
            )?;
            Some(path)
        };

        let set = ReportSet {
            inventory_log,
            zeroed_disabled,
            unknown_barcodes,
            inconsistencies,
        };
        let names: Vec<String> = set.files().into_iter().map(file_name).collect();
        self.log
            .info(format!("Reports generated: {}", names.join(", ")));
        Ok(set)
    }

    /// `preview_<ts>.csv` with one row per planned change
    pub fn write_preview(&self, plan: &ChangePlan) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("preview_{}.csv", file_timestamp()));

        let updates = plan.updated.iter().map(|c| {
            [
                "UPDATE".to_string(),
                c.barcode.clone(),
                c.product_id.to_string(),
                c.variant_id.to_string(),
                c.name.clone(),
                c.old_quantity.to_string(),
                c.new_quantity.to_string(),
            ]
        });
        let zeroes = plan.zeroed.iter().map(|c| {
            [
                "ZERO".to_string(),
                String::new(),
                c.product_id.to_string(),
                c.variant_id.to_string(),
                c.name.clone(),
                c.old_quantity.to_string(),
                "0".to_string(),
            ]
        });
        let unknown = plan.unknown.iter().map(|ean| {
            [
                "UNKNOWN".to_string(),
                ean.clone(),
                String::new(),
                String::new(),
                "N/A".to_string(),
                "-".to_string(),
                "-".to_string(),
            ]
        });

        write_csv(
            &path,
            &[
                "Type",
                "EAN",
                "ID Product",
                "ID Attr",
                "Name",
                "Current Qty",
                "New Qty",
            ],
            updates.chain(zeroes).chain(unknown),
        )?;
        self.log
            .info(format!("Preview report generated: {}", file_name(&path)));
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DisabledProduct, Inconsistency, InconsistencyKind, StockChange};
    use tempfile::TempDir;

    fn writer(tmp: &TempDir) -> ReportWriter {
        ReportWriter::new(
            tmp.path().join("reports"),
            ActivityLog::new(tmp.path().join("ops.log")),
        )
    }

    fn sample_plan() -> ChangePlan {
        ChangePlan {
            updated: vec![StockChange {
                product_id: 1,
                variant_id: 10,
                location_id: Some(1),
                barcode: "1234567890123".to_string(),
                name: "Shirt, \"Blue\" - M".to_string(),
                old_quantity: 5,
                new_physical: 2,
                new_quantity: 1,
                reserved: 1,
            }],
            zeroed: vec![StockChange {
                product_id: 2,
                variant_id: 0,
                location_id: Some(1),
                barcode: String::new(),
                name: "Mug".to_string(),
                old_quantity: 4,
                new_physical: 0,
                new_quantity: 0,
                reserved: 0,
            }],
            disabled: vec![DisabledProduct {
                product_id: 2,
                name: "Mug".to_string(),
            }],
            unknown: vec!["9999999999999".to_string()],
        }
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        rdr.records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn run_reports_without_findings_skip_inconsistencies() {
        let tmp = TempDir::new().unwrap();
        let set = writer(&tmp)
            .write_run_reports(&sample_plan(), &AuditResult::default())
            .unwrap();
        assert!(set.inconsistencies.is_none());
        assert_eq!(set.files().len(), 3);

        let log = read_rows(&set.inventory_log);
        assert_eq!(
            log[0],
            vec!["EAN", "Product Name", "Quantity Before", "Quantity After"]
        );
        assert_eq!(
            log[1],
            vec!["1234567890123", "Shirt, \"Blue\" - M", "5", "2"]
        );

        let zeroed = read_rows(&set.zeroed_disabled);
        assert_eq!(zeroed[1], vec!["2", "Mug", "Set to 0"]);
        assert_eq!(zeroed[2], vec!["2", "Mug", "Disabled"]);

        let unknown = read_rows(&set.unknown_barcodes);
        assert_eq!(unknown, vec![vec!["EAN"], vec!["9999999999999"]]);
    }

    #[test]
    fn inconsistencies_report_written_when_present() {
        let tmp = TempDir::new().unwrap();
        let audit = AuditResult {
            inconsistencies: vec![Inconsistency {
                kind: InconsistencyKind::NegativeStock,
                product_id: 7,
                variant_id: 3,
                before: "Q:-1, PQ:-1".to_string(),
                corrected: "Set to 0".to_string(),
                fixed: false,
            }],
            fixes: Vec::new(),
            critical_errors: true,
        };
        let set = writer(&tmp)
            .write_run_reports(&ChangePlan::default(), &audit)
            .unwrap();
        let rows = read_rows(set.inconsistencies.as_ref().unwrap());
        assert_eq!(
            rows[1],
            vec!["Negative Stock", "7", "3", "Q:-1, PQ:-1", "Set to 0"]
        );

        let logged = ActivityLog::new(tmp.path().join("ops.log"))
            .tail(5)
            .unwrap()
            .join("\n");
        assert!(logged.contains("Reports generated: inventory_log_"));
        assert!(logged.contains("inconsistencies_"));
    }

    #[test]
    fn preview_lists_every_bucket() {
        let tmp = TempDir::new().unwrap();
        let path = writer(&tmp).write_preview(&sample_plan()).unwrap();
        assert!(file_name(&path).starts_with("preview_"));

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[1],
            vec!["UPDATE", "1234567890123", "1", "10", "Shirt, \"Blue\" - M", "5", "1"]
        );
        assert_eq!(rows[2], vec!["ZERO", "", "2", "0", "Mug", "4", "0"]);
        assert_eq!(
            rows[3],
            vec!["UNKNOWN", "9999999999999", "", "", "N/A", "-", "-"]
        );
    }
}
