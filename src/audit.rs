//! Consistency auditor
//!
//! Five checks run in a fixed order on one location:
//! 1. sum mismatch between a parent record and its variants
//! 2. negative stock
//! 3. `quantity != physical - reserved`
//! 4. active products whose parent record has no sellable stock
//! 5. variant barcodes shared by several variants (report only)
//!
//! With auto-fix every check repairs what it reports before the next check
//! reads the store, and records touched by checks 2 and 3 get their parent
//! aggregate re-derived, so a second auto-fix run finds nothing left to fix.

use rusqlite::{Connection, TransactionBehavior};
use std::collections::BTreeSet;

use crate::activity_log::ActivityLog;
use crate::error::Result;
use crate::models::{
    AuditResult, Inconsistency, InconsistencyKind, LocationId, ProductId, Scope, StockLevel,
    PARENT_VARIANT,
};
use crate::store;

/// Scans the stock store for invariant violations and optionally repairs them
#[derive(Debug, Clone)]
pub struct ConsistencyAuditor {
    log: ActivityLog,
}

impl ConsistencyAuditor {
    pub fn new(log: ActivityLog) -> Self {
        Self { log }
    }

    /// Run all checks for `location_id`
    ///
    /// Report-only runs never write. Auto-fix runs hold an immediate
    /// transaction for the whole audit and commit once at the end.
    pub fn run_checks(
        &self,
        conn: &mut Connection,
        location_id: LocationId,
        auto_fix: bool,
    ) -> Result<AuditResult> {
        let result = if auto_fix {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let result = AuditRun::new(&tx, location_id, true).run()?;
            tx.commit()?;
            result
        } else {
            AuditRun::new(conn, location_id, false).run()?
        };

        let mode = if auto_fix { "fix" } else { "report" };
        self.log.info(format!(
            "Consistency check ({}) at location {}: {} inconsistencies, {} fixes applied.",
            mode,
            location_id,
            result.inconsistencies.len(),
            result.fixes_applied()
        ));
        if result.critical_errors {
            self.log.warn(format!(
                "Critical stock inconsistencies remain at location {}",
                location_id
            ));
        }
        Ok(result)
    }
}

struct AuditRun<'c> {
    conn: &'c Connection,
    location_id: LocationId,
    auto_fix: bool,
    result: AuditResult,
}

impl<'c> AuditRun<'c> {
    fn new(conn: &'c Connection, location_id: LocationId, auto_fix: bool) -> Self {
        Self {
            conn,
            location_id,
            auto_fix,
            result: AuditResult::default(),
        }
    }

    fn run(mut self) -> Result<AuditResult> {
        self.check_sums()?;
        self.check_negative_stock()?;
        self.check_equations()?;
        self.check_active_status()?;
        self.check_duplicate_barcodes()?;

        self.result.critical_errors = self
            .result
            .inconsistencies
            .iter()
            .any(|i| i.kind.is_critical() && !i.fixed);
        Ok(self.result)
    }

    /// Whether this run repairs findings of `kind`
    fn fixing(&self, kind: InconsistencyKind) -> bool {
        self.auto_fix && kind.is_fixable()
    }

    fn push(&mut self, mut finding: Inconsistency, fix: Option<String>) {
        if let Some(description) = fix {
            finding.fixed = true;
            self.result.fixes.push(description);
        }
        self.result.inconsistencies.push(finding);
    }

    /// Re-derive the parent records of products whose records were just repaired
    fn rederive(&self, products: &BTreeSet<ProductId>) -> Result<()> {
        for product_id in products {
            store::rederive_parent(self.conn, *product_id, Scope::Single(self.location_id))?;
        }
        Ok(())
    }

    fn check_sums(&mut self) -> Result<()> {
        let loc = self.location_id;
        for product_id in store::products_with_variants(self.conn)? {
            let Some((_, sums)) = store::variant_sums(self.conn, product_id, Scope::Single(loc))?
                .into_iter()
                .next()
            else {
                continue;
            };
            let Some(parent) = store::parent_record(self.conn, product_id, loc)? else {
                continue;
            };
            if parent.quantity == sums.quantity && parent.physical == sums.physical {
                continue;
            }

            let fix = if self.fixing(InconsistencyKind::SumMismatch) {
                store::set_level(self.conn, product_id, PARENT_VARIANT, loc, sums)?;
                Some(format!("Fixed sum for Product ID {}", product_id))
            } else {
                None
            };
            self.push(
                Inconsistency {
                    kind: InconsistencyKind::SumMismatch,
                    product_id,
                    variant_id: PARENT_VARIANT,
                    before: format!("Q:{}, PQ:{}", parent.quantity, parent.physical),
                    corrected: format!("Q:{}, PQ:{}", sums.quantity, sums.physical),
                    fixed: false,
                },
                fix,
            );
        }
        Ok(())
    }

    fn check_negative_stock(&mut self) -> Result<()> {
        let mut repaired = BTreeSet::new();
        for record in store::negative_records(self.conn, self.location_id)? {
            let fix = if self.fixing(InconsistencyKind::NegativeStock) {
                let zeroed = StockLevel::new(0, 0, record.level.reserved);
                store::set_level(
                    self.conn,
                    record.product_id,
                    record.variant_id,
                    record.location_id,
                    zeroed,
                )?;
                repaired.insert(record.product_id);
                Some(format!(
                    "Fixed negative stock for Product ID {}",
                    record.product_id
                ))
            } else {
                None
            };
            self.push(
                Inconsistency {
                    kind: InconsistencyKind::NegativeStock,
                    product_id: record.product_id,
                    variant_id: record.variant_id,
                    before: format!("Q:{}, PQ:{}", record.level.quantity, record.level.physical),
                    corrected: "Set to 0".to_string(),
                    fixed: false,
                },
                fix,
            );
        }
        self.rederive(&repaired)
    }

    fn check_equations(&mut self) -> Result<()> {
        let mut repaired = BTreeSet::new();
        for record in store::unbalanced_records(self.conn, self.location_id)? {
            let level = record.level;
            // Reserved beyond physical cannot balance with a non-negative quantity
            let target = if level.physical >= level.reserved {
                StockLevel::new(level.physical - level.reserved, level.physical, level.reserved)
            } else {
                StockLevel::new(0, level.physical, level.physical)
            };
            let corrected = if target.reserved == level.reserved {
                format!("Q:{}", target.quantity)
            } else {
                format!("Q:{}, R:{}", target.quantity, target.reserved)
            };

            let fix = if self.fixing(InconsistencyKind::EquationMismatch) {
                store::set_level(
                    self.conn,
                    record.product_id,
                    record.variant_id,
                    record.location_id,
                    target,
                )?;
                repaired.insert(record.product_id);
                Some(format!("Fixed equation for Product ID {}", record.product_id))
            } else {
                None
            };
            self.push(
                Inconsistency {
                    kind: InconsistencyKind::EquationMismatch,
                    product_id: record.product_id,
                    variant_id: record.variant_id,
                    before: format!(
                        "Q:{} != PQ:{} - R:{}",
                        level.quantity, level.physical, level.reserved
                    ),
                    corrected,
                    fixed: false,
                },
                fix,
            );
        }
        self.rederive(&repaired)
    }

    fn check_active_status(&mut self) -> Result<()> {
        let loc = self.location_id;
        for (product_id, _quantity) in store::active_without_stock(self.conn, loc)? {
            let fix = if self.fixing(InconsistencyKind::ActiveNoStock) {
                store::set_product_inactive(self.conn, product_id, Scope::Single(loc))?;
                Some(format!(
                    "Disabled Product ID {} due to zero stock",
                    product_id
                ))
            } else {
                None
            };
            self.push(
                Inconsistency {
                    kind: InconsistencyKind::ActiveNoStock,
                    product_id,
                    variant_id: PARENT_VARIANT,
                    before: "Active: 1".to_string(),
                    corrected: "Active: 0".to_string(),
                    fixed: false,
                },
                fix,
            );
        }
        Ok(())
    }

    fn check_duplicate_barcodes(&mut self) -> Result<()> {
        for (barcode, _count) in store::duplicate_barcodes(self.conn)? {
            self.push(
                Inconsistency {
                    kind: InconsistencyKind::DuplicateIdentifier,
                    product_id: 0,
                    variant_id: 0,
                    before: format!("EAN: {}", barcode),
                    corrected: "None (Manual Fix Required)".to_string(),
                    fixed: false,
                },
                None,
            );
        }
        Ok(())
    }
}
