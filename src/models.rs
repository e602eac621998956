//! Domain types shared by the reconciliation components

use serde::Serialize;
use std::fmt;

pub type ProductId = i64;
/// Variant (combination) id; 0 is the parent/aggregate record of a product
pub type VariantId = i64;
/// Shop/location id
pub type LocationId = i64;

/// Variant id of the parent/aggregate stock record
pub const PARENT_VARIANT: VariantId = 0;

/// Which stock records a read or write touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "scope", content = "location_id")]
pub enum Scope {
    /// Only records of one location
    Single(LocationId),
    /// Every location holding a record for the product
    AllLocations,
}

impl Scope {
    /// Location predicate to apply, `None` for all locations
    pub fn location(&self) -> Option<LocationId> {
        match self {
            Scope::Single(id) => Some(*id),
            Scope::AllLocations => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Single(id) => write!(f, "location {}", id),
            Scope::AllLocations => write!(f, "all locations"),
        }
    }
}

/// Quantities of one stock record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    /// Sellable quantity, `physical - reserved`
    pub quantity: i64,
    pub physical: i64,
    pub reserved: i64,
}

impl StockLevel {
    pub fn new(quantity: i64, physical: i64, reserved: i64) -> Self {
        Self {
            quantity,
            physical,
            reserved,
        }
    }

    /// `quantity == physical - reserved`
    pub fn is_balanced(&self) -> bool {
        self.quantity == self.physical - self.reserved
    }
}

/// One row of the stock table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockRecord {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub location_id: LocationId,
    pub level: StockLevel,
}

/// Product/variant a barcode resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductMatch {
    pub product_id: ProductId,
    pub variant_id: VariantId,
}

/// A planned write to one stock record (Updated or Zeroed)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockChange {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    /// Location of the record this change was derived from; `None` when the
    /// change applies to every location holding the product/variant
    pub location_id: Option<LocationId>,
    /// Feed barcode; empty for zeroed records
    pub barcode: String,
    pub name: String,
    pub old_quantity: i64,
    pub new_physical: i64,
    pub new_quantity: i64,
    pub reserved: i64,
}

/// Product to deactivate because its parent record drops to zero
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisabledProduct {
    pub product_id: ProductId,
    pub name: String,
}

/// Kind of a classified reconciliation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Updated,
    Zeroed,
    Disabled,
    Unknown,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 4] = [
        ChangeKind::Updated,
        ChangeKind::Zeroed,
        ChangeKind::Disabled,
        ChangeKind::Unknown,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Updated => "Updates",
            ChangeKind::Zeroed => "Zeroed",
            ChangeKind::Disabled => "Disabled",
            ChangeKind::Unknown => "Unknown",
        }
    }
}

/// Classified outcome of diffing feeds against the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangePlan {
    pub updated: Vec<StockChange>,
    pub zeroed: Vec<StockChange>,
    pub disabled: Vec<DisabledProduct>,
    /// Barcodes with no matching product, one per distinct barcode
    pub unknown: Vec<String>,
}

impl ChangePlan {
    pub fn count(&self, kind: ChangeKind) -> usize {
        match kind {
            ChangeKind::Updated => self.updated.len(),
            ChangeKind::Zeroed => self.zeroed.len(),
            ChangeKind::Disabled => self.disabled.len(),
            ChangeKind::Unknown => self.unknown.len(),
        }
    }

    /// `Updates: n, Zeroed: n, Disabled: n, Unknown: n`
    pub fn summary(&self) -> String {
        ChangeKind::ALL
            .iter()
            .map(|kind| format!("{}: {}", kind.label(), self.count(*kind)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Structural invariant violated by a stock record or product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InconsistencyKind {
    SumMismatch,
    NegativeStock,
    EquationMismatch,
    ActiveNoStock,
    DuplicateIdentifier,
}

impl InconsistencyKind {
    /// Label used in reports
    pub fn label(&self) -> &'static str {
        match self {
            InconsistencyKind::SumMismatch => "Sum Mismatch",
            InconsistencyKind::NegativeStock => "Negative Stock",
            InconsistencyKind::EquationMismatch => "Equation Mismatch",
            InconsistencyKind::ActiveNoStock => "Active but No Stock",
            InconsistencyKind::DuplicateIdentifier => "Duplicate EAN in DB",
        }
    }

    /// Whether the auditor knows how to repair this kind
    pub fn is_fixable(&self) -> bool {
        !matches!(self, InconsistencyKind::DuplicateIdentifier)
    }

    /// Unfixed occurrences of these kinds make a run critical
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            InconsistencyKind::NegativeStock | InconsistencyKind::EquationMismatch
        )
    }
}

impl fmt::Display for InconsistencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One finding of the consistency auditor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inconsistency {
    pub kind: InconsistencyKind,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    /// State before, e.g. `Q:5, PQ:3`
    pub before: String,
    /// Suggested correction, or the applied one when `fixed`
    pub corrected: String,
    pub fixed: bool,
}

/// Outcome of one auditor run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditResult {
    pub inconsistencies: Vec<Inconsistency>,
    /// Human-readable description of each applied fix
    pub fixes: Vec<String>,
    /// True iff NegativeStock or EquationMismatch findings remain unfixed
    pub critical_errors: bool,
}

impl AuditResult {
    pub fn fixes_applied(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_clean(&self) -> bool {
        self.inconsistencies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_location_predicate() {
        assert_eq!(Scope::Single(3).location(), Some(3));
        assert_eq!(Scope::AllLocations.location(), None);
    }

    #[test]
    fn stock_level_balance() {
        assert!(StockLevel::new(3, 5, 2).is_balanced());
        assert!(StockLevel::new(-2, 0, 2).is_balanced());
        assert!(!StockLevel::new(5, 5, 2).is_balanced());
    }

    #[test]
    fn plan_summary_counts_buckets() {
        let plan = ChangePlan {
            unknown: vec!["111".to_string(), "222".to_string()],
            ..Default::default()
        };
        assert_eq!(plan.count(ChangeKind::Unknown), 2);
        assert_eq!(
            plan.summary(),
            "Updates: 0, Zeroed: 0, Disabled: 0, Unknown: 2"
        );
    }

    #[test]
    fn duplicate_identifier_is_report_only() {
        assert!(!InconsistencyKind::DuplicateIdentifier.is_fixable());
        assert!(InconsistencyKind::SumMismatch.is_fixable());
        assert!(InconsistencyKind::NegativeStock.is_critical());
        assert!(!InconsistencyKind::ActiveNoStock.is_critical());
    }
}
