//! Diff engine: classify feed tallies against the stock store.
//!
//! Read-only. Produces a [`ChangePlan`] with four buckets:
//! - updated: barcode matched; physical = tally, quantity = tally - reserved
//! - unknown: barcode matched no product
//! - zeroed: (optional) records of products absent from the feeds
//! - disabled: zeroed parent records left without sellable stock

use rusqlite::Connection;
use std::collections::HashSet;

use crate::error::{ReconcileError, Result};
use crate::models::{
    ChangePlan, DisabledProduct, ProductId, Scope, StockChange, PARENT_VARIANT,
};
use crate::parser::FeedTally;
use crate::store;

/// Compute the change plan for `tally` against the current store state
///
/// Fails with [`ReconcileError::NoValidData`] when the tally is empty; every
/// other per-barcode problem ends up in the plan instead of failing.
/// `newQuantity` may go negative; clamping is the auditor's business.
pub fn compute_changes(
    conn: &Connection,
    tally: &FeedTally,
    scope: Scope,
    include_zeroing: bool,
) -> Result<ChangePlan> {
    if tally.is_empty() {
        return Err(ReconcileError::NoValidData);
    }

    let mut plan = ChangePlan::default();
    let mut touched: HashSet<ProductId> = HashSet::new();

    // Phase 1: barcodes present in the feeds
    for (barcode, count) in tally.iter() {
        let Some(hit) = store::find_by_barcode(conn, barcode)? else {
            plan.unknown.push(barcode.to_string());
            continue;
        };
        touched.insert(hit.product_id);

        let current = store::current_stock(conn, hit.product_id, hit.variant_id, scope)?;
        let old_quantity = current.map(|c| c.quantity).unwrap_or(0);
        let reserved = current.map(|c| c.reserved).unwrap_or(0);

        plan.updated.push(StockChange {
            product_id: hit.product_id,
            variant_id: hit.variant_id,
            location_id: scope.location(),
            barcode: barcode.to_string(),
            name: store::product_name(conn, hit.product_id, hit.variant_id)?,
            old_quantity,
            new_physical: count,
            new_quantity: count - reserved,
            reserved,
        });
    }

    // Phase 2: everything the feeds did not mention goes to zero.
    // Each record is zeroed at its own location; a product is disabled once.
    if include_zeroing {
        let mut disabled: HashSet<ProductId> = HashSet::new();
        for record in store::records_in_scope(conn, scope)? {
            if touched.contains(&record.product_id) {
                continue;
            }
            let new_quantity = -record.level.reserved;
            if record.level.quantity == new_quantity && record.level.physical == 0 {
                continue;
            }

            let name = store::product_name(conn, record.product_id, record.variant_id)?;
            if record.variant_id == PARENT_VARIANT
                && new_quantity <= 0
                && disabled.insert(record.product_id)
            {
                plan.disabled.push(DisabledProduct {
                    product_id: record.product_id,
                    name: name.clone(),
                });
            }
            plan.zeroed.push(StockChange {
                product_id: record.product_id,
                variant_id: record.variant_id,
                location_id: Some(record.location_id),
                barcode: String::new(),
                name,
                old_quantity: record.level.quantity,
                new_physical: 0,
                new_quantity,
                reserved: record.level.reserved,
            });
        }
    }

    log::debug!("Computed change plan for {}: {}", scope, plan.summary());
    Ok(plan)
}
