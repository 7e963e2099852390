//! # Inventory Adjustment Engine
//!
//! Pure computation: cart lines + unit groups → per-product signed deltas.
//!
//! ## Delta Propagation Across a Unit Group
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Sell 2 "Piece" (conversion 0.1) from a Box/Piece group:               │
//! │                                                                         │
//! │  master_qty = 2 × 0.1 = 0.2        (quantity in the base unit)         │
//! │                                                                         │
//! │  Box   (conversion 1.0):  delta = 0.2 / 1.0 = 0.2  → on_hand 10 → 9.8 │
//! │  Piece (conversion 0.1):  delta = 0.2 / 0.1 = 2.0  → on_hand 100 → 98 │
//! │                                                                         │
//! │  Invariant: delta_v × conversion_v is the same for every variant v     │
//! │  (the physical stock effect is independent of which unit was sold).    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sign Convention
//! Deltas are signed at this layer: `Decrease` (a sale) produces negative
//! deltas, `Increase` (restock / compensation) positive ones. Everything
//! downstream applies them with plain addition.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grouping::UnitGroupIndex;
use crate::types::CartLine;

// =============================================================================
// Pending Delta
// =============================================================================

/// Transient map productId → signed quantity, each expressed in that
/// product's own unit. Lives for one adjustment computation and its
/// immediate application; never persisted.
pub type PendingDelta = BTreeMap<i64, f64>;

// =============================================================================
// Operation
// =============================================================================

/// Direction of a stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// A sale: on-hand goes down.
    Decrease,
    /// A restock or compensation: on-hand goes up.
    Increase,
}

impl Operation {
    /// Applies this operation's sign to a magnitude.
    #[inline]
    pub fn signed(&self, magnitude: f64) -> f64 {
        match self {
            Operation::Decrease => -magnitude,
            Operation::Increase => magnitude,
        }
    }

}

// =============================================================================
// Conversion Guard
// =============================================================================

/// Normalizes a conversion value for division.
///
/// Zero or non-finite conversion values would poison the delta math (divide
/// by zero, NaN propagation); they are treated as 1. This guard is
/// mandatory, not defensive garnish — catalogs in the wild contain both.
#[inline]
pub fn normalized_conversion(value: f64) -> f64 {
    if value.is_finite() && value != 0.0 {
        value
    } else {
        1.0
    }
}

// =============================================================================
// Delta Computation
// =============================================================================

/// Computes the signed per-product deltas for a set of cart lines.
///
/// For each line:
/// - resolve the group via the line product's key (`master_unit_id || id`)
/// - `master_qty = quantity × conversion(line.product)`
/// - no group ⇒ the RAW line quantity lands on the line's own product id
///   (degraded fallback: no cross-unit propagation)
/// - group ⇒ every variant v gets `master_qty / conversion(v)`
///
/// Deltas accumulate across lines: a cart may hold several lines of
/// unit-variants from the same group, all landing on the same product ids.
pub fn compute_deltas(
    lines: &[CartLine],
    index: &UnitGroupIndex,
    operation: Operation,
) -> PendingDelta {
    let mut deltas = PendingDelta::new();

    for line in lines {
        if !line.quantity.is_finite() || line.quantity == 0.0 {
            continue;
        }

        let master_qty = line.quantity * normalized_conversion(line.product.conversion_value);

        let Some(group) = index.group_for(&line.product) else {
            // Ungrouped product: raw quantity, own id only.
            let delta = operation.signed(line.quantity);
            *deltas.entry(line.product.id).or_insert(0.0) += delta;
            continue;
        };

        for variant in group {
            let conversion = normalized_conversion(variant.conversion_value);
            let delta = operation.signed(master_qty / conversion);
            if !delta.is_finite() {
                continue;
            }
            *deltas.entry(variant.id).or_insert(0.0) += delta;
        }
    }

    deltas
}

// =============================================================================
// Batch Row Construction
// =============================================================================

/// One row of the remote reconciliation batch.
///
/// Field names follow the remote contract verbatim; `minus`/`plus` split
/// the signed delta into the magnitudes the remote side expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRow {
    #[serde(rename = "productId")]
    pub product_id: i64,

    /// On-hand the client observed BEFORE applying the delta (from the
    /// pre-adjustment snapshot).
    #[serde(rename = "currentOnHand")]
    pub current_on_hand: f64,

    /// Signed adjustment.
    pub delta: f64,

    /// Magnitude when the delta is a decrease, else 0.
    pub minus: f64,

    /// Magnitude when the delta is an increase, else 0.
    pub plus: f64,

    /// `current_on_hand + delta`, the value the client optimistically wrote.
    #[serde(rename = "newOnHand")]
    pub new_on_hand: f64,
}

/// Builds the reconciliation batch rows from a delta map and the
/// pre-adjustment on-hand snapshot.
///
/// Products missing from the snapshot default to a current on-hand of 0,
/// matching the degraded behavior of the system of record.
pub fn build_stock_rows(deltas: &PendingDelta, snapshot: &BTreeMap<i64, f64>) -> Vec<StockRow> {
    deltas
        .iter()
        .map(|(&product_id, &delta)| {
            let current = snapshot.get(&product_id).copied().unwrap_or(0.0);
            StockRow {
                product_id,
                current_on_hand: current,
                delta,
                minus: if delta < 0.0 { delta.abs() } else { 0.0 },
                plus: if delta > 0.0 { delta } else { 0.0 },
                new_on_hand: current + delta,
            }
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Product;
    use chrono::{TimeZone, Utc};

    fn product(id: i64, master_unit_id: Option<i64>, conversion: f64, on_hand: f64) -> Product {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Product {
            id,
            code: format!("P{id}"),
            name: format!("Product {id}"),
            category_id: None,
            is_active: true,
            is_deleted: false,
            cost_cents: 0,
            base_price_cents: 0,
            on_hand,
            unit: String::new(),
            master_unit_id,
            master_product_id: Some(7),
            conversion_value: conversion,
            created_at: ts,
            modified_at: ts,
        }
    }

    fn line(product: Product, quantity: f64) -> CartLine {
        CartLine {
            product,
            quantity,
            unit_price_cents: 10_000,
            total_price_cents: (10_000.0 * quantity) as i64,
        }
    }

    fn box_piece_index() -> UnitGroupIndex {
        // The worked example: Box (conversion 1, on-hand 10) owns the stock,
        // Piece (conversion 0.1, on-hand 100) is its variant.
        UnitGroupIndex::build(&[
            product(1, None, 1.0, 10.0),
            product(2, Some(1), 0.1, 100.0),
        ])
    }

    #[test]
    fn test_selling_pieces_propagates_to_box() {
        let index = box_piece_index();
        let piece = product(2, Some(1), 0.1, 100.0);

        let deltas = compute_deltas(&[line(piece, 2.0)], &index, Operation::Decrease);

        // master_qty = 2 × 0.1 = 0.2
        assert!((deltas[&1] - (-0.2)).abs() < 1e-9); // Box: 10 → 9.8
        assert!((deltas[&2] - (-2.0)).abs() < 1e-9); // Piece: 100 → 98
    }

    #[test]
    fn test_delta_conservation_across_variants() {
        // P1: expressed in the base unit, the stock effect is invariant to
        // which variant was sold.
        let index = box_piece_index();

        for seller in [product(1, None, 1.0, 10.0), product(2, Some(1), 0.1, 100.0)] {
            let sold_master_qty = 3.0 * normalized_conversion(seller.conversion_value);
            let deltas = compute_deltas(&[line(seller, 3.0)], &index, Operation::Decrease);

            for (&id, &delta) in &deltas {
                let conversion = if id == 1 { 1.0 } else { 0.1 };
                assert!(
                    (delta * conversion - (-sold_master_qty)).abs() < 1e-9,
                    "variant {id} delta {delta} breaks conservation"
                );
            }
        }
    }

    #[test]
    fn test_decrease_then_increase_round_trips() {
        // P3: the same cart with the inverse operation cancels exactly.
        let index = box_piece_index();
        let cart = vec![
            line(product(2, Some(1), 0.1, 100.0), 2.0),
            line(product(1, None, 1.0, 10.0), 1.0),
        ];

        let down = compute_deltas(&cart, &index, Operation::Decrease);
        let up = compute_deltas(&cart, &index, Operation::Increase);

        for (id, delta) in &down {
            assert!((delta + up[id]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_ungrouped_line_falls_back_to_raw_quantity() {
        let index = UnitGroupIndex::build(&[]);
        let orphan = product(31, Some(99), 0.5, 4.0);

        let deltas = compute_deltas(&[line(orphan, 3.0)], &index, Operation::Decrease);

        // Raw quantity, no conversion, own id only.
        assert_eq!(deltas.len(), 1);
        assert!((deltas[&31] - (-3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_lines_from_same_group_accumulate() {
        let index = box_piece_index();
        let cart = vec![
            line(product(2, Some(1), 0.1, 100.0), 2.0), // -0.2 base
            line(product(1, None, 1.0, 10.0), 1.0),     // -1.0 base
        ];

        let deltas = compute_deltas(&cart, &index, Operation::Decrease);

        assert!((deltas[&1] - (-1.2)).abs() < 1e-9);
        assert!((deltas[&2] - (-12.0)).abs() < 1e-9);
    }

    #[test]
    fn test_conversion_guard() {
        assert_eq!(normalized_conversion(0.0), 1.0);
        assert_eq!(normalized_conversion(f64::NAN), 1.0);
        assert_eq!(normalized_conversion(f64::INFINITY), 1.0);
        assert_eq!(normalized_conversion(0.25), 0.25);
        assert_eq!(normalized_conversion(-2.0), -2.0);
    }

    #[test]
    fn test_zero_conversion_variant_treated_as_one() {
        let index = UnitGroupIndex::build(&[
            product(1, None, 1.0, 10.0),
            product(3, Some(1), 0.0, 50.0), // broken catalog row
        ]);

        let deltas = compute_deltas(
            &[line(product(1, None, 1.0, 10.0), 2.0)],
            &index,
            Operation::Decrease,
        );

        // The broken variant is adjusted as if conversion were 1, not skipped
        // into a crash.
        assert!((deltas[&3] - (-2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_quantity_lines_are_skipped() {
        let index = box_piece_index();
        let cart = vec![
            line(product(2, Some(1), 0.1, 100.0), 0.0),
            line(product(2, Some(1), 0.1, 100.0), f64::NAN),
        ];

        let deltas = compute_deltas(&cart, &index, Operation::Decrease);
        assert!(deltas.is_empty());
    }

    #[test]
    fn test_build_stock_rows() {
        let mut deltas = PendingDelta::new();
        deltas.insert(1, -0.2);
        deltas.insert(2, 2.0);

        let mut snapshot = BTreeMap::new();
        snapshot.insert(1, 10.0);
        // product 2 deliberately missing from the snapshot

        let rows = build_stock_rows(&deltas, &snapshot);
        assert_eq!(rows.len(), 2);

        let row1 = &rows[0];
        assert_eq!(row1.product_id, 1);
        assert!((row1.current_on_hand - 10.0).abs() < 1e-9);
        assert!((row1.minus - 0.2).abs() < 1e-9);
        assert_eq!(row1.plus, 0.0);
        assert!((row1.new_on_hand - 9.8).abs() < 1e-9);

        let row2 = &rows[1];
        assert_eq!(row2.current_on_hand, 0.0); // snapshot miss → 0
        assert_eq!(row2.minus, 0.0);
        assert!((row2.plus - 2.0).abs() < 1e-9);
        assert!((row2.new_on_hand - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_stock_row_wire_names() {
        let rows = build_stock_rows(
            &PendingDelta::from([(1, -1.0)]),
            &BTreeMap::from([(1, 5.0)]),
        );
        let json = serde_json::to_value(&rows[0]).unwrap();

        assert_eq!(json["productId"], 1);
        assert_eq!(json["currentOnHand"], 5.0);
        assert_eq!(json["newOnHand"], 4.0);
        assert_eq!(json["minus"], 1.0);
    }
}
