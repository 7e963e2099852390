//! # Validation Module
//!
//! Checkout-time validation rules.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI layer                                                     │
//! │  ├── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE - business rule validation                       │
//! │  ├── Cart not empty, quantities sane, customer present for debt        │
//! │  └── Advisory stock availability (never blocks the sale)               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (NOT NULL / FK constraints)                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The stock check is ADVISORY: a cashier-entered sale is never rejected
//! for stock reasons. Callers surface the shortage and proceed.

use crate::error::ValidationError;
use crate::grouping::UnitGroupIndex;
use crate::types::CartLine;
use crate::MAX_CART_LINES;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Cart Validators
// =============================================================================

/// Validates that the cart holds at least one line and not absurdly many.
pub fn validate_cart(lines: &[CartLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::EmptyCart);
    }

    if lines.len() > MAX_CART_LINES {
        return Err(ValidationError::TooManyLines {
            max: MAX_CART_LINES,
        });
    }

    for line in lines {
        if !line.quantity.is_finite() || line.quantity <= 0.0 {
            return Err(ValidationError::MustBePositive {
                field: format!("quantity for product {}", line.product.id),
            });
        }
    }

    Ok(())
}

/// Validates that a debt sale carries a customer reference.
///
/// `change_cents` is customer_paid − total: negative change means part of
/// the sale is owed, and debt must be attached to somebody.
pub fn validate_customer_for_debt(
    change_cents: i64,
    has_customer: bool,
) -> ValidationResult<()> {
    if change_cents < 0 && !has_customer {
        return Err(ValidationError::CustomerRequiredForDebt);
    }
    Ok(())
}

// =============================================================================
// Stock Availability (advisory)
// =============================================================================

/// A group (or ungrouped product) whose requested quantity exceeds the
/// available stock.
#[derive(Debug, Clone, PartialEq)]
pub struct StockShortage {
    /// Group key, or the product id for ungrouped lines.
    pub group_key: i64,
    /// Required quantity in the group's base unit.
    pub required: f64,
    /// Available quantity in the group's base unit.
    pub available: f64,
}

/// Checks whether every cart line can be covered by current stock.
///
/// Requirements are summed PER GROUP in the base unit (two lines selling
/// Box and Piece of the same good compete for the same physical stock).
/// Availability comes from the group anchor's on-hand; ungrouped lines
/// fall back to the line snapshot's own on-hand.
///
/// Returns the list of shortages; empty means sufficient.
pub fn check_sufficient_stock(lines: &[CartLine], index: &UnitGroupIndex) -> Vec<StockShortage> {
    use std::collections::BTreeMap;

    let mut required: BTreeMap<i64, f64> = BTreeMap::new();
    let mut available: BTreeMap<i64, f64> = BTreeMap::new();

    for line in lines {
        let conversion = crate::adjustment::normalized_conversion(line.product.conversion_value);
        let master_qty = line.quantity * conversion;
        let key = line.product.group_key();

        match index.group(key) {
            Some(group) => {
                *required.entry(key).or_insert(0.0) += master_qty;
                if let Some(anchor) = group.first() {
                    let anchor_conversion =
                        crate::adjustment::normalized_conversion(anchor.conversion_value);
                    available.insert(key, anchor.on_hand * anchor_conversion);
                }
            }
            None => {
                // Degraded fallback mirrors the delta engine: the line's own
                // snapshot is all we have.
                *required.entry(line.product.id).or_insert(0.0) += master_qty;
                available.insert(line.product.id, line.product.on_hand);
            }
        }
    }

    required
        .into_iter()
        .filter_map(|(group_key, needed)| {
            let have = available.get(&group_key).copied().unwrap_or(0.0);
            (needed > have).then_some(StockShortage {
                group_key,
                required: needed,
                available: have,
            })
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
            unit_price_cents: 1_000,
            total_price_cents: (1_000.0 * quantity) as i64,
        }
    }

    #[test]
    fn test_empty_cart_rejected() {
        assert!(matches!(validate_cart(&[]), Err(ValidationError::EmptyCart)));
    }

    #[test]
    fn test_nonpositive_quantity_rejected() {
        let bad = line(product(1, None, 1.0, 10.0), 0.0);
        assert!(validate_cart(&[bad]).is_err());

        let bad = line(product(1, None, 1.0, 10.0), -1.0);
        assert!(validate_cart(&[bad]).is_err());

        let ok = line(product(1, None, 1.0, 10.0), 0.5);
        assert!(validate_cart(&[ok]).is_ok());
    }

    #[test]
    fn test_debt_requires_customer() {
        assert!(validate_customer_for_debt(-500, false).is_err());
        assert!(validate_customer_for_debt(-500, true).is_ok());
        assert!(validate_customer_for_debt(0, false).is_ok());
        assert!(validate_customer_for_debt(200, false).is_ok());
    }

    #[test]
    fn test_stock_check_sums_across_units() {
        let index = UnitGroupIndex::build(&[
            product(1, None, 1.0, 2.0),      // 2 boxes available
            product(2, Some(1), 0.1, 20.0),  // = 20 pieces
        ]);

        // 1 box + 15 pieces = 1 + 1.5 = 2.5 base units required, 2 available.
        let cart = vec![
            line(product(1, None, 1.0, 2.0), 1.0),
            line(product(2, Some(1), 0.1, 20.0), 15.0),
        ];

        let shortages = check_sufficient_stock(&cart, &index);
        assert_eq!(shortages.len(), 1);
        assert_eq!(shortages[0].group_key, 1);
        assert!((shortages[0].required - 2.5).abs() < 1e-9);
        assert!((shortages[0].available - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_stock_check_passes_when_covered() {
        let index = UnitGroupIndex::build(&[
            product(1, None, 1.0, 5.0),
            product(2, Some(1), 0.1, 50.0),
        ]);

        let cart = vec![line(product(2, Some(1), 0.1, 50.0), 10.0)]; // 1.0 base
        assert!(check_sufficient_stock(&cart, &index).is_empty());
    }

    #[test]
    fn test_stock_check_ungrouped_fallback() {
        let index = UnitGroupIndex::build(&[]);
        let cart = vec![line(product(31, Some(99), 1.0, 1.0), 3.0)];

        let shortages = check_sufficient_stock(&cart, &index);
        assert_eq!(shortages.len(), 1);
        assert_eq!(shortages[0].group_key, 31);
    }
}
