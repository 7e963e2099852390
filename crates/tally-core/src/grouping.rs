//! # Unit Group Index
//!
//! Groups unit-variants that share one physical stock.
//!
//! ## How Grouping Works
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Three-Pass Group Construction                       │
//! │                                                                         │
//! │  Catalog (flat):                                                       │
//! │    #10 "Box"   master_product_id=7,    master_unit_id=None             │
//! │    #11 "Piece" master_product_id=7,    master_unit_id=10               │
//! │    #20 "Jar"   master_product_id=None, master_unit_id=None             │
//! │                                                                         │
//! │  Pass 1: master_product_id set, master_unit_id unset → anchor          │
//! │    groups = { 10: [#10] }                                              │
//! │  Pass 2: both unset → anchor (standalone product)                      │
//! │    groups = { 10: [#10], 20: [#20] }                                   │
//! │  Pass 3: both set → append to groups[master_unit_id] IF it exists     │
//! │    groups = { 10: [#10, #11], 20: [#20] }                              │
//! │                                                                         │
//! │  Variants whose master_unit_id matches no anchor are DROPPED from      │
//! │  grouping. Downstream delta math treats them through the ungrouped     │
//! │  fallback path. Preserved from the system of record's behavior.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Contract
//! - Pure function of its input; idempotent (same catalog → same groups)
//! - Never mutates input records
//! - Rebuilt wholesale on every catalog refresh, never patched in place

use std::collections::BTreeMap;

use crate::types::Product;

// =============================================================================
// Unit Group Index
// =============================================================================

/// Mapping from group key to the ordered list of unit-variants sharing one
/// physical stock. The anchor is always the first entry of its group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitGroupIndex {
    /// Group key → ordered variants. BTreeMap keeps iteration deterministic.
    groups: BTreeMap<i64, Vec<Product>>,
}

impl UnitGroupIndex {
    /// Builds the index from a flat product catalog.
    ///
    /// Pass order is load-bearing: anchors must exist before variants are
    /// attached, and the two anchor passes are intentionally distinct
    /// predicates (see module docs).
    pub fn build(products: &[Product]) -> Self {
        let mut groups: BTreeMap<i64, Vec<Product>> = BTreeMap::new();

        // Pass 1: grouped anchors (have a parent reference, own their stock)
        for product in products {
            if product.master_product_id.is_some() && product.master_unit_id.is_none() {
                groups.entry(product.id).or_default().push(product.clone());
            }
        }

        // Pass 2: standalone anchors (no parent reference at all)
        for product in products {
            if product.master_product_id.is_none() && product.master_unit_id.is_none() {
                groups.entry(product.id).or_default().push(product.clone());
            }
        }

        // Pass 3: variants attach to an existing anchor, or are dropped
        for product in products {
            if product.master_product_id.is_some() {
                if let Some(master_unit_id) = product.master_unit_id {
                    if let Some(group) = groups.get_mut(&master_unit_id) {
                        group.push(product.clone());
                    }
                }
            }
        }

        UnitGroupIndex { groups }
    }

    /// Returns the variants for a group key, if the group exists.
    pub fn group(&self, key: i64) -> Option<&[Product]> {
        self.groups.get(&key).map(Vec::as_slice)
    }

    /// Returns the group a product belongs to, resolving through its key.
    pub fn group_for(&self, product: &Product) -> Option<&[Product]> {
        self.group(product.group_key())
    }

    /// Scans all groups for a product by id.
    ///
    /// Used as the cached-snapshot fallback when a store read misses during
    /// a partial catalog sync.
    pub fn find_product(&self, product_id: i64) -> Option<&Product> {
        self.groups
            .values()
            .flat_map(|group| group.iter())
            .find(|p| p.id == product_id)
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if the index holds no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn product(id: i64, master_product_id: Option<i64>, master_unit_id: Option<i64>) -> Product {
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
            on_hand: 0.0,
            unit: String::new(),
            master_unit_id,
            master_product_id,
            conversion_value: 1.0,
            created_at: ts,
            modified_at: ts,
        }
    }

    #[test]
    fn test_grouped_anchor_with_variant() {
        let catalog = vec![
            product(10, Some(7), None),     // pass 1 anchor
            product(11, Some(7), Some(10)), // variant of #10
        ];

        let index = UnitGroupIndex::build(&catalog);
        let group = index.group(10).unwrap();

        assert_eq!(group.len(), 2);
        assert_eq!(group[0].id, 10); // anchor first
        assert_eq!(group[1].id, 11);
    }

    #[test]
    fn test_standalone_anchor() {
        let catalog = vec![product(20, None, None)];

        let index = UnitGroupIndex::build(&catalog);
        assert_eq!(index.len(), 1);
        assert_eq!(index.group(20).unwrap().len(), 1);
    }

    #[test]
    fn test_orphan_variant_is_dropped() {
        // Variant references an anchor that neither pass produced: the
        // original silently drops it from grouping. Pinned here so nobody
        // "fixes" it without noticing downstream fallout.
        let catalog = vec![
            product(10, Some(7), None),
            product(31, Some(7), Some(99)), // master_unit_id 99 never anchors
        ];

        let index = UnitGroupIndex::build(&catalog);
        assert_eq!(index.len(), 1);
        assert!(index.group(99).is_none());
        assert!(index.find_product(31).is_none());
    }

    #[test]
    fn test_variant_order_follows_catalog_order() {
        let catalog = vec![
            product(10, Some(7), None),
            product(12, Some(7), Some(10)),
            product(11, Some(7), Some(10)),
        ];

        let index = UnitGroupIndex::build(&catalog);
        let ids: Vec<i64> = index.group(10).unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![10, 12, 11]);
    }

    #[test]
    fn test_build_is_deterministic() {
        let catalog = vec![
            product(10, Some(7), None),
            product(11, Some(7), Some(10)),
            product(20, None, None),
            product(21, Some(20), Some(20)),
        ];

        let a = UnitGroupIndex::build(&catalog);
        let b = UnitGroupIndex::build(&catalog);
        assert_eq!(a, b);
    }

    #[test]
    fn test_group_for_resolves_variant_to_owner() {
        let catalog = vec![product(10, Some(7), None), product(11, Some(7), Some(10))];
        let index = UnitGroupIndex::build(&catalog);

        let variant = product(11, Some(7), Some(10));
        let group = index.group_for(&variant).unwrap();
        assert_eq!(group[0].id, 10);
    }

    #[test]
    fn test_find_product_scans_groups() {
        let catalog = vec![product(10, Some(7), None), product(11, Some(7), Some(10))];
        let index = UnitGroupIndex::build(&catalog);

        assert_eq!(index.find_product(11).unwrap().id, 11);
        assert!(index.find_product(404).is_none());
    }
}
