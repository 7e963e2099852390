//! # Optimistic Applier
//!
//! Applies a computed delta map to the local store IMMEDIATELY, before any
//! remote confirmation. This call sits on the checkout's synchronous
//! critical path: it performs store I/O only and never awaits the network.
//!
//! ## Apply Flow (per product)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  read current on-hand ──── store hit ────────────────┐                 │
//! │       │                                              ▼                 │
//! │       └── store miss ──► grouped-snapshot fallback   │                 │
//! │                              │                       │                 │
//! │                              └── miss too ──► drop + log               │
//! │                                                      │                 │
//! │  snapshot[id] = current        (pre-adjustment, first write wins)      │
//! │  new = current + delta         (delta is signed)                       │
//! │  set_on_hand(id, new)          (maintains out-of-stock index)          │
//! │       │                                                                 │
//! │       └── NotFound (seed race) → bounded retry with backoff,           │
//! │           then drop + log. The checkout NEVER fails here.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The pre-adjustment snapshot is what the reconciler later reports as
//! `currentOnHand`; recording it before the write is what makes the remote
//! batch rows honest about what this terminal observed.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ReplaySettings;
use crate::error::SyncResult;
use tally_core::{PendingDelta, UnitGroupIndex};
use tally_store::{Database, StoreError};

// =============================================================================
// Applied Stock
// =============================================================================

/// Outcome of one optimistic apply pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedStock {
    /// On-hand per product BEFORE the delta was applied. This is the
    /// snapshot the reconciler sends as `currentOnHand`.
    pub pre_adjustment: BTreeMap<i64, f64>,

    /// On-hand per product after the local write.
    pub new_on_hand: BTreeMap<i64, f64>,

    /// Products whose local write was dropped after exhausting retries.
    /// Their entries still appear in the maps so the remote batch carries
    /// the intended effect.
    pub dropped: Vec<i64>,
}

// =============================================================================
// Optimistic Applier
// =============================================================================

/// Applies delta maps to the local store without waiting on the network.
#[derive(Debug, Clone)]
pub struct OptimisticApplier {
    db: Database,
    settings: ReplaySettings,
}

impl OptimisticApplier {
    /// Creates a new applier.
    pub fn new(db: Database, settings: ReplaySettings) -> Self {
        OptimisticApplier { db, settings }
    }

    /// Applies a signed delta map, returning the pre/post on-hand maps.
    ///
    /// `index` is the grouped snapshot used as a read fallback when the
    /// store misses (partial catalog sync race). Failures degrade per
    /// product; the call itself only fails on infrastructure errors
    /// (connection lost).
    pub async fn apply(
        &self,
        deltas: &PendingDelta,
        index: &UnitGroupIndex,
    ) -> SyncResult<AppliedStock> {
        let products = self.db.products();
        let mut applied = AppliedStock::default();

        for (&product_id, &delta) in deltas {
            if !delta.is_finite() || delta == 0.0 {
                continue;
            }

            // Read the current value: store first, cached snapshot second.
            let current = match products.get(product_id).await? {
                Some(product) => product.on_hand,
                None => match index.find_product(product_id) {
                    Some(cached) => {
                        debug!(
                            product_id,
                            "Store read missed; using grouped snapshot fallback"
                        );
                        cached.on_hand
                    }
                    None => {
                        warn!(product_id, "Product unknown locally; delta dropped");
                        applied.dropped.push(product_id);
                        continue;
                    }
                },
            };

            applied
                .pre_adjustment
                .entry(product_id)
                .or_insert(current);

            let new_on_hand = current + delta;
            applied.new_on_hand.insert(product_id, new_on_hand);

            if !self.write_with_retry(product_id, new_on_hand).await? {
                applied.dropped.push(product_id);
            }
        }

        Ok(applied)
    }

    /// Writes one on-hand value, retrying NotFound with exponential backoff.
    ///
    /// NotFound here almost always means the catalog seed has not reached
    /// this record yet; waiting a few hundred milliseconds usually wins the
    /// race. Returns false when the update was dropped.
    async fn write_with_retry(&self, product_id: i64, on_hand: f64) -> SyncResult<bool> {
        let mut policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(
                self.settings.store_read_initial_backoff_ms,
            ))
            .with_max_interval(Duration::from_secs(self.settings.store_read_max_backoff_secs))
            .with_max_elapsed_time(None)
            .build();

        let max_attempts = self.settings.store_read_max_attempts;

        for attempt in 1..=max_attempts {
            match self.db.products().set_on_hand(product_id, on_hand).await {
                Ok(()) => return Ok(true),
                Err(StoreError::NotFound { .. }) => {
                    if attempt == max_attempts {
                        break;
                    }
                    let delay = policy
                        .next_backoff()
                        .unwrap_or(Duration::from_millis(self.settings.store_read_initial_backoff_ms));
                    debug!(
                        product_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Product not seeded yet; retrying on-hand write"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(other) => return Err(other.into()),
            }
        }

        warn!(
            product_id,
            attempts = max_attempts,
            "Gave up applying on-hand update; record never appeared"
        );
        Ok(false)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tally_core::Product;
    use tally_store::DbConfig;

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
            master_product_id: master_unit_id.map(|_| 7),
            conversion_value: conversion,
            created_at: ts,
            modified_at: ts,
        }
    }

    fn fast_settings() -> ReplaySettings {
        ReplaySettings {
            store_read_max_attempts: 2,
            store_read_initial_backoff_ms: 1,
            store_read_max_backoff_secs: 1,
        }
    }

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_apply_writes_and_snapshots() {
        let db = db().await;
        let box_p = product(1, None, 1.0, 10.0);
        let piece_p = product(2, Some(1), 0.1, 100.0);
        db.products().put_many(&[box_p.clone(), piece_p.clone()]).await.unwrap();

        let index = UnitGroupIndex::build(&[box_p, piece_p]);
        let applier = OptimisticApplier::new(db.clone(), fast_settings());

        // Selling 2 pieces: the worked example from the delta engine.
        let deltas = PendingDelta::from([(1, -0.2), (2, -2.0)]);
        let applied = applier.apply(&deltas, &index).await.unwrap();

        assert_eq!(applied.pre_adjustment[&1], 10.0);
        assert_eq!(applied.pre_adjustment[&2], 100.0);
        assert!((applied.new_on_hand[&1] - 9.8).abs() < 1e-9);
        assert!((applied.new_on_hand[&2] - 98.0).abs() < 1e-9);
        assert!(applied.dropped.is_empty());

        let stored = db.products().get(1).await.unwrap().unwrap();
        assert!((stored.on_hand - 9.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_apply_updates_out_of_stock_index() {
        let db = db().await;
        db.products().put(&product(1, None, 1.0, 1.0)).await.unwrap();

        let index = UnitGroupIndex::build(&[]);
        let applier = OptimisticApplier::new(db.clone(), fast_settings());

        applier
            .apply(&PendingDelta::from([(1, -1.0)]), &index)
            .await
            .unwrap();

        assert_eq!(db.products().out_of_stock_ids().await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn test_store_miss_uses_snapshot_fallback() {
        let db = db().await;
        // Product 2 exists only in the cached index, not the store.
        let cached = product(2, Some(1), 0.1, 50.0);
        let index = UnitGroupIndex::build(&[product(1, None, 1.0, 5.0), cached]);

        let applier = OptimisticApplier::new(db.clone(), fast_settings());
        let applied = applier
            .apply(&PendingDelta::from([(2, -2.0)]), &index)
            .await
            .unwrap();

        // Snapshot value fed the computation...
        assert_eq!(applied.pre_adjustment[&2], 50.0);
        assert!((applied.new_on_hand[&2] - 48.0).abs() < 1e-9);
        // ...but the local write had nowhere to land and was dropped.
        assert_eq!(applied.dropped, vec![2]);
    }

    #[tokio::test]
    async fn test_unknown_product_is_dropped_entirely() {
        let db = db().await;
        let index = UnitGroupIndex::build(&[]);
        let applier = OptimisticApplier::new(db, fast_settings());

        let applied = applier
            .apply(&PendingDelta::from([(404, -1.0)]), &index)
            .await
            .unwrap();

        assert!(applied.pre_adjustment.is_empty());
        assert!(applied.new_on_hand.is_empty());
        assert_eq!(applied.dropped, vec![404]);
    }

    #[tokio::test]
    async fn test_zero_and_nonfinite_deltas_skipped() {
        let db = db().await;
        db.products().put(&product(1, None, 1.0, 5.0)).await.unwrap();

        let index = UnitGroupIndex::build(&[]);
        let applier = OptimisticApplier::new(db.clone(), fast_settings());

        let mut deltas = PendingDelta::new();
        deltas.insert(1, 0.0);
        deltas.insert(2, f64::NAN);

        let applied = applier.apply(&deltas, &index).await.unwrap();
        assert!(applied.new_on_hand.is_empty());

        let stored = db.products().get(1).await.unwrap().unwrap();
        assert!((stored.on_hand - 5.0).abs() < 1e-9);
    }
}
