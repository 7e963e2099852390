//! # Grouped Snapshot Cache
//!
//! An explicit, invalidate-on-write cache of the unit group index.
//!
//! ## Why a Cache At All
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Checkout, replay and compensation all need the CURRENT grouping of    │
//! │  the catalog. Rebuilding it is a full-table read plus a three-pass     │
//! │  scan - too much to repeat per cart line, cheap enough to repeat       │
//! │  every TTL.                                                            │
//! │                                                                         │
//! │  get_or_refresh(db)                                                    │
//! │       │                                                                 │
//! │       ├── fresh (age < TTL)  → clone of cached index                   │
//! │       └── stale / empty      → rebuild wholesale from store.get_all()  │
//! │                                                                         │
//! │  invalidate() is called by whoever knows the catalog changed           │
//! │  (catalog refresh, server-wins overwrite). The index itself is NEVER   │
//! │  patched in place.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::SyncResult;
use tally_core::UnitGroupIndex;
use tally_store::Database;

/// TTL-bounded cache of the grouped catalog.
pub struct GroupSnapshotCache {
    ttl: Duration,
    state: Mutex<Option<CachedIndex>>,
}

struct CachedIndex {
    index: UnitGroupIndex,
    built_at: Instant,
}

impl GroupSnapshotCache {
    /// Creates an empty cache with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        GroupSnapshotCache {
            ttl,
            state: Mutex::new(None),
        }
    }

    /// Returns the cached index, rebuilding it from the store when stale or
    /// absent.
    pub async fn get_or_refresh(&self, db: &Database) -> SyncResult<UnitGroupIndex> {
        let mut state = self.state.lock().await;

        if let Some(cached) = state.as_ref() {
            if cached.built_at.elapsed() < self.ttl {
                return Ok(cached.index.clone());
            }
        }

        let index = Self::build(db).await?;
        *state = Some(CachedIndex {
            index: index.clone(),
            built_at: Instant::now(),
        });

        Ok(index)
    }

    /// Rebuilds unconditionally and replaces the cached value.
    pub async fn refresh(&self, db: &Database) -> SyncResult<UnitGroupIndex> {
        let index = Self::build(db).await?;

        let mut state = self.state.lock().await;
        *state = Some(CachedIndex {
            index: index.clone(),
            built_at: Instant::now(),
        });

        Ok(index)
    }

    /// Drops the cached value; the next read rebuilds.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        *state = None;
    }

    async fn build(db: &Database) -> SyncResult<UnitGroupIndex> {
        let products = db.products().get_all().await?;
        debug!(products = products.len(), "Rebuilding unit group index");
        Ok(UnitGroupIndex::build(&products))
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

    fn product(id: i64, master_unit_id: Option<i64>) -> Product {
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
            on_hand: 1.0,
            unit: String::new(),
            master_unit_id,
            master_product_id: master_unit_id.map(|_| 7),
            conversion_value: 1.0,
            created_at: ts,
            modified_at: ts,
        }
    }

    #[tokio::test]
    async fn test_builds_from_store() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products().put(&product(1, None)).await.unwrap();

        let cache = GroupSnapshotCache::new(Duration::from_secs(60));
        let index = cache.get_or_refresh(&db).await.unwrap();
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn test_serves_stale_until_invalidated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products().put(&product(1, None)).await.unwrap();

        let cache = GroupSnapshotCache::new(Duration::from_secs(60));
        assert_eq!(cache.get_or_refresh(&db).await.unwrap().len(), 1);

        // Catalog grows; the cached index doesn't see it within TTL.
        db.products().put(&product(2, None)).await.unwrap();
        assert_eq!(cache.get_or_refresh(&db).await.unwrap().len(), 1);

        // Explicit invalidation forces a rebuild.
        cache.invalidate().await;
        assert_eq!(cache.get_or_refresh(&db).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_always_rebuilds() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.products().put(&product(1, None)).await.unwrap();

        let cache = GroupSnapshotCache::new(Duration::ZERO);
        assert_eq!(cache.get_or_refresh(&db).await.unwrap().len(), 1);

        db.products().put(&product(2, None)).await.unwrap();
        assert_eq!(cache.get_or_refresh(&db).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_replaces_cache() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cache = GroupSnapshotCache::new(Duration::from_secs(60));

        assert!(cache.get_or_refresh(&db).await.unwrap().is_empty());

        db.products().put(&product(1, None)).await.unwrap();
        let refreshed = cache.refresh(&db).await.unwrap();
        assert_eq!(refreshed.len(), 1);
    }
}
