//! # Product Repository
//!
//! The LocalProductStore: durable key-value access to Product records plus
//! the derived out-of-stock secondary index.
//!
//! ## Out-of-Stock Index Maintenance
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │   Every write that touches on_hand also settles out_of_stock           │
//! │   membership in the SAME call:                                          │
//! │                                                                         │
//! │   put / put_many / set_on_hand                                         │
//! │        │                                                                │
//! │        ├── on_hand <= 0 → INSERT OR REPLACE INTO out_of_stock          │
//! │        └── on_hand >  0 → DELETE FROM out_of_stock                     │
//! │                                                                         │
//! │   The index is derived state; it is never the source of truth and      │
//! │   a missed update self-heals on the next on-hand write.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use tally_core::Product;

const PRODUCT_COLUMNS: &str = "id, code, name, category_id, is_active, is_deleted, \
     cost_cents, base_price_cents, on_hand, unit, \
     master_unit_id, master_product_id, conversion_value, \
     created_at, modified_at";

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    ///
    /// ## Returns
    /// * `Ok(Some(Product))` - Product found
    /// * `Ok(None)` - Product not found (common during catalog seed races;
    ///   callers decide whether to retry)
    pub async fn get(&self, id: i64) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Upserts a single product and settles its out-of-stock membership.
    pub async fn put(&self, product: &Product) -> StoreResult<()> {
        debug!(id = product.id, on_hand = product.on_hand, "Putting product");

        let mut tx = self.pool.begin().await?;
        Self::upsert_in(&mut tx, product).await?;
        Self::sync_out_of_stock_in(&mut tx, product.id, product.on_hand).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Upserts many products in one transaction.
    ///
    /// Used by catalog refresh and by the server-wins overwrite after a
    /// successful reconciliation batch.
    pub async fn put_many(&self, products: &[Product]) -> StoreResult<()> {
        if products.is_empty() {
            return Ok(());
        }

        debug!(count = products.len(), "Putting products");

        let mut tx = self.pool.begin().await?;
        for product in products {
            Self::upsert_in(&mut tx, product).await?;
            Self::sync_out_of_stock_in(&mut tx, product.id, product.on_hand).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    /// Deletes a product and its out-of-stock entry.
    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        debug!(id, "Deleting product");

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM out_of_stock WHERE product_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(())
    }

    /// Returns the full catalog. Feed for `UnitGroupIndex::build`.
    pub async fn get_all(&self) -> StoreResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id");
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Returns the products matching the given ids (missing ids are simply
    /// absent from the result).
    pub async fn get_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id IN ({placeholders})");

        let mut query = sqlx::query_as::<_, Product>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Overwrites a single product's on-hand value.
    ///
    /// This is the write used by the optimistic applier and the server-wins
    /// overwrite; out-of-stock membership is settled in the same
    /// transaction.
    ///
    /// ## Returns
    /// * `Err(StoreError::NotFound)` - the record is not seeded yet; callers
    ///   on the sync path retry with backoff
    pub async fn set_on_hand(&self, id: i64, on_hand: f64) -> StoreResult<()> {
        debug!(id, on_hand, "Setting on-hand");

        let now = Utc::now();

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE products SET on_hand = ?2, modified_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(on_hand)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Product", id));
        }

        Self::sync_out_of_stock_in(&mut tx, id, on_hand).await?;
        tx.commit().await?;

        Ok(())
    }

    /// Counts products (for diagnostics).
    pub async fn count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Out-of-Stock Index
    // =========================================================================

    /// Lists the ids currently in the out-of-stock index.
    pub async fn out_of_stock_ids(&self) -> StoreResult<Vec<i64>> {
        let ids: Vec<i64> =
            sqlx::query_scalar("SELECT product_id FROM out_of_stock ORDER BY product_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(ids)
    }

    /// Returns the full product rows for the out-of-stock index.
    pub async fn get_out_of_stock(&self) -> StoreResult<Vec<Product>> {
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE id IN (SELECT product_id FROM out_of_stock) ORDER BY id"
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn upsert_in(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        product: &Product,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO products (
                id, code, name, category_id, is_active, is_deleted,
                cost_cents, base_price_cents, on_hand, unit,
                master_unit_id, master_product_id, conversion_value,
                created_at, modified_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(id) DO UPDATE SET
                code = excluded.code,
                name = excluded.name,
                category_id = excluded.category_id,
                is_active = excluded.is_active,
                is_deleted = excluded.is_deleted,
                cost_cents = excluded.cost_cents,
                base_price_cents = excluded.base_price_cents,
                on_hand = excluded.on_hand,
                unit = excluded.unit,
                master_unit_id = excluded.master_unit_id,
                master_product_id = excluded.master_product_id,
                conversion_value = excluded.conversion_value,
                modified_at = excluded.modified_at",
        )
        .bind(product.id)
        .bind(&product.code)
        .bind(&product.name)
        .bind(product.category_id)
        .bind(product.is_active)
        .bind(product.is_deleted)
        .bind(product.cost_cents)
        .bind(product.base_price_cents)
        .bind(product.on_hand)
        .bind(&product.unit)
        .bind(product.master_unit_id)
        .bind(product.master_product_id)
        .bind(product.conversion_value)
        .bind(product.created_at)
        .bind(product.modified_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn sync_out_of_stock_in(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        product_id: i64,
        on_hand: f64,
    ) -> StoreResult<()> {
        if !on_hand.is_finite() {
            return Ok(());
        }

        if on_hand <= tally_core::OUT_OF_STOCK_THRESHOLD {
            sqlx::query(
                "INSERT INTO out_of_stock (product_id, on_hand, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(product_id) DO UPDATE SET
                     on_hand = excluded.on_hand,
                     updated_at = excluded.updated_at",
            )
            .bind(product_id)
            .bind(on_hand)
            .bind(Utc::now())
            .execute(&mut **tx)
            .await?;
        } else {
            sqlx::query("DELETE FROM out_of_stock WHERE product_id = ?1")
                .bind(product_id)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
