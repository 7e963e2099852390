//! # Invoice Repository
//!
//! The canonical invoice store. Invoices land here once entered; they are
//! mutated only to flip `on_hand_synced` / `status`, and deleted when the
//! remote confirms a permanent deletion (stock compensation happens in the
//! sync layer before the row goes away).

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::repository::InvoiceRow;
use tally_core::{Invoice, InvoiceStatus};

const INVOICE_COLUMNS: &str = "id, lines, created_at, discount_cents, customer_id, \
     total_price_cents, total_cost_cents, total_quantity, \
     customer_paid_cents, debt_cents, note, on_hand_synced, status";

/// Repository for canonical invoice operations.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Upserts an invoice.
    ///
    /// Upsert rather than insert: replaying an offline invoice that already
    /// reached the canonical store must not fail on the second write.
    pub async fn put(&self, invoice: &Invoice) -> StoreResult<()> {
        debug!(id = %invoice.id, "Putting invoice");

        let row = InvoiceRow::from_invoice(invoice)?;

        sqlx::query(
            "INSERT INTO invoices (
                id, lines, created_at, discount_cents, customer_id,
                total_price_cents, total_cost_cents, total_quantity,
                customer_paid_cents, debt_cents, note, on_hand_synced, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(id) DO UPDATE SET
                lines = excluded.lines,
                discount_cents = excluded.discount_cents,
                customer_id = excluded.customer_id,
                total_price_cents = excluded.total_price_cents,
                total_cost_cents = excluded.total_cost_cents,
                total_quantity = excluded.total_quantity,
                customer_paid_cents = excluded.customer_paid_cents,
                debt_cents = excluded.debt_cents,
                note = excluded.note,
                on_hand_synced = excluded.on_hand_synced,
                status = excluded.status",
        )
        .bind(&row.id)
        .bind(&row.lines)
        .bind(row.created_at)
        .bind(row.discount_cents)
        .bind(row.customer_id)
        .bind(row.total_price_cents)
        .bind(row.total_cost_cents)
        .bind(row.total_quantity)
        .bind(row.customer_paid_cents)
        .bind(row.debt_cents)
        .bind(&row.note)
        .bind(row.on_hand_synced)
        .bind(row.status)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets an invoice by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Invoice>> {
        let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1");
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(InvoiceRow::into_invoice).transpose()
    }

    /// Lists invoices created within [from, to), newest first.
    pub async fn get_by_date(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE created_at >= ?1 AND created_at < ?2 \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(InvoiceRow::into_invoice).collect()
    }

    /// Lists invoices whose stock effect is still unconfirmed by the
    /// remote: they reached the canonical store but their batch push
    /// failed. Canceled invoices are excluded (their stock was already
    /// compensated).
    pub async fn get_unsynced(&self) -> StoreResult<Vec<Invoice>> {
        let sql = format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE on_hand_synced = 0 AND status != ?1 \
             ORDER BY created_at"
        );
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(InvoiceStatus::Canceled)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(InvoiceRow::into_invoice).collect()
    }

    /// Updates the lifecycle status of an invoice.
    pub async fn set_status(&self, id: &str, status: InvoiceStatus) -> StoreResult<()> {
        debug!(id, %status, "Setting invoice status");

        let result = sqlx::query("UPDATE invoices SET status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Invoice", id));
        }

        Ok(())
    }

    /// Flips the on_hand_synced flag.
    pub async fn set_on_hand_synced(&self, id: &str, synced: bool) -> StoreResult<()> {
        debug!(id, synced, "Setting invoice on_hand_synced");

        let result = sqlx::query("UPDATE invoices SET on_hand_synced = ?2 WHERE id = ?1")
            .bind(id)
            .bind(synced)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("Invoice", id));
        }

        Ok(())
    }

    /// Deletes an invoice.
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        debug!(id, "Deleting invoice");

        sqlx::query("DELETE FROM invoices WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Counts invoices (for diagnostics).
    pub async fn count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use chrono::TimeZone;
    use tally_core::{CartLine, Product};

    fn invoice(id: &str) -> Invoice {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap();
        let product = Product {
            id: 1,
            code: "P1".to_string(),
            name: "Product 1".to_string(),
            category_id: None,
            is_active: true,
            is_deleted: false,
            cost_cents: 8_000,
            base_price_cents: 10_000,
            on_hand: 10.0,
            unit: "Box".to_string(),
            master_unit_id: None,
            master_product_id: None,
            conversion_value: 1.0,
            created_at: ts,
            modified_at: ts,
        };

        Invoice {
            id: id.to_string(),
            lines: vec![CartLine {
                product,
                quantity: 2.0,
                unit_price_cents: 10_000,
                total_price_cents: 20_000,
            }],
            created_at: ts,
            discount_cents: 0,
            customer_id: None,
            total_price_cents: 20_000,
            total_cost_cents: 16_000,
            total_quantity: 2.0,
            customer_paid_cents: 20_000,
            debt_cents: 0,
            note: String::new(),
            on_hand_synced: false,
            status: InvoiceStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.invoices();

        let inv = invoice("inv-1");
        repo.put(&inv).await.unwrap();

        let loaded = repo.get("inv-1").await.unwrap().unwrap();
        assert_eq!(loaded, inv);
    }

    #[tokio::test]
    async fn test_status_and_sync_flag() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.invoices();

        repo.put(&invoice("inv-1")).await.unwrap();
        repo.set_status("inv-1", InvoiceStatus::Checked).await.unwrap();
        repo.set_on_hand_synced("inv-1", true).await.unwrap();

        let loaded = repo.get("inv-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, InvoiceStatus::Checked);
        assert!(loaded.on_hand_synced);
    }

    #[tokio::test]
    async fn test_set_status_missing_invoice() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let err = db
            .invoices()
            .set_status("nope", InvoiceStatus::Canceled)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_get_by_date_range() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.invoices();

        let mut early = invoice("inv-early");
        early.created_at = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let mut late = invoice("inv-late");
        late.created_at = Utc.with_ymd_and_hms(2024, 6, 2, 8, 0, 0).unwrap();

        repo.put(&early).await.unwrap();
        repo.put(&late).await.unwrap();

        let day_one = repo
            .get_by_date(
                Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(day_one.len(), 1);
        assert_eq!(day_one[0].id, "inv-early");
    }

    #[tokio::test]
    async fn test_get_unsynced_excludes_canceled() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.invoices();

        let unsynced = invoice("inv-unsynced");
        let mut synced = invoice("inv-synced");
        synced.on_hand_synced = true;
        let mut canceled = invoice("inv-canceled");
        canceled.status = InvoiceStatus::Canceled;

        repo.put(&unsynced).await.unwrap();
        repo.put(&synced).await.unwrap();
        repo.put(&canceled).await.unwrap();

        let pending = repo.get_unsynced().await.unwrap();
        let ids: Vec<String> = pending.into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["inv-unsynced".to_string()]);
    }

    #[tokio::test]
    async fn test_delete() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let repo = db.invoices();

        repo.put(&invoice("inv-1")).await.unwrap();
        repo.delete("inv-1").await.unwrap();
        assert!(repo.get("inv-1").await.unwrap().is_none());
    }
}
