//! # Offline Invoice Repository
//!
//! The durable replay queue: invoices whose remote push has not yet
//! succeeded. Deliberately a SEPARATE table from the canonical store so a
//! queue listing never mixes confirmed and unconfirmed sales.
//!
//! ## Queue Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  checkout (offline / push failed)                                      │
//! │       │ put(invoice)            on_hand_synced = false                 │
//! │       ▼                                                                 │
//! │  offline_invoices ──► replay (sequential) ──► remote accepted          │
//! │       ▲                        │                   │                    │
//! │       │ stays queued           │ batch failed      │ delete(id)        │
//! │       └────────────────────────┘                   ▼                    │
//! │                                            canonical store             │
//! │                                                                         │
//! │  Local stock is NEVER rolled back while an entry waits here; only      │
//! │  the remote confirmation is pending.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::StoreResult;
use crate::repository::InvoiceRow;
use tally_core::Invoice;

const OFFLINE_COLUMNS: &str = "id, lines, created_at, discount_cents, customer_id, \
     total_price_cents, total_cost_cents, total_quantity, \
     customer_paid_cents, debt_cents, note, on_hand_synced, status";

/// Repository for the offline invoice queue.
#[derive(Debug, Clone)]
pub struct OfflineInvoiceRepository {
    pool: SqlitePool,
}

impl OfflineInvoiceRepository {
    /// Creates a new OfflineInvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OfflineInvoiceRepository { pool }
    }

    /// Enqueues an invoice (upsert: retrying a failed push must not error).
    pub async fn put(&self, invoice: &Invoice) -> StoreResult<()> {
        debug!(id = %invoice.id, "Queueing invoice offline");

        let row = InvoiceRow::from_invoice(invoice)?;

        sqlx::query(
            "INSERT INTO offline_invoices (
                id, lines, created_at, discount_cents, customer_id,
                total_price_cents, total_cost_cents, total_quantity,
                customer_paid_cents, debt_cents, note, on_hand_synced, status,
                queued_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(id) DO UPDATE SET
                lines = excluded.lines,
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
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a queued invoice by id.
    pub async fn get(&self, id: &str) -> StoreResult<Option<Invoice>> {
        let sql = format!("SELECT {OFFLINE_COLUMNS} FROM offline_invoices WHERE id = ?1");
        let row = sqlx::query_as::<_, InvoiceRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(InvoiceRow::into_invoice).transpose()
    }

    /// Lists all queued invoices in enqueue order.
    ///
    /// Replay processes this list sequentially; order keeps
    /// snapshot-then-push semantics simple.
    pub async fn get_all(&self) -> StoreResult<Vec<Invoice>> {
        let sql =
            format!("SELECT {OFFLINE_COLUMNS} FROM offline_invoices ORDER BY queued_at, id");
        let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(InvoiceRow::into_invoice).collect()
    }

    /// Removes a queued invoice (after a successful replay, or a manual
    /// discard from the queue listing).
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        debug!(id, "Removing invoice from offline queue");

        sqlx::query("DELETE FROM offline_invoices WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Flips the on_hand_synced flag on a queued invoice.
    ///
    /// Missing entries are a no-op: the flag write races with queue
    /// deletion during replay and losing that race is harmless.
    pub async fn mark_on_hand_synced(&self, id: &str, synced: bool) -> StoreResult<()> {
        debug!(id, synced, "Marking offline invoice on_hand_synced");

        sqlx::query("UPDATE offline_invoices SET on_hand_synced = ?2 WHERE id = ?1")
            .bind(id)
            .bind(synced)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Number of queued invoices.
    pub async fn count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM offline_invoices")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
