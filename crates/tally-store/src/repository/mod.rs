//! # Repository Implementations
//!
//! One repository per aggregate:
//!
//! - [`product`] - LocalProductStore + out-of-stock secondary index
//! - [`invoice`] - canonical invoice store (remote-confirmed sales)
//! - [`offline`] - offline invoice queue (durable, separate table)

pub mod invoice;
pub mod offline;
pub mod product;

use crate::error::{StoreError, StoreResult};
use tally_core::{CartLine, Invoice, InvoiceStatus};

// =============================================================================
// Shared Row Mapping
// =============================================================================

/// Flat row shared by the canonical and offline invoice tables.
///
/// Cart lines travel as a JSON payload column; the row is the only place
/// that knows about that encoding.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct InvoiceRow {
    pub id: String,
    pub lines: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub discount_cents: i64,
    pub customer_id: Option<i64>,
    pub total_price_cents: i64,
    pub total_cost_cents: i64,
    pub total_quantity: f64,
    pub customer_paid_cents: i64,
    pub debt_cents: i64,
    pub note: String,
    pub on_hand_synced: bool,
    pub status: InvoiceStatus,
}

impl InvoiceRow {
    pub(crate) fn from_invoice(invoice: &Invoice) -> StoreResult<Self> {
        let lines = serde_json::to_string(&invoice.lines).map_err(|e| StoreError::Internal(
            format!("failed to encode invoice lines: {e}"),
        ))?;

        Ok(InvoiceRow {
            id: invoice.id.clone(),
            lines,
            created_at: invoice.created_at,
            discount_cents: invoice.discount_cents,
            customer_id: invoice.customer_id,
            total_price_cents: invoice.total_price_cents,
            total_cost_cents: invoice.total_cost_cents,
            total_quantity: invoice.total_quantity,
            customer_paid_cents: invoice.customer_paid_cents,
            debt_cents: invoice.debt_cents,
            note: invoice.note.clone(),
            on_hand_synced: invoice.on_hand_synced,
            status: invoice.status,
        })
    }

    pub(crate) fn into_invoice(self) -> StoreResult<Invoice> {
        let lines: Vec<CartLine> =
            serde_json::from_str(&self.lines).map_err(|e| StoreError::CorruptPayload {
                entity: "Invoice".to_string(),
                id: self.id.clone(),
                message: e.to_string(),
            })?;

        Ok(Invoice {
            id: self.id,
            lines,
            created_at: self.created_at,
            discount_cents: self.discount_cents,
            customer_id: self.customer_id,
            total_price_cents: self.total_price_cents,
            total_cost_cents: self.total_cost_cents,
            total_quantity: self.total_quantity,
            customer_paid_cents: self.customer_paid_cents,
            debt_cents: self.debt_cents,
            note: self.note,
            on_hand_synced: self.on_hand_synced,
            status: self.status,
        })
    }
}
