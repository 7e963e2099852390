//! # Remote Reconciler
//!
//! Pushes local stock effects to the remote system of record and pulls back
//! its authoritative answer.
//!
//! ## Reconciliation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  invoice + group index + pre-adjustment snapshot                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  compute_deltas ──► build_stock_rows                                   │
//! │       │              [{productId, currentOnHand, delta, newOnHand}]    │
//! │       ▼                                                                 │
//! │  ONE remote call: PUT update_onhand_batch                              │
//! │       │                                                                 │
//! │       ├── failure → propagate; caller leaves invoice queued,           │
//! │       │             local stock is NOT rolled back                     │
//! │       ▼                                                                 │
//! │  response.updated_products                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SERVER WINS: every returned document overwrites the local store.     │
//! │  This is the single point where divergence caused by other terminals  │
//! │  is resolved.                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::remote::{RemoteApi, RemoteProduct};
use tally_core::{build_stock_rows, compute_deltas, Invoice, Operation, UnitGroupIndex};
use tally_store::Database;

// =============================================================================
// Batch Result
// =============================================================================

/// Outcome of a successful reconciliation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    /// Product ids whose local state was overwritten by the server's
    /// authoritative documents.
    pub updated: Vec<i64>,
}

// =============================================================================
// Remote Reconciler
// =============================================================================

/// Push-then-pull reconciliation against the remote system of record.
pub struct RemoteReconciler {
    db: Database,
    remote: Arc<dyn RemoteApi>,
}

impl RemoteReconciler {
    /// Creates a new reconciler.
    pub fn new(db: Database, remote: Arc<dyn RemoteApi>) -> Self {
        RemoteReconciler { db, remote }
    }

    /// Reconciles one invoice's stock effect.
    ///
    /// `snapshot` must be the PRE-adjustment on-hand values recorded when
    /// the deltas were applied locally (or re-read fresh at replay time).
    /// On success the server's documents have already overwritten the
    /// local store.
    pub async fn reconcile(
        &self,
        invoice: &Invoice,
        index: &UnitGroupIndex,
        snapshot: &BTreeMap<i64, f64>,
        operation: Operation,
    ) -> SyncResult<BatchResult> {
        let deltas = compute_deltas(&invoice.lines, index, operation);
        if deltas.is_empty() {
            debug!(invoice = %invoice.id, "No deltas to reconcile");
            return Ok(BatchResult::default());
        }

        let rows = build_stock_rows(&deltas, snapshot);
        info!(
            invoice = %invoice.id,
            rows = rows.len(),
            ?operation,
            "Pushing reconciliation batch"
        );

        let response = self.remote.push_stock_batch(&rows).await?;
        let updated = self
            .apply_server_documents(&response.updated_products)
            .await?;

        Ok(BatchResult { updated })
    }

    /// Restores stock for a deleted/canceled invoice that already synced.
    ///
    /// Uses the LIVE catalog, not the original snapshot: time has passed
    /// since the sale, other terminals have moved the stock, and the
    /// restore must land on top of whatever is true now.
    pub async fn compensate_deletion(&self, invoice: &Invoice) -> SyncResult<BatchResult> {
        let products = self.db.products().get_all().await?;
        let index = UnitGroupIndex::build(&products);

        let deltas = compute_deltas(&invoice.lines, &index, Operation::Increase);
        if deltas.is_empty() {
            debug!(invoice = %invoice.id, "Nothing to restore");
            return Ok(BatchResult::default());
        }

        // Fresh snapshot: live on-hand per affected product.
        let mut snapshot = BTreeMap::new();
        for &product_id in deltas.keys() {
            if let Some(product) = self.db.products().get(product_id).await? {
                snapshot.insert(product_id, product.on_hand);
            }
        }

        let result = self
            .reconcile(invoice, &index, &snapshot, Operation::Increase)
            .await?;

        // Products the server response did not cover still get the local
        // restore, clamped at zero like the original restore path.
        for (&product_id, &delta) in &deltas {
            if result.updated.contains(&product_id) {
                continue;
            }
            let Some(current) = snapshot.get(&product_id) else {
                continue;
            };
            let restored = (current + delta).max(0.0);
            if let Err(e) = self.db.products().set_on_hand(product_id, restored).await {
                warn!(product_id, error = %e, "Local restore write failed");
            }
        }

        Ok(result)
    }

    /// Applies the server's authoritative documents to the local store.
    ///
    /// Unconditional overwrite: the server value wins over whatever the
    /// optimistic applier wrote. Records missing locally are skipped with a
    /// warning (they will arrive with the next catalog sync).
    async fn apply_server_documents(
        &self,
        documents: &[RemoteProduct],
    ) -> SyncResult<Vec<i64>> {
        let products = self.db.products();
        let mut updated = Vec::with_capacity(documents.len());

        for doc in documents {
            let Some(mut local) = products.get(doc.id).await? else {
                warn!(
                    product_id = doc.id,
                    "Server document for unknown local product; skipped"
                );
                continue;
            };

            if let Some(on_hand) = doc.new_on_hand {
                local.on_hand = on_hand;
            }
            if let Some(price) = doc.base_price_cents {
                local.base_price_cents = price;
            }
            if let Some(cost) = doc.cost_cents {
                local.cost_cents = cost;
            }
            if let Some(ref code) = doc.code {
                local.code = code.clone();
            }
            if let Some(ref name) = doc.name {
                local.name = name.clone();
            }

            products.put(&local).await?;
            updated.push(doc.id);
        }

        debug!(count = updated.len(), "Applied server documents");
        Ok(updated)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
