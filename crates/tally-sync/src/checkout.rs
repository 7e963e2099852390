//! # Checkout Engine
//!
//! Orchestrates the sale flow: validation, invoice construction, the
//! online/offline branch, optimistic stock apply and reconciliation.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  checkout(cart, options)                                               │
//! │       │                                                                 │
//! │       ├─ re-entrancy guard (one checkout per terminal)                 │
//! │       ├─ validate cart / debt customer                                 │
//! │       ├─ advisory stock check (reported, NEVER blocks the sale)        │
//! │       ├─ build invoice (on_hand_synced = false)                        │
//! │       │                                                                 │
//! │       ├─ ONLINE:  push invoice ── ok ──► secondary mirror (spawned)    │
//! │       │                │                                               │
//! │       │                └─ failed ──► queue offline                     │
//! │       ├─ OFFLINE: queue offline                                        │
//! │       │                                                                 │
//! │       ├─ compute deltas → OPTIMISTIC APPLY (store only, no network)    │
//! │       ├─ notify new on-hand values (failures feed the retry queue)     │
//! │       │                                                                 │
//! │       └─ reconciliation batch with the pre-adjustment snapshot         │
//! │              ├─ ok:    server documents overwrite local,               │
//! │              │         on_hand_synced = true                           │
//! │              └─ fail:  stays false; invoice queued or flagged          │
//! │                        for a later replay. The sale is FINAL from      │
//! │                        this terminal's perspective either way.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The guard is a plain flag on this engine instance, not a cross-process
//! lock: two terminals are expected to race, and the server-wins pull is
//! what resolves them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::applier::{AppliedStock, OptimisticApplier};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::notifier::RetryNotifier;
use crate::outbox::{OfflineInvoiceQueue, ReplayReport};
use crate::reconciler::RemoteReconciler;
use crate::remote::RemoteApi;
use crate::secondary::SecondaryInventory;
use crate::snapshot::GroupSnapshotCache;
use tally_core::validation::{check_sufficient_stock, validate_cart, validate_customer_for_debt, StockShortage};
use tally_core::{compute_deltas, CartLine, Invoice, InvoiceStatus, Money, Operation};
use tally_store::{Database, StoreError};

// =============================================================================
// Options & Outcome
// =============================================================================

/// Caller-supplied parameters for one checkout.
#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    /// Force the offline path (the caller owns connectivity detection).
    pub offline: bool,

    /// Invoice-level discount.
    pub discount_cents: i64,

    /// Customer reference; required when the sale leaves debt.
    pub customer_id: Option<i64>,

    /// Amount handed over by the customer.
    pub customer_paid_cents: i64,

    /// Cashier note.
    pub note: String,
}

/// What one checkout did.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    /// The invoice as persisted (locally and/or queued).
    pub invoice: Invoice,

    /// Whether the invoice document reached the remote during checkout.
    pub sent_online: bool,

    /// Advisory shortages detected before the sale. Never blocks.
    pub shortages: Vec<StockShortage>,

    /// Pre/post on-hand values from the optimistic apply.
    pub applied: AppliedStock,
}

// =============================================================================
// Checkout Engine
// =============================================================================

/// The engine a UI layer drives. One instance per terminal.
pub struct CheckoutEngine {
    db: Database,
    remote: Arc<dyn RemoteApi>,
    applier: OptimisticApplier,
    reconciler: Arc<RemoteReconciler>,
    snapshots: Arc<GroupSnapshotCache>,
    queue: Arc<OfflineInvoiceQueue>,
    notifier: Arc<RetryNotifier>,
    secondary: Arc<dyn SecondaryInventory>,
    checkout_in_flight: AtomicBool,
}

impl CheckoutEngine {
    /// Wires the engine from its collaborators.
    pub fn new(
        config: &SyncConfig,
        db: Database,
        remote: Arc<dyn RemoteApi>,
        secondary: Arc<dyn SecondaryInventory>,
    ) -> Self {
        let applier = OptimisticApplier::new(db.clone(), config.replay.clone());
        let reconciler = Arc::new(RemoteReconciler::new(db.clone(), remote.clone()));
        let snapshots = Arc::new(GroupSnapshotCache::new(Duration::from_secs(
            config.snapshot.ttl_secs,
        )));
        let notifier = Arc::new(RetryNotifier::new(
            remote.clone(),
            config.notifier.queue_limit,
        ));
        let queue = Arc::new(OfflineInvoiceQueue::new(
            db.clone(),
            remote.clone(),
            reconciler.clone(),
            snapshots.clone(),
            secondary.clone(),
        ));

        CheckoutEngine {
            db,
            remote,
            applier,
            reconciler,
            snapshots,
            queue,
            notifier,
            secondary,
            checkout_in_flight: AtomicBool::new(false),
        }
    }

    /// The offline replay queue (for manual/periodic sync passes).
    pub fn queue(&self) -> &Arc<OfflineInvoiceQueue> {
        &self.queue
    }

    /// The retry notifier (for opportunistic flushes).
    pub fn notifier(&self) -> &Arc<RetryNotifier> {
        &self.notifier
    }

    /// The grouped snapshot cache (invalidate on catalog refresh).
    pub fn snapshots(&self) -> &Arc<GroupSnapshotCache> {
        &self.snapshots
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Runs one checkout.
    ///
    /// Fails ONLY on validation, re-entrancy, or local infrastructure
    /// errors. Network failures downstream of a validated sale degrade to
    /// "queued / unsynced" and are reported through the outcome, never as
    /// an error: the cashier-entered sale is final.
    pub async fn checkout(
        &self,
        lines: Vec<CartLine>,
        options: CheckoutOptions,
    ) -> SyncResult<CheckoutOutcome> {
        let _guard = self.acquire_guard()?;

        // ------------------------------------------------------------------
        // Validation
        // ------------------------------------------------------------------
        validate_cart(&lines)?;

        let (gross, cost, quantity) = Invoice::totals_of(&lines);
        let total = gross.apply_discount(Money::from_cents(options.discount_cents));
        let change_cents = options.customer_paid_cents - total.cents();
        validate_customer_for_debt(change_cents, options.customer_id.is_some())?;

        let index = self.snapshots.get_or_refresh(&self.db).await?;

        // Advisory only: surfaced to the caller, the sale proceeds.
        let shortages = check_sufficient_stock(&lines, &index);
        if !shortages.is_empty() {
            warn!(groups = shortages.len(), "Checkout proceeding with insufficient stock");
        }

        // ------------------------------------------------------------------
        // Invoice construction
        // ------------------------------------------------------------------
        let mut invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            lines,
            created_at: chrono::Utc::now(),
            discount_cents: options.discount_cents,
            customer_id: options.customer_id,
            total_price_cents: total.cents(),
            total_cost_cents: cost.cents(),
            total_quantity: quantity,
            customer_paid_cents: options.customer_paid_cents,
            debt_cents: change_cents.min(0),
            note: options.note,
            on_hand_synced: false,
            status: InvoiceStatus::Pending,
        };

        // ------------------------------------------------------------------
        // Send or queue the invoice document
        // ------------------------------------------------------------------
        let sent_online = if options.offline {
            info!(id = %invoice.id, "Offline checkout; queueing invoice");
            self.queue.enqueue(&invoice).await?;
            false
        } else {
            match self.remote.create_invoice(&invoice).await {
                Ok(()) => {
                    info!(id = %invoice.id, "Invoice sent online");

                    // Best-effort mirror, off the cashier path.
                    let secondary = self.secondary.clone();
                    let mirror_invoice = invoice.clone();
                    let mirror_index = index.clone();
                    tokio::spawn(async move {
                        secondary
                            .push_invoice(&mirror_invoice, &mirror_index, Operation::Decrease)
                            .await;
                    });

                    true
                }
                Err(e) => {
                    warn!(id = %invoice.id, error = %e, "Invoice push failed; queueing offline");
                    self.queue.enqueue(&invoice).await?;
                    false
                }
            }
        };

        // ------------------------------------------------------------------
        // Optimistic local apply (store I/O only)
        // ------------------------------------------------------------------
        let deltas = compute_deltas(&invoice.lines, &index, Operation::Decrease);
        let applied = self.applier.apply(&deltas, &index).await?;

        // Tell the backend (and through it, other terminals) what this
        // terminal now believes; failures land in the retry queue.
        for (&product_id, &on_hand) in &applied.new_on_hand {
            self.notifier.notify(product_id, on_hand, None).await;
        }

        // ------------------------------------------------------------------
        // Reconciliation batch (both paths attempt it immediately)
        // ------------------------------------------------------------------
        match self
            .reconciler
            .reconcile(&invoice, &index, &applied.pre_adjustment, Operation::Decrease)
            .await
        {
            Ok(_) => {
                invoice.on_hand_synced = true;
                if !sent_online {
                    // Batch landed but the invoice document didn't; the
                    // queue entry keeps the flag so replay skips the
                    // second stock effect.
                    self.db
                        .offline_invoices()
                        .mark_on_hand_synced(&invoice.id, true)
                        .await?;
                }
            }
            Err(e) => {
                warn!(id = %invoice.id, error = %e, "Reconciliation batch failed; will retry later");
            }
        }

        if sent_online {
            // Canonical local record, flag reflecting the batch outcome.
            self.db.invoices().put(&invoice).await?;

            // Final pull: re-fetch the sold products' canonical documents
            // so edits made by other terminals during this checkout land
            // too. Failure only costs freshness.
            let sold_ids: Vec<i64> = invoice.lines.iter().map(|l| l.product.id).collect();
            match self.remote.fetch_products_by_ids(&sold_ids).await {
                Ok(fresh) if !fresh.is_empty() => {
                    self.db.products().put_many(&fresh).await?;
                    self.snapshots.invalidate().await;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Post-checkout product pull failed"),
            }

            // Connectivity is evidently back: drain what accumulated.
            let notifier = self.notifier.clone();
            tokio::spawn(async move {
                notifier.flush().await;
            });
        }

        Ok(CheckoutOutcome {
            invoice,
            sent_online,
            shortages,
            applied,
        })
    }

    // =========================================================================
    // Sync Pass
    // =========================================================================

    /// One manual/periodic sync pass: replay the offline queue, retry
    /// canonical invoices whose batch never landed, then flush queued
    /// notifications.
    pub async fn sync_pass(&self) -> SyncResult<ReplayReport> {
        let mut report = self.queue.sync_all().await?;

        let retried = self.queue.retry_unsynced().await?;
        report.synced.extend(retried.synced);
        report.failed.extend(retried.failed);

        self.notifier.flush().await;

        Ok(report)
    }

    // =========================================================================
    // Catalog / Invoice Refresh
    // =========================================================================

    /// Ingests a full catalog snapshot (external sync event).
    ///
    /// The group index is never patched in place; ingesting invalidates it
    /// so the next checkout rebuilds wholesale.
    pub async fn ingest_catalog(&self, products: &[tally_core::Product]) -> SyncResult<()> {
        self.db.products().put_many(products).await?;
        self.snapshots.invalidate().await;
        info!(count = products.len(), "Catalog ingested");
        Ok(())
    }

    /// Pulls the canonical invoices for one business day and upserts them
    /// locally. Polling replacement for push notifications.
    pub async fn refresh_invoices_for_date(
        &self,
        date: chrono::NaiveDate,
    ) -> SyncResult<usize> {
        let invoices = self.remote.get_invoices_by_date(date).await?;
        for invoice in &invoices {
            self.db.invoices().put(invoice).await?;
        }
        Ok(invoices.len())
    }

    // =========================================================================
    // Deletion / Cancellation Compensation
    // =========================================================================

    /// Deletes an invoice everywhere, restoring its stock effect when it
    /// had already synced.
    ///
    /// The remote deletion must be confirmed BEFORE compensation runs;
    /// otherwise a failed delete would restore stock for a sale that still
    /// exists.
    pub async fn delete_invoice(&self, invoice_id: &str) -> SyncResult<()> {
        let invoice = self
            .db
            .invoices()
            .get(invoice_id)
            .await?
            .ok_or_else(|| SyncError::Store(StoreError::not_found("Invoice", invoice_id)))?;

        self.remote.delete_invoice(invoice_id).await?;

        if invoice.on_hand_synced {
            self.reconciler.compensate_deletion(&invoice).await?;
            self.mirror_restore(&invoice).await;
        }

        self.db.invoices().delete(invoice_id).await?;
        self.snapshots.invalidate().await;

        info!(id = %invoice_id, "Invoice deleted and stock restored");
        Ok(())
    }

    /// Cancels an invoice in place (status flip) with the same stock
    /// compensation as deletion.
    pub async fn cancel_invoice(&self, invoice_id: &str) -> SyncResult<()> {
        let mut invoice = self
            .db
            .invoices()
            .get(invoice_id)
            .await?
            .ok_or_else(|| SyncError::Store(StoreError::not_found("Invoice", invoice_id)))?;

        invoice.status = InvoiceStatus::Canceled;
        self.remote.update_invoice(&invoice).await?;

        if invoice.on_hand_synced {
            self.reconciler.compensate_deletion(&invoice).await?;
            self.mirror_restore(&invoice).await;
        }

        self.db
            .invoices()
            .set_status(invoice_id, InvoiceStatus::Canceled)
            .await?;
        self.snapshots.invalidate().await;

        info!(id = %invoice_id, "Invoice canceled and stock restored");
        Ok(())
    }

    /// Fire-and-forget secondary restore (Increase direction).
    async fn mirror_restore(&self, invoice: &Invoice) {
        let Ok(index) = self.snapshots.get_or_refresh(&self.db).await else {
            return;
        };
        let secondary = self.secondary.clone();
        let invoice = invoice.clone();
        tokio::spawn(async move {
            secondary
                .push_invoice(&invoice, &index, Operation::Increase)
                .await;
        });
    }

    // =========================================================================
    // Re-entrancy Guard
    // =========================================================================

    fn acquire_guard(&self) -> SyncResult<CheckoutGuard<'_>> {
        if self
            .checkout_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::CheckoutInProgress);
        }
        Ok(CheckoutGuard(&self.checkout_in_flight))
    }
}

/// Clears the in-flight flag on every exit path.
struct CheckoutGuard<'a>(&'a AtomicBool);

impl Drop for CheckoutGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
