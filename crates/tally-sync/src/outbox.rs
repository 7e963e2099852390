//! # Offline Invoice Queue
//!
//! Replay of invoices whose remote push has not yet succeeded.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Created ──┬── push ok ───────────► SentOnline ──► (Synced once the   │
//! │             │                                        batch lands too)  │
//! │             └── offline / push err ► Queued                            │
//! │                                        │                                │
//! │                 ┌──────────────────────┤ manual or periodic replay     │
//! │                 │                      ▼                                │
//! │                 │            invoice push → batch push (FRESH          │
//! │                 │            snapshot read at replay time)             │
//! │                 │                      │                                │
//! │                 │        ┌── any failure: stays Queued, local stock    │
//! │                 └────────┘   untouched (the sale already happened)     │
//! │                                        │                                │
//! │                                        ▼ both succeeded                 │
//! │                              Synced: canonical store, queue entry      │
//! │                              removed, on_hand_synced = true            │
//! │                                                                         │
//! │   Replay is strictly SEQUENTIAL: one invoice's snapshot-then-push      │
//! │   completes before the next starts, so two queued invoices touching    │
//! │   the same product cannot double-count each other's deltas.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};
use crate::reconciler::RemoteReconciler;
use crate::remote::RemoteApi;
use crate::secondary::SecondaryInventory;
use crate::snapshot::GroupSnapshotCache;
use tally_core::{compute_deltas, Invoice, Operation};
use tally_store::Database;

// =============================================================================
// Replay Report
// =============================================================================

/// Outcome of a full queue replay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplayReport {
    /// Invoice ids that reached the remote and left the queue.
    pub synced: Vec<String>,

    /// Invoice ids that failed and stay queued.
    pub failed: Vec<String>,
}

impl ReplayReport {
    /// True when every queued invoice synced.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

// =============================================================================
// Offline Invoice Queue
// =============================================================================

/// The durable offline queue plus its replay logic.
pub struct OfflineInvoiceQueue {
    db: Database,
    remote: Arc<dyn RemoteApi>,
    reconciler: Arc<RemoteReconciler>,
    snapshots: Arc<GroupSnapshotCache>,
    secondary: Arc<dyn SecondaryInventory>,
}

impl OfflineInvoiceQueue {
    /// Creates the queue facade.
    pub fn new(
        db: Database,
        remote: Arc<dyn RemoteApi>,
        reconciler: Arc<RemoteReconciler>,
        snapshots: Arc<GroupSnapshotCache>,
        secondary: Arc<dyn SecondaryInventory>,
    ) -> Self {
        OfflineInvoiceQueue {
            db,
            remote,
            reconciler,
            snapshots,
            secondary,
        }
    }

    /// Queues an invoice for later replay (`on_hand_synced` forced false
    /// unless the batch already landed through the checkout path).
    pub async fn enqueue(&self, invoice: &Invoice) -> SyncResult<()> {
        info!(id = %invoice.id, "Queueing invoice for offline replay");
        self.db.offline_invoices().put(invoice).await?;
        Ok(())
    }

    /// Lists queued invoices in replay order.
    pub async fn pending(&self) -> SyncResult<Vec<Invoice>> {
        Ok(self.db.offline_invoices().get_all().await?)
    }

    /// Replays a single queued invoice.
    ///
    /// Both pushes must succeed before the entry leaves the queue; any
    /// failure keeps it queued and propagates the error so callers can
    /// report it. Local stock is never rolled back here.
    pub async fn sync_one(&self, invoice_id: &str) -> SyncResult<()> {
        let invoice = self
            .db
            .offline_invoices()
            .get(invoice_id)
            .await?
            .ok_or_else(|| SyncError::NotQueued(invoice_id.to_string()))?;

        // Remote invoice document first.
        self.remote.create_invoice(&invoice).await?;

        // The stock batch may already have landed through the checkout
        // path; a crash between flag write and queue delete leaves such an
        // entry behind.
        if !invoice.on_hand_synced {
            self.reconcile_fresh(&invoice).await?;
        }

        // Both pushes landed: promote to the canonical store and leave the
        // queue.
        let mut synced = invoice.clone();
        synced.on_hand_synced = true;
        self.db.invoices().put(&synced).await?;
        self.db
            .offline_invoices()
            .mark_on_hand_synced(invoice_id, true)
            .await?;
        self.db.offline_invoices().delete(invoice_id).await?;

        info!(id = %invoice_id, "Offline invoice synced");

        // Best-effort mirror; failures are already isolated inside.
        let index = self.snapshots.get_or_refresh(&self.db).await?;
        let _ = self
            .secondary
            .push_invoice(&synced, &index, Operation::Decrease)
            .await;

        Ok(())
    }

    /// Retries the stock batch for canonical invoices that reached the
    /// remote with their batch unconfirmed (sent online while the batch
    /// endpoint was failing). They are not literally in the offline
    /// queue, but their stock effect is still owed to the remote.
    pub async fn retry_unsynced(&self) -> SyncResult<ReplayReport> {
        let pending = self.db.invoices().get_unsynced().await?;
        if pending.is_empty() {
            return Ok(ReplayReport::default());
        }

        info!(count = pending.len(), "Retrying unsynced canonical invoices");
        let mut report = ReplayReport::default();

        for invoice in pending {
            match self.reconcile_fresh(&invoice).await {
                Ok(()) => {
                    self.db
                        .invoices()
                        .set_on_hand_synced(&invoice.id, true)
                        .await?;
                    report.synced.push(invoice.id);
                }
                Err(e) => {
                    warn!(id = %invoice.id, error = %e, "Unsynced invoice retry failed");
                    report.failed.push(invoice.id);
                }
            }
        }

        Ok(report)
    }

    /// Reconciles one invoice with a FRESH pre-adjustment snapshot.
    ///
    /// The on-hand the cashier saw at sale time is long gone; a replayed
    /// batch must report what is true at replay time.
    async fn reconcile_fresh(&self, invoice: &Invoice) -> SyncResult<()> {
        let index = self.snapshots.get_or_refresh(&self.db).await?;

        let deltas = compute_deltas(&invoice.lines, &index, Operation::Decrease);
        let mut snapshot = BTreeMap::new();
        for &product_id in deltas.keys() {
            let current = match self.db.products().get(product_id).await? {
                Some(product) => Some(product.on_hand),
                None => index.find_product(product_id).map(|p| p.on_hand),
            };
            if let Some(current) = current {
                snapshot.insert(product_id, current);
            }
        }

        self.reconciler
            .reconcile(invoice, &index, &snapshot, Operation::Decrease)
            .await?;
        Ok(())
    }

    /// Replays the whole queue sequentially.
    ///
    /// Never fails as a whole: per-invoice failures are collected in the
    /// report and those invoices stay queued for the next pass.
    pub async fn sync_all(&self) -> SyncResult<ReplayReport> {
        let pending = self.pending().await?;
        if pending.is_empty() {
            return Ok(ReplayReport::default());
        }

        info!(count = pending.len(), "Replaying offline invoice queue");
        let mut report = ReplayReport::default();

        for invoice in pending {
            match self.sync_one(&invoice.id).await {
                Ok(()) => report.synced.push(invoice.id),
                Err(e) => {
                    warn!(id = %invoice.id, error = %e, "Offline invoice replay failed");
                    report.failed.push(invoice.id);
                }
            }
        }

        info!(
            synced = report.synced.len(),
            failed = report.failed.len(),
            "Offline replay finished"
        );

        Ok(report)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SecondarySettings;
    use crate::secondary::HttpSecondary;
    use crate::testing::{invoice, line, product, MockRemote};
    use std::time::Duration;
    use tally_store::DbConfig;

    async fn setup() -> (Database, Arc<MockRemote>, OfflineInvoiceQueue) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let remote = Arc::new(MockRemote::new());
        let reconciler = Arc::new(RemoteReconciler::new(db.clone(), remote.clone()));
        let snapshots = Arc::new(GroupSnapshotCache::new(Duration::ZERO));
        let secondary = Arc::new(HttpSecondary::new(SecondarySettings::default()));

        let queue = OfflineInvoiceQueue::new(
            db.clone(),
            remote.clone(),
            reconciler,
            snapshots,
            secondary,
        );
        (db, remote, queue)
    }

    async fn seed_box_piece(db: &Database) {
        db.products()
            .put_many(&[product(1, None, 1.0, 10.0), product(2, Some(1), 0.1, 100.0)])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_offline_invoice_is_durable_and_unsynced() {
        let (_db, _remote, queue) = setup().await;

        let inv = invoice("inv-1", vec![line(product(2, Some(1), 0.1, 100.0), 2.0)]);
        queue.enqueue(&inv).await.unwrap();

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "inv-1");
        assert!(!pending[0].on_hand_synced);
    }

    #[tokio::test]
    async fn test_sync_one_pushes_and_dequeues() {
        let (db, remote, queue) = setup().await;
        seed_box_piece(&db).await;

        let inv = invoice("inv-1", vec![line(product(2, Some(1), 0.1, 100.0), 2.0)]);
        queue.enqueue(&inv).await.unwrap();

        queue.sync_one("inv-1").await.unwrap();

        // Gone from the queue, present in the canonical store, flagged.
        assert!(queue.pending().await.unwrap().is_empty());
        let canonical = db.invoices().get("inv-1").await.unwrap().unwrap();
        assert!(canonical.on_hand_synced);

        // Remote saw the invoice and exactly one batch.
        assert_eq!(remote.created_invoices.lock().unwrap().len(), 1);
        assert_eq!(remote.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_replay_snapshot_is_read_fresh() {
        let (db, remote, queue) = setup().await;
        seed_box_piece(&db).await;

        let inv = invoice("inv-1", vec![line(product(2, Some(1), 0.1, 100.0), 2.0)]);
        queue.enqueue(&inv).await.unwrap();

        // Stock moved between checkout and replay (checkout already applied
        // the optimistic decrease, another sale moved it further).
        db.products().set_on_hand(1, 6.0).await.unwrap();
        db.products().set_on_hand(2, 60.0).await.unwrap();

        queue.sync_one("inv-1").await.unwrap();

        let batches = remote.batches.lock().unwrap();
        let rows = &batches[0];
        let box_row = rows.iter().find(|r| r.product_id == 1).unwrap();
        assert!((box_row.current_on_hand - 6.0).abs() < 1e-9);
        assert!((box_row.new_on_hand - 5.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_invoice_push_failure_keeps_entry_queued() {
        let (_db, remote, queue) = setup().await;

        let inv = invoice("inv-1", vec![line(product(2, Some(1), 0.1, 100.0), 2.0)]);
        queue.enqueue(&inv).await.unwrap();

        remote.set_offline(true);
        assert!(queue.sync_one("inv-1").await.is_err());

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(!pending[0].on_hand_synced);
    }

    #[tokio::test]
    async fn test_batch_failure_keeps_entry_queued() {
        let (db, remote, queue) = setup().await;
        seed_box_piece(&db).await;

        let inv = invoice("inv-1", vec![line(product(2, Some(1), 0.1, 100.0), 2.0)]);
        queue.enqueue(&inv).await.unwrap();

        // Invoice endpoint up, batch endpoint down.
        remote
            .fail_batch
            .store(true, std::sync::atomic::Ordering::SeqCst);

        assert!(queue.sync_one("inv-1").await.is_err());
        assert_eq!(queue.pending().await.unwrap().len(), 1);

        // Local stock was NOT rolled back (still whatever it was).
        let local = db.products().get(1).await.unwrap().unwrap();
        assert!((local.on_hand - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_already_synced_entry_skips_batch() {
        let (db, remote, queue) = setup().await;
        seed_box_piece(&db).await;

        // Crash leftover: flag set but entry never deleted.
        let mut inv = invoice("inv-1", vec![line(product(2, Some(1), 0.1, 100.0), 2.0)]);
        inv.on_hand_synced = true;
        db.offline_invoices().put(&inv).await.unwrap();

        queue.sync_one("inv-1").await.unwrap();

        assert!(queue.pending().await.unwrap().is_empty());
        assert_eq!(remote.batch_count(), 0); // no second stock effect
    }

    #[tokio::test]
    async fn test_sync_all_is_sequential_and_reports() {
        let (db, remote, queue) = setup().await;
        seed_box_piece(&db).await;

        queue
            .enqueue(&invoice("inv-1", vec![line(product(2, Some(1), 0.1, 100.0), 2.0)]))
            .await
            .unwrap();
        queue
            .enqueue(&invoice("inv-2", vec![line(product(1, None, 1.0, 10.0), 1.0)]))
            .await
            .unwrap();

        let report = queue.sync_all().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.synced, vec!["inv-1".to_string(), "inv-2".to_string()]);
        assert_eq!(remote.batch_count(), 2);
        assert!(queue.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_all_collects_failures() {
        let (_db, remote, queue) = setup().await;

        queue
            .enqueue(&invoice("inv-1", vec![line(product(2, Some(1), 0.1, 100.0), 2.0)]))
            .await
            .unwrap();

        remote.set_offline(true);
        let report = queue.sync_all().await.unwrap();

        assert!(!report.is_clean());
        assert_eq!(report.failed, vec!["inv-1".to_string()]);
        assert_eq!(queue.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_unsynced_canonical_invoice() {
        let (db, remote, queue) = setup().await;
        seed_box_piece(&db).await;

        // Sent online, batch never landed.
        let mut inv = invoice("inv-1", vec![line(product(2, Some(1), 0.1, 100.0), 2.0)]);
        inv.on_hand_synced = false;
        db.invoices().put(&inv).await.unwrap();

        let report = queue.retry_unsynced().await.unwrap();
        assert_eq!(report.synced, vec!["inv-1".to_string()]);
        assert_eq!(remote.batch_count(), 1);

        let refreshed = db.invoices().get("inv-1").await.unwrap().unwrap();
        assert!(refreshed.on_hand_synced);

        // A second pass finds nothing to do.
        let report = queue.retry_unsynced().await.unwrap();
        assert!(report.synced.is_empty());
        assert_eq!(remote.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_sync_one_unknown_id() {
        let (_db, _remote, queue) = setup().await;
        let err = queue.sync_one("ghost").await.unwrap_err();
        assert!(matches!(err, SyncError::NotQueued(_)));
    }
}
