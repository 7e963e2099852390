//! # Retry Notifier
//!
//! Bounded in-memory queue of on-hand/price notifications that failed to
//! reach the backend, flushed opportunistically.
//!
//! ## Queue Behavior
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  notify(id, on_hand) ── send ok ──► done                               │
//! │        │                                                                │
//! │        └── send failed ──► push_back                                   │
//! │                               │  (len > limit → drop OLDEST)           │
//! │                               ▼                                         │
//! │  flush(): pop_front → send → ok → next                                 │
//! │                         │                                               │
//! │                         └─ failed → entry returns to the FRONT,        │
//! │                            flushing stops; the rest wait their turn    │
//! │                                                                         │
//! │  Notifications are a fan-out convenience for other terminals, not     │
//! │  the system of record; dropping the oldest under pressure is safe     │
//! │  because reconciliation carries the same values authoritatively.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::remote::RemoteApi;

// =============================================================================
// Pending Notification
// =============================================================================

/// One queued on-hand/price notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingNotification {
    pub product_id: i64,
    pub on_hand: f64,
    pub base_price_cents: Option<i64>,
    pub queued_at: DateTime<Utc>,
}

// =============================================================================
// Retry Notifier
// =============================================================================

/// Bounded retry queue for failed on-hand notifications.
pub struct RetryNotifier {
    remote: Arc<dyn RemoteApi>,
    queue: Mutex<VecDeque<PendingNotification>>,
    limit: usize,
}

impl RetryNotifier {
    /// Creates a notifier with the given queue limit.
    pub fn new(remote: Arc<dyn RemoteApi>, limit: usize) -> Self {
        RetryNotifier {
            remote,
            queue: Mutex::new(VecDeque::new()),
            limit,
        }
    }

    /// Sends one notification, queueing it on failure.
    pub async fn notify(&self, product_id: i64, on_hand: f64, base_price_cents: Option<i64>) {
        match self
            .remote
            .notify_on_hand(product_id, on_hand, base_price_cents)
            .await
        {
            Ok(()) => debug!(product_id, on_hand, "On-hand notification sent"),
            Err(e) => {
                warn!(product_id, error = %e, "Notify failed; queueing for later flush");
                self.enqueue(product_id, on_hand, base_price_cents).await;
            }
        }
    }

    /// Queues a notification without attempting a send.
    pub async fn enqueue(&self, product_id: i64, on_hand: f64, base_price_cents: Option<i64>) {
        let mut queue = self.queue.lock().await;

        queue.push_back(PendingNotification {
            product_id,
            on_hand,
            base_price_cents,
            queued_at: Utc::now(),
        });

        // Bounded: drop the oldest beyond the limit.
        while queue.len() > self.limit {
            let dropped = queue.pop_front();
            if let Some(dropped) = dropped {
                warn!(
                    product_id = dropped.product_id,
                    "Notification queue over limit; oldest entry dropped"
                );
            }
        }
    }

    /// Flushes queued notifications sequentially.
    ///
    /// On the first failure the entry returns to the front and flushing
    /// stops; everything behind it stays queued for the next opportunity.
    /// Returns the number of notifications delivered.
    pub async fn flush(&self) -> usize {
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            return 0;
        }

        debug!(pending = queue.len(), "Flushing pending on-hand notifications");
        let mut sent = 0;

        while let Some(entry) = queue.pop_front() {
            let result = self
                .remote
                .notify_on_hand(entry.product_id, entry.on_hand, entry.base_price_cents)
                .await;

            match result {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(
                        product_id = entry.product_id,
                        error = %e,
                        "Flush interrupted; notification requeued"
                    );
                    queue.push_front(entry);
                    break;
                }
            }
        }

        sent
    }

    /// Number of queued notifications.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Returns true if nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
