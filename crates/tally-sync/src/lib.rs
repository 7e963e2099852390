//! # tally-sync: Offline-First Sync Engine for Tally POS
//!
//! This crate keeps per-unit stock counts correct across unit-variants of
//! the same physical good while the terminal runs online or offline, and
//! while other terminals edit the same stock concurrently.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                  CheckoutEngine (Main Orchestrator)              │  │
//! │  │                                                                  │  │
//! │  │  One instance per terminal; UI layers call it as a library      │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ Optimistic     │  │ RemoteReconcil.│  │ OfflineInvoiceQueue    │    │
//! │  │ Applier        │  │                │  │                        │    │
//! │  │ Local writes   │  │ One batch call │  │ Durable queue +        │    │
//! │  │ on the cashier │  │ then server-   │  │ sequential replay      │    │
//! │  │ path, no net   │  │ wins overwrite │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ RetryNotifier  │  │ GroupSnapshot  │  │ SecondaryInventory     │    │
//! │  │ bounded queue, │  │ Cache (TTL +   │  │ best-effort mirror,    │    │
//! │  │ opportunistic  │  │ invalidate)    │  │ failures isolated      │    │
//! │  │ flush          │  │                │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`checkout`] - Checkout orchestration and the re-entrancy guard
//! - [`applier`] - Optimistic local apply with pre-adjustment snapshots
//! - [`outbox`] - Offline invoice queue and sequential replay
//! - [`reconciler`] - Batch push + server-wins pull
//! - [`remote`] - REST contract, defensive normalization, `RemoteApi` seam
//! - [`secondary`] - Secondary inventory platform mirror
//! - [`notifier`] - Bounded retry queue for on-hand notifications
//! - [`snapshot`] - TTL cache of the unit group index
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Sync error types and retry categorization
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_sync::{CheckoutEngine, CheckoutOptions, SyncConfig};
//! use tally_sync::remote::HttpRemote;
//! use tally_sync::secondary::HttpSecondary;
//! use tally_store::{Database, DbConfig};
//! use std::sync::Arc;
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new("tally.db")).await?;
//! let remote = Arc::new(HttpRemote::new(&config.remote)?);
//! let secondary = Arc::new(HttpSecondary::new(config.secondary.clone()));
//!
//! let engine = CheckoutEngine::new(&config, db, remote, secondary);
//!
//! // Cashier path
//! let outcome = engine.checkout(cart_lines, CheckoutOptions::default()).await?;
//!
//! // Manual/periodic sync pass
//! let report = engine.queue().sync_all().await?;
//! engine.notifier().flush().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod applier;
pub mod checkout;
pub mod config;
pub mod error;
pub mod notifier;
pub mod outbox;
pub mod reconciler;
pub mod remote;
pub mod secondary;
pub mod snapshot;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use applier::{AppliedStock, OptimisticApplier};
pub use checkout::{CheckoutEngine, CheckoutOptions, CheckoutOutcome};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use notifier::{PendingNotification, RetryNotifier};
pub use outbox::{OfflineInvoiceQueue, ReplayReport};
pub use reconciler::{BatchResult, RemoteReconciler};
pub use remote::{BatchResponse, HttpRemote, RemoteApi, RemoteProduct};
pub use secondary::{HttpSecondary, SecondaryInventory, SecondaryResult};
pub use snapshot::GroupSnapshotCache;
