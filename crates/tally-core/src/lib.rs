//! # tally-core: Pure Business Logic for Tally POS
//!
//! This crate is the **heart** of the multi-unit inventory engine. It
//! contains all business logic as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    UI layer (checkout actions)                  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ library calls                          │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-sync (engine)                          │   │
//! │  │    checkout, optimistic apply, offline queue, reconciler        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌───────────┐ │   │
//! │  │   │   types   │  │ grouping  │  │ adjustment │  │ validation│ │   │
//! │  │   │  Product  │  │ UnitGroup │  │   deltas   │  │   rules   │ │   │
//! │  │   │  Invoice  │  │   Index   │  │ stock rows │  │   checks  │ │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └───────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-store (SQLite)                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, CartLine, Invoice)
//! - [`grouping`] - Unit group index (variants sharing one physical stock)
//! - [`adjustment`] - Delta engine: cart lines → signed per-product deltas
//! - [`validation`] - Checkout validation rules
//! - [`money`] - Integer minor-unit money type
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: Prices are i64 minor units; only stock quantities are f64
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod adjustment;
pub mod error;
pub mod grouping;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use tally_core::Product` instead of
// `use tally_core::types::Product`

pub use adjustment::{build_stock_rows, compute_deltas, Operation, PendingDelta, StockRow};
pub use error::{CoreError, CoreResult, ValidationError};
pub use grouping::UnitGroupIndex;
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// On-hand at or below this value places a product in the out-of-stock
/// secondary index.
pub const OUT_OF_STOCK_THRESHOLD: f64 = 0.0;

/// Maximum lines allowed in a single cart.
///
/// Prevents runaway carts (a scanner wedged on repeat) from producing
/// megabyte invoices.
pub const MAX_CART_LINES: usize = 200;
