//! # Domain Types
//!
//! Core domain types used throughout Tally POS.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    CartLine     │   │    Invoice      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (i64)       │   │  product (snap) │   │  id (UUID)      │       │
//! │  │  master_unit_id │   │  quantity (f64) │   │  lines          │       │
//! │  │  conversion     │   │  unit_price     │   │  on_hand_synced │       │
//! │  │  on_hand (f64)  │   │  total_price    │   │  status         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  A product record is one SELLABLE UNIT of a physical good. "Box" and   │
//! │  "Piece" of the same good are two Product rows sharing one physical    │
//! │  stock, linked through master_unit_id / conversion_value.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Unit-Variant Identity
//! - `master_unit_id = None`  ⇒ this record owns the group's physical stock
//! - `master_unit_id = Some(id)` ⇒ variant whose stock is owned by `id`
//! - `conversion_value` converts a quantity in THIS unit to the group's
//!   base unit (`on_hand * conversion_value` is comparable across variants)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A sellable unit-variant of a physical good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier.
    pub id: i64,

    /// Business code (barcode or short code).
    pub code: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Optional category reference.
    pub category_id: Option<i64>,

    /// Whether the product is currently sellable.
    pub is_active: bool,

    /// Soft-delete marker propagated from the remote catalog.
    pub is_deleted: bool,

    /// Cost in the smallest currency unit.
    pub cost_cents: i64,

    /// Sale price in the smallest currency unit.
    pub base_price_cents: i64,

    /// Quantity on hand, expressed in THIS record's unit.
    pub on_hand: f64,

    /// Display label for the unit ("Box", "Piece", ...).
    pub unit: String,

    /// Stock owner: set ⇒ this record is a variant whose physical stock is
    /// owned by the product with this id.
    pub master_unit_id: Option<i64>,

    /// Group-of-record reference from the remote catalog.
    pub master_product_id: Option<i64>,

    /// Multiplier to convert a quantity in this unit to the group's base
    /// unit. Positive real; zero / non-finite values are normalized by the
    /// adjustment engine.
    pub conversion_value: f64,

    /// When the record was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last modified.
    pub modified_at: DateTime<Utc>,
}

impl Product {
    /// The key this product's unit group is indexed under.
    ///
    /// Variants resolve to their stock owner; anchors resolve to themselves.
    #[inline]
    pub fn group_key(&self) -> i64 {
        self.master_unit_id.unwrap_or(self.id)
    }

    /// Returns true if this record is a unit-variant (stock owned elsewhere).
    #[inline]
    pub fn is_variant(&self) -> bool {
        self.master_unit_id.is_some()
    }

    /// Returns the sale price as Money.
    #[inline]
    pub fn base_price(&self) -> Money {
        Money::from_cents(self.base_price_cents)
    }

    /// Returns the cost as Money.
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// Out-of-stock test used by the secondary index.
    #[inline]
    pub fn is_out_of_stock(&self) -> bool {
        self.on_hand <= crate::OUT_OF_STOCK_THRESHOLD
    }
}

// =============================================================================
// Cart Line
// =============================================================================

/// A line in the cart: a snapshot of a Product plus the sold quantity.
///
/// Uses the snapshot pattern to freeze product data at time of selection.
/// `quantity` is expressed in the SELECTED unit, which may differ from the
/// group's base unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    /// Product snapshot at time of selection.
    pub product: Product,

    /// Quantity sold, in the selected unit.
    pub quantity: f64,

    /// Unit price at time of selection (smallest currency unit).
    pub unit_price_cents: i64,

    /// Line total (unit price × quantity, already rounded).
    pub total_price_cents: i64,
}

impl CartLine {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns the line total as Money.
    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }
}

// =============================================================================
// Invoice Status
// =============================================================================

/// Lifecycle status of an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Created at checkout, not yet reviewed.
    Pending,
    /// Amended after creation.
    Edited,
    /// Reviewed and confirmed.
    Checked,
    /// Canceled; stock restored through compensation.
    Canceled,
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        InvoiceStatus::Pending
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvoiceStatus::Pending => write!(f, "pending"),
            InvoiceStatus::Edited => write!(f, "edited"),
            InvoiceStatus::Checked => write!(f, "checked"),
            InvoiceStatus::Canceled => write!(f, "canceled"),
        }
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// A finalized sale.
///
/// Mutated only to flip `on_hand_synced` and `status`; deleted when the
/// remote confirms permanent deletion (which triggers a compensating
/// increase of stock).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Ordered cart lines.
    pub lines: Vec<CartLine>,

    /// When the sale was entered.
    pub created_at: DateTime<Utc>,

    /// Discount applied to the whole invoice (smallest currency unit).
    pub discount_cents: i64,

    /// Customer reference, if any.
    pub customer_id: Option<i64>,

    /// Total price after discount.
    pub total_price_cents: i64,

    /// Total cost of goods sold.
    pub total_cost_cents: i64,

    /// Sum of line quantities (in each line's own unit).
    pub total_quantity: f64,

    /// Amount the customer handed over.
    pub customer_paid_cents: i64,

    /// Outstanding debt (negative change), zero for settled sales.
    pub debt_cents: i64,

    /// Free-form note entered by the cashier.
    pub note: String,

    /// Has the stock effect of this invoice been durably confirmed by the
    /// remote system of record?
    pub on_hand_synced: bool,

    /// Lifecycle status.
    pub status: InvoiceStatus,
}

impl Invoice {
    /// Returns the total price as Money.
    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }

    /// Sums (price, cost, quantity) over a set of cart lines.
    ///
    /// Pure helper used by checkout to derive invoice totals.
    pub fn totals_of(lines: &[CartLine]) -> (Money, Money, f64) {
        let mut price = Money::zero();
        let mut cost = Money::zero();
        let mut quantity = 0.0_f64;

        for line in lines {
            price += line.total_price();
            // Cost is tracked in the line's own unit, like the price.
            let line_cost = (line.product.cost_cents as f64 * line.quantity).round() as i64;
            cost += Money::from_cents(line_cost);
            quantity += line.quantity;
        }

        (price, cost, quantity)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
