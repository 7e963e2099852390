//! Test double for the remote system of record.
//!
//! Scriptable failures per endpoint family plus call recording; the echo
//! behavior (server accepts the client-submitted newOnHand) matches the
//! blind-apply case, and a canned response simulates a concurrent terminal
//! having moved the stock.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{SyncError, SyncResult};
use crate::remote::{BatchResponse, RemoteApi, RemoteProduct};
use tally_core::{CartLine, Invoice, InvoiceStatus, Product, StockRow};

#[derive(Default)]
pub(crate) struct MockRemote {
    pub fail_batch: AtomicBool,
    pub fail_invoices: AtomicBool,
    pub fail_notify: AtomicBool,

    /// Artificial latency on create_invoice, for re-entrancy tests.
    pub invoice_delay_ms: std::sync::atomic::AtomicU64,

    pub batches: Mutex<Vec<Vec<StockRow>>>,
    pub created_invoices: Mutex<Vec<Invoice>>,
    pub updated_invoices: Mutex<Vec<Invoice>>,
    pub deleted_invoices: Mutex<Vec<String>>,
    pub notifications: Mutex<Vec<(i64, f64, Option<i64>)>>,
    pub fetched_ids: Mutex<Vec<Vec<i64>>>,

    /// Canned batch response; None echoes the submitted rows back.
    pub batch_response: Mutex<Option<BatchResponse>>,

    /// Documents served by fetch_products_by_ids.
    pub catalog: Mutex<HashMap<i64, Product>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&self, offline: bool) {
        self.fail_batch.store(offline, Ordering::SeqCst);
        self.fail_invoices.store(offline, Ordering::SeqCst);
        self.fail_notify.store(offline, Ordering::SeqCst);
    }

    pub fn set_batch_response(&self, response: BatchResponse) {
        *self.batch_response.lock().unwrap() = Some(response);
    }

    pub fn seed_catalog(&self, products: Vec<Product>) {
        let mut catalog = self.catalog.lock().unwrap();
        for product in products {
            catalog.insert(product.id, product);
        }
    }

    pub fn batch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    fn offline_err() -> SyncError {
        SyncError::RequestFailed("connection refused".into())
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn push_stock_batch(&self, rows: &[StockRow]) -> SyncResult<BatchResponse> {
        if self.fail_batch.load(Ordering::SeqCst) {
            return Err(Self::offline_err());
        }

        self.batches.lock().unwrap().push(rows.to_vec());

        if let Some(canned) = self.batch_response.lock().unwrap().clone() {
            return Ok(canned);
        }

        // Echo: the server blindly applied the client-submitted newOnHand.
        Ok(BatchResponse {
            updated_products: rows
                .iter()
                .map(|row| RemoteProduct {
                    id: row.product_id,
                    new_on_hand: Some(row.new_on_hand),
                    base_price_cents: None,
                    cost_cents: None,
                    code: None,
                    name: None,
                })
                .collect(),
        })
    }

    async fn create_invoice(&self, invoice: &Invoice) -> SyncResult<()> {
        let delay = self.invoice_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        if self.fail_invoices.load(Ordering::SeqCst) {
            return Err(Self::offline_err());
        }
        self.created_invoices.lock().unwrap().push(invoice.clone());
        Ok(())
    }

    async fn update_invoice(&self, invoice: &Invoice) -> SyncResult<()> {
        if self.fail_invoices.load(Ordering::SeqCst) {
            return Err(Self::offline_err());
        }
        self.updated_invoices.lock().unwrap().push(invoice.clone());
        Ok(())
    }

    async fn delete_invoice(&self, id: &str) -> SyncResult<()> {
        if self.fail_invoices.load(Ordering::SeqCst) {
            return Err(Self::offline_err());
        }
        self.deleted_invoices.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn get_invoice(&self, id: &str) -> SyncResult<Option<Invoice>> {
        if self.fail_invoices.load(Ordering::SeqCst) {
            return Err(Self::offline_err());
        }
        Ok(self
            .created_invoices
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }

    async fn get_invoices_by_date(
        &self,
        date: chrono::NaiveDate,
    ) -> SyncResult<Vec<Invoice>> {
        if self.fail_invoices.load(Ordering::SeqCst) {
            return Err(Self::offline_err());
        }
        Ok(self
            .created_invoices
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.created_at.date_naive() == date)
            .cloned()
            .collect())
    }

    async fn fetch_products_by_ids(&self, ids: &[i64]) -> SyncResult<Vec<Product>> {
        if self.fail_batch.load(Ordering::SeqCst) {
            return Err(Self::offline_err());
        }

        self.fetched_ids.lock().unwrap().push(ids.to_vec());

        let catalog = self.catalog.lock().unwrap();
        Ok(ids.iter().filter_map(|id| catalog.get(id).cloned()).collect())
    }

    async fn notify_on_hand(
        &self,
        product_id: i64,
        on_hand: f64,
        base_price_cents: Option<i64>,
    ) -> SyncResult<()> {
        if self.fail_notify.load(Ordering::SeqCst) {
            return Err(Self::offline_err());
        }
        self.notifications
            .lock()
            .unwrap()
            .push((product_id, on_hand, base_price_cents));
        Ok(())
    }
}

// =============================================================================
// Shared fixtures
// =============================================================================

pub(crate) fn product(
    id: i64,
    master_unit_id: Option<i64>,
    conversion: f64,
    on_hand: f64,
) -> Product {
    let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    Product {
        id,
        code: format!("P{id}"),
        name: format!("Product {id}"),
        category_id: None,
        is_active: true,
        is_deleted: false,
        cost_cents: 8_000,
        base_price_cents: 10_000,
        on_hand,
        unit: String::new(),
        master_unit_id,
        master_product_id: master_unit_id.map(|_| 7).or(Some(7)),
        conversion_value: conversion,
        created_at: ts,
        modified_at: ts,
    }
}

pub(crate) fn line(product: Product, quantity: f64) -> CartLine {
    CartLine {
        product,
        quantity,
        unit_price_cents: 10_000,
        total_price_cents: (10_000.0 * quantity) as i64,
    }
}

pub(crate) fn invoice(id: &str, lines: Vec<CartLine>) -> Invoice {
    let (price, cost, quantity) = Invoice::totals_of(&lines);
    Invoice {
        id: id.to_string(),
        lines,
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap(),
        discount_cents: 0,
        customer_id: None,
        total_price_cents: price.cents(),
        total_cost_cents: cost.cents(),
        total_quantity: quantity,
        customer_paid_cents: price.cents(),
        debt_cents: 0,
        note: String::new(),
        on_hand_synced: false,
        status: InvoiceStatus::Pending,
    }
}
