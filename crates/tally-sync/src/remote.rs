//! # Remote System of Record
//!
//! The narrow REST contract with the backend, plus defensive response
//! normalization.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Remote Endpoints (narrow contract)                  │
//! │                                                                         │
//! │  PUT  /api/products/update_onhand_batch                                │
//! │       body:  [{productId, currentOnHand, delta, minus, plus,           │
//! │               newOnHand}, ...]                                         │
//! │       reply: {updated_products: [{Id, new_OnHand, ...}]}               │
//! │                                                                         │
//! │  POST   /api/invoices            create                                │
//! │  PUT    /api/invoices/{id}       update                                │
//! │  DELETE /api/invoices/{id}       delete                                │
//! │  GET    /api/invoices/{id}       fetch canonical document              │
//! │                                                                         │
//! │  POST /api/products/by_ids       {ids: [..]} → full documents          │
//! │  PUT  /api/products/notify       {productId, onHand, basePrice?}       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Defensive Normalization
//! Response bodies are duck-shaped in the wild (extra fields, ids as
//! strings, missing arrays). Parsing goes through `serde_json::Value` and
//! degrades to EMPTY collections on shape mismatch — a malformed response
//! must never turn a successful push into an error.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RemoteSettings;
use crate::error::{SyncError, SyncResult};
use tally_core::{Invoice, Product, StockRow};

// =============================================================================
// Response Types
// =============================================================================

/// Authoritative post-update product state returned by the batch endpoint.
///
/// Only `id` is mandatory; everything else is applied when present.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteProduct {
    pub id: i64,
    /// The server-side on-hand after applying the batch.
    pub new_on_hand: Option<f64>,
    pub base_price_cents: Option<i64>,
    pub cost_cents: Option<i64>,
    pub code: Option<String>,
    pub name: Option<String>,
}

impl RemoteProduct {
    /// Parses one `updated_products` element. Ids arrive as numbers or
    /// numeric strings depending on the backend path; both are accepted.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = parse_i64(value.get("Id")?)?;

        Some(RemoteProduct {
            id,
            new_on_hand: value.get("new_OnHand").and_then(parse_f64),
            base_price_cents: value.get("BasePrice").and_then(parse_i64),
            cost_cents: value.get("Cost").and_then(parse_i64),
            code: value
                .get("Code")
                .and_then(Value::as_str)
                .map(str::to_string),
            name: value
                .get("Name")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Result of a reconciliation batch push.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResponse {
    /// Authoritative documents for every product the server updated.
    pub updated_products: Vec<RemoteProduct>,
}

/// Extracts `updated_products` from a batch response body.
///
/// Missing key, wrong type, or unparsable elements all degrade to empty /
/// skipped — never an error.
pub fn extract_updated_products(body: &Value) -> Vec<RemoteProduct> {
    let Some(items) = body.get("updated_products").and_then(Value::as_array) else {
        return Vec::new();
    };

    items.iter().filter_map(RemoteProduct::from_value).collect()
}

// =============================================================================
// Product Document Normalization
// =============================================================================

/// Remote product document in the backend's field naming.
///
/// Every field except `Id` is defaulted so a sparse document still parses.
#[derive(Debug, Deserialize)]
struct ProductDocument {
    #[serde(rename = "Id")]
    id: Value,
    #[serde(rename = "Code", default)]
    code: Option<String>,
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "FullName", default)]
    full_name: Option<String>,
    #[serde(rename = "CategoryId", default)]
    category_id: Option<Value>,
    #[serde(rename = "isActive", default = "default_true")]
    is_active: bool,
    #[serde(rename = "isDeleted", default)]
    is_deleted: bool,
    #[serde(rename = "Cost", default)]
    cost: Option<Value>,
    #[serde(rename = "BasePrice", default)]
    base_price: Option<Value>,
    #[serde(rename = "OnHand", default)]
    on_hand: Option<Value>,
    #[serde(rename = "Unit", default)]
    unit: Option<String>,
    #[serde(rename = "MasterUnitId", default)]
    master_unit_id: Option<Value>,
    #[serde(rename = "MasterProductId", default)]
    master_product_id: Option<Value>,
    #[serde(rename = "ConversionValue", default)]
    conversion_value: Option<Value>,
    #[serde(rename = "CreatedDate", default)]
    created_date: Option<DateTime<Utc>>,
    #[serde(rename = "ModifiedDate", default)]
    modified_date: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

/// Parses one remote product document into a domain Product.
///
/// Returns None when even the id is unusable.
pub fn parse_product_document(value: &Value) -> Option<Product> {
    let doc: ProductDocument = serde_json::from_value(value.clone()).ok()?;
    let id = parse_i64(&doc.id)?;
    let now = Utc::now();

    Some(Product {
        id,
        code: doc.code.unwrap_or_default(),
        // FullName wins over Name, same precedence the catalog uses.
        name: doc.full_name.or(doc.name).unwrap_or_default(),
        category_id: doc.category_id.as_ref().and_then(parse_i64),
        is_active: doc.is_active,
        is_deleted: doc.is_deleted,
        cost_cents: doc.cost.as_ref().and_then(parse_i64).unwrap_or(0),
        base_price_cents: doc.base_price.as_ref().and_then(parse_i64).unwrap_or(0),
        on_hand: doc.on_hand.as_ref().and_then(parse_f64).unwrap_or(0.0),
        unit: doc.unit.unwrap_or_default(),
        master_unit_id: doc.master_unit_id.as_ref().and_then(parse_i64),
        master_product_id: doc.master_product_id.as_ref().and_then(parse_i64),
        conversion_value: doc
            .conversion_value
            .as_ref()
            .and_then(parse_f64)
            .unwrap_or(1.0),
        created_at: doc.created_date.unwrap_or(now),
        modified_at: doc.modified_date.unwrap_or(now),
    })
}

/// Extracts a product array from a response body that may be a bare array
/// or `{products: [...]}`. Shape mismatch degrades to empty.
pub fn extract_product_array(body: &Value) -> Vec<Product> {
    let items = match body {
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => match body.get("products").and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            None => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    items.iter().filter_map(parse_product_document).collect()
}

fn parse_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        _ => None,
    }
}

fn parse_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

// =============================================================================
// Remote API Trait
// =============================================================================

/// The remote system of record, as far as this engine is concerned.
///
/// Implemented over REST in production and by an in-process fake in tests;
/// everything above this trait is network-agnostic.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Pushes one reconciliation batch; the response carries the
    /// authoritative post-update documents.
    async fn push_stock_batch(&self, rows: &[StockRow]) -> SyncResult<BatchResponse>;

    /// Creates an invoice on the remote side.
    async fn create_invoice(&self, invoice: &Invoice) -> SyncResult<()>;

    /// Updates an existing remote invoice.
    async fn update_invoice(&self, invoice: &Invoice) -> SyncResult<()>;

    /// Deletes a remote invoice.
    async fn delete_invoice(&self, id: &str) -> SyncResult<()>;

    /// Fetches the canonical invoice document, if it exists.
    async fn get_invoice(&self, id: &str) -> SyncResult<Option<Invoice>>;

    /// Lists the canonical invoices for one business day.
    async fn get_invoices_by_date(&self, date: NaiveDate) -> SyncResult<Vec<Invoice>>;

    /// Fetches full canonical product documents by id.
    async fn fetch_products_by_ids(&self, ids: &[i64]) -> SyncResult<Vec<Product>>;

    /// Pushes a single on-hand/price notification so the backend can fan
    /// it out to other terminals.
    async fn notify_on_hand(
        &self,
        product_id: i64,
        on_hand: f64,
        base_price_cents: Option<i64>,
    ) -> SyncResult<()>;
}

// =============================================================================
// HTTP Implementation
// =============================================================================

const BATCH_PATH: &str = "/api/products/update_onhand_batch";
const INVOICES_PATH: &str = "/api/invoices";
const PRODUCTS_BY_IDS_PATH: &str = "/api/products/by_ids";
const NOTIFY_PATH: &str = "/api/products/notify";

/// REST implementation of [`RemoteApi`].
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    /// Builds an HTTP remote from settings.
    pub fn new(settings: &RemoteSettings) -> SyncResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(SyncError::from)?;

        Ok(HttpRemote {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn push_stock_batch(&self, rows: &[StockRow]) -> SyncResult<BatchResponse> {
        debug!(rows = rows.len(), "Pushing stock batch");

        let response = self
            .client
            .put(self.url(BATCH_PATH))
            .json(rows)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        Ok(BatchResponse {
            updated_products: extract_updated_products(&body),
        })
    }

    async fn create_invoice(&self, invoice: &Invoice) -> SyncResult<()> {
        debug!(id = %invoice.id, "Creating remote invoice");

        self.client
            .post(self.url(INVOICES_PATH))
            .json(invoice)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn update_invoice(&self, invoice: &Invoice) -> SyncResult<()> {
        debug!(id = %invoice.id, "Updating remote invoice");

        self.client
            .put(format!("{}/{}", self.url(INVOICES_PATH), invoice.id))
            .json(invoice)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn delete_invoice(&self, id: &str) -> SyncResult<()> {
        debug!(id, "Deleting remote invoice");

        self.client
            .delete(format!("{}/{}", self.url(INVOICES_PATH), id))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    async fn get_invoice(&self, id: &str) -> SyncResult<Option<Invoice>> {
        let response = self
            .client
            .get(format!("{}/{}", self.url(INVOICES_PATH), id))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: Value = response.error_for_status()?.json().await?;
        match serde_json::from_value::<Invoice>(body) {
            Ok(invoice) => Ok(Some(invoice)),
            Err(e) => {
                // Shape drift on a read path: degrade, don't fail.
                warn!(id, error = %e, "Unparsable remote invoice document");
                Ok(None)
            }
        }
    }

    async fn get_invoices_by_date(&self, date: NaiveDate) -> SyncResult<Vec<Invoice>> {
        let body: Value = self
            .client
            .get(self.url(INVOICES_PATH))
            .query(&[("date", date.format("%Y-%m-%d").to_string())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // Same defensive posture as products: a malformed listing is an
        // empty listing.
        let Some(items) = body.as_array() else {
            return Ok(Vec::new());
        };
        Ok(items
            .iter()
            .filter_map(|item| serde_json::from_value::<Invoice>(item.clone()).ok())
            .collect())
    }

    async fn fetch_products_by_ids(&self, ids: &[i64]) -> SyncResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = ids.len(), "Fetching products by ids");

        let body: Value = self
            .client
            .post(self.url(PRODUCTS_BY_IDS_PATH))
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(extract_product_array(&body))
    }

    async fn notify_on_hand(
        &self,
        product_id: i64,
        on_hand: f64,
        base_price_cents: Option<i64>,
    ) -> SyncResult<()> {
        let mut payload = serde_json::json!({
            "productId": product_id,
            "onHand": on_hand,
        });
        if let Some(price) = base_price_cents {
            payload["basePrice"] = serde_json::json!(price);
        }

        self.client
            .put(self.url(NOTIFY_PATH))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
