//! # Secondary Inventory Platform
//!
//! Best-effort mirror of stock effects to a third-party retail platform.
//!
//! ## Isolation Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  This push is a SIDE CHANNEL. It must never affect the invoice or      │
//! │  on-hand outcome:                                                       │
//! │                                                                         │
//! │  • per-line failures are caught, logged and reported in the result     │
//! │    list — the next line still runs                                      │
//! │  • the whole call returns a result list, never an Err                   │
//! │  • callers invoke it fire-and-forget after the sale is final            │
//! │                                                                         │
//! │  The platform only tracks the group's MASTER record; each line         │
//! │  resolves its group anchor and writes `quantity × conversion` against  │
//! │  the master's on-hand.                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Authentication against the platform is out of scope; headers carry
//! whatever opaque credentials configuration provides, and a 401/403 gets
//! exactly one blind retry (externally refreshed credentials may have
//! landed since).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::SecondarySettings;
use tally_core::adjustment::normalized_conversion;
use tally_core::{Invoice, Operation, Product, UnitGroupIndex};

// =============================================================================
// Result Type
// =============================================================================

/// Per-line outcome of a secondary push.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondaryResult {
    /// The master record the line resolved to (None when resolution failed).
    pub master_id: Option<i64>,

    /// Error text when the push for this line failed; None on success.
    pub error: Option<String>,
}

// =============================================================================
// Trait
// =============================================================================

/// The secondary platform seam. Infallible by contract: failures live
/// inside the result list.
#[async_trait]
pub trait SecondaryInventory: Send + Sync {
    /// Mirrors one invoice's stock effect, line by line.
    async fn push_invoice(
        &self,
        invoice: &Invoice,
        index: &UnitGroupIndex,
        operation: Operation,
    ) -> Vec<SecondaryResult>;
}

/// Finds the group's master record: the variant that owns the stock.
pub fn resolve_master<'a>(group: &'a [Product]) -> Option<&'a Product> {
    group.iter().find(|p| p.master_unit_id.is_none())
}

// =============================================================================
// HTTP Implementation
// =============================================================================

/// REST client for the secondary platform. Disabled configuration makes
/// every push a silent no-op.
pub struct HttpSecondary {
    client: Client,
    settings: SecondarySettings,
}

impl HttpSecondary {
    /// Builds the client; infallible because a broken client just means
    /// every push fails (which is allowed).
    pub fn new(settings: SecondarySettings) -> Self {
        HttpSecondary {
            client: Client::new(),
            settings,
        }
    }

    async fn push_line(
        &self,
        master: &Product,
        delta: f64,
        operation: Operation,
    ) -> Result<(), String> {
        let base = self.settings.base_url.trim_end_matches('/');

        // Fetch the platform's current document for the master record.
        let doc_url = format!("{base}/products/{}/initialdata", master.id);
        let mut document: Value = self
            .request_with_reauth(|| self.client.get(&doc_url))
            .await?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        let current = document
            .pointer("/Product/OnHand")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);

        let new_on_hand = match operation {
            Operation::Decrease => current - delta,
            Operation::Increase => current + delta,
        };

        if let Some(product) = document.get_mut("Product") {
            product["OnHand"] = serde_json::json!(new_on_hand);
        }

        // Post the overwrite back.
        let update_url = format!("{base}/products/{}", master.id);
        self.request_with_reauth(|| self.client.post(&update_url).json(&document))
            .await?;

        debug!(master_id = master.id, new_on_hand, "Secondary platform updated");
        Ok(())
    }

    /// Sends a request, retrying ONCE on 401/403.
    async fn request_with_reauth<F>(&self, build: F) -> Result<reqwest::Response, String>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let send = |builder: reqwest::RequestBuilder| {
            builder
                .header("Retailer", &self.settings.retailer)
                .header("BranchId", &self.settings.branch_id)
                .send()
        };

        let mut response = send(build()).await.map_err(|e| e.to_string())?;

        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            debug!("Secondary platform auth rejected; retrying once");
            response = send(build()).await.map_err(|e| e.to_string())?;
        }

        response.error_for_status().map_err(|e| e.to_string())
    }
}

#[async_trait]
impl SecondaryInventory for HttpSecondary {
    async fn push_invoice(
        &self,
        invoice: &Invoice,
        index: &UnitGroupIndex,
        operation: Operation,
    ) -> Vec<SecondaryResult> {
        if !self.settings.enabled {
            return Vec::new();
        }

        let mut results = Vec::with_capacity(invoice.lines.len());

        for line in &invoice.lines {
            let master = index
                .group_for(&line.product)
                .and_then(resolve_master);

            let Some(master) = master else {
                warn!(
                    product_id = line.product.id,
                    "No master record for secondary stock update; line skipped"
                );
                results.push(SecondaryResult {
                    master_id: None,
                    error: Some("master record not found".to_string()),
                });
                continue;
            };

            let delta = line.quantity * normalized_conversion(line.product.conversion_value);

            match self.push_line(master, delta, operation).await {
                Ok(()) => results.push(SecondaryResult {
                    master_id: Some(master.id),
                    error: None,
                }),
                Err(e) => {
                    // Isolated: log, record, keep going.
                    warn!(master_id = master.id, error = %e, "Secondary push failed");
                    results.push(SecondaryResult {
                        master_id: Some(master.id),
                        error: Some(e),
                    });
                }
            }
        }

        results
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{invoice, line, product};

    #[test]
    fn test_resolve_master_finds_stock_owner() {
        let group = vec![product(1, None, 1.0, 10.0), product(2, Some(1), 0.1, 100.0)];
        assert_eq!(resolve_master(&group).unwrap().id, 1);

        let variants_only = vec![product(2, Some(1), 0.1, 100.0)];
        assert!(resolve_master(&variants_only).is_none());
    }

    #[tokio::test]
    async fn test_disabled_settings_are_a_noop() {
        let secondary = HttpSecondary::new(SecondarySettings::default());
        let index = UnitGroupIndex::build(&[product(1, None, 1.0, 10.0)]);
        let inv = invoice("inv-1", vec![line(product(1, None, 1.0, 10.0), 1.0)]);

        let results = secondary
            .push_invoice(&inv, &index, Operation::Decrease)
            .await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_missing_master_is_reported_not_propagated() {
        let settings = SecondarySettings {
            enabled: true,
            base_url: "http://localhost:1".to_string(), // unroutable on purpose
            retailer: "shop".to_string(),
            branch_id: "1".to_string(),
        };
        let secondary = HttpSecondary::new(settings);

        // Orphan variant: no group, hence no master.
        let index = UnitGroupIndex::build(&[]);
        let inv = invoice("inv-1", vec![line(product(31, Some(99), 0.5, 4.0), 1.0)]);

        let results = secondary
            .push_invoice(&inv, &index, Operation::Decrease)
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].master_id, None);
        assert!(results[0].error.is_some());
    }
}
