//! # Sync Error Types
//!
//! Error types for the synchronization engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  RequestFailed  │  │  UnexpectedResponse     │ │
//! │  │  ConfigLoad     │  │  RemoteRejected │  │  SerializationFailed    │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Store       │  │     Queue       │  │      Engine             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  StoreError     │  │  NotQueued      │  │  CheckoutInProgress     │ │
//! │  │                 │  │  ReplayFailed   │  │  Internal               │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The categorization drives retry decisions: transport failures keep an
//! invoice queued, config/protocol errors do not fix themselves by waiting.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all sync-engine failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid remote base URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// HTTP request could not be sent or timed out (network down, DNS,
    /// connection reset). The classic "terminal went offline" error.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The remote answered with a non-success status.
    #[error("Remote rejected {context}: HTTP {status}")]
    RemoteRejected { context: String, status: u16 },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Failed to serialize a request payload.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Response body was not the shape the contract promises.
    ///
    /// Rare by construction: response parsing is defensive and degrades to
    /// empty collections instead of erroring wherever possible.
    #[error("Unexpected response for {context}: {message}")]
    UnexpectedResponse { context: String, message: String },

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Local store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] tally_store::StoreError),

    // =========================================================================
    // Queue Errors
    // =========================================================================
    /// The invoice is not in the offline queue.
    #[error("Invoice {0} is not queued")]
    NotQueued(String),

    /// One or more invoices failed to replay.
    #[error("Replay finished with {failed} failure(s) out of {total}")]
    ReplayFailed { failed: usize, total: usize },

    // =========================================================================
    // Engine Errors
    // =========================================================================
    /// A checkout is already in flight on this terminal.
    #[error("A checkout is already in progress on this terminal")]
    CheckoutInProgress,

    /// Checkout input failed validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] tally_core::ValidationError),

    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            SyncError::RemoteRejected {
                context: err
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "request".to_string()),
                status: status.as_u16(),
            }
        } else {
            SyncError::RequestFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is recoverable and the operation can be
    /// retried later (invoice stays queued, notification stays pending).
    ///
    /// ## Retryable
    /// - Network failures and timeouts
    /// - 5xx / 429 rejections from the remote
    ///
    /// ## Non-Retryable
    /// - Configuration errors
    /// - Serialization / contract mismatches
    /// - Validation failures
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::RequestFailed(_) => true,
            SyncError::RemoteRejected { status, .. } => *status >= 500 || *status == 429,
            SyncError::ReplayFailed { .. } => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
