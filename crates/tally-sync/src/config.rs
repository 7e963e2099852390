//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_REMOTE_URL=https://backend.example.com                       │
//! │     TALLY_TERMINAL_ID=abc-123                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/sync.toml (Linux)                              │
//! │     ~/Library/Application Support/com.tally.pos/sync.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     localhost remote, auto-generated terminal id                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [terminal]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Register 1"
//!
//! [remote]
//! base_url = "https://backend.example.com"
//! connect_timeout_secs = 10
//! request_timeout_secs = 30
//!
//! [replay]
//! store_read_max_attempts = 5
//! store_read_initial_backoff_ms = 200
//!
//! [notifier]
//! queue_limit = 500
//!
//! [snapshot]
//! ttl_secs = 30
//!
//! [secondary]
//! enabled = false
//! base_url = "https://retail-platform.example.com"
//! retailer = "mystore"
//! branch_id = "1001"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Terminal Configuration
// =============================================================================

/// Configuration for this terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Unique terminal identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable terminal name (e.g., "Register 1").
    #[serde(default = "default_terminal_name")]
    pub name: String,
}

fn default_terminal_name() -> String {
    "POS Terminal".to_string()
}

impl Default for TerminalConfig {
    fn default() -> Self {
        TerminalConfig {
            id: Uuid::new_v4().to_string(),
            name: default_terminal_name(),
        }
    }
}

// =============================================================================
// Remote Settings
// =============================================================================

/// Settings for the remote system of record (REST).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the backend (no trailing slash).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// TCP connect timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout (seconds). Bounds every push/pull so a hung
    /// request cannot wedge replay.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Replay Settings
// =============================================================================

/// Settings for the local-store read retry used by the optimistic applier.
///
/// A product can be missing from the local store for a short window while
/// the initial catalog seed races a checkout; reads retry with exponential
/// backoff before the update is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySettings {
    /// Maximum read attempts before the update is dropped and logged.
    #[serde(default = "default_store_read_max_attempts")]
    pub store_read_max_attempts: u32,

    /// Initial backoff between attempts (milliseconds).
    #[serde(default = "default_store_read_initial_backoff")]
    pub store_read_initial_backoff_ms: u64,

    /// Maximum backoff between attempts (seconds).
    #[serde(default = "default_store_read_max_backoff")]
    pub store_read_max_backoff_secs: u64,
}

fn default_store_read_max_attempts() -> u32 {
    5
}
fn default_store_read_initial_backoff() -> u64 {
    200
}
fn default_store_read_max_backoff() -> u64 {
    5
}

impl Default for ReplaySettings {
    fn default() -> Self {
        ReplaySettings {
            store_read_max_attempts: default_store_read_max_attempts(),
            store_read_initial_backoff_ms: default_store_read_initial_backoff(),
            store_read_max_backoff_secs: default_store_read_max_backoff(),
        }
    }
}

// =============================================================================
// Notifier Settings
// =============================================================================

/// Settings for the bounded retry-notification queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierSettings {
    /// Maximum queued notifications; the oldest entry is dropped beyond
    /// this.
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,
}

fn default_queue_limit() -> usize {
    500
}

impl Default for NotifierSettings {
    fn default() -> Self {
        NotifierSettings {
            queue_limit: default_queue_limit(),
        }
    }
}

// =============================================================================
// Snapshot Settings
// =============================================================================

/// Settings for the grouped-products snapshot cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSettings {
    /// How long a built group index stays fresh (seconds).
    #[serde(default = "default_snapshot_ttl")]
    pub ttl_secs: u64,
}

fn default_snapshot_ttl() -> u64 {
    30
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        SnapshotSettings {
            ttl_secs: default_snapshot_ttl(),
        }
    }
}

// =============================================================================
// Secondary Platform Settings
// =============================================================================

/// Settings for the secondary inventory platform (best-effort mirror).
///
/// Credentials are opaque here; acquiring them is the UI layer's problem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecondarySettings {
    /// Whether the secondary push runs at all.
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the platform API.
    #[serde(default)]
    pub base_url: String,

    /// Retailer identifier header value.
    #[serde(default)]
    pub retailer: String,

    /// Branch identifier header value.
    #[serde(default)]
    pub branch_id: String,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Terminal-specific configuration.
    #[serde(default)]
    pub terminal: TerminalConfig,

    /// Remote system-of-record settings.
    #[serde(default)]
    pub remote: RemoteSettings,

    /// Replay / store-read retry settings.
    #[serde(default)]
    pub replay: ReplaySettings,

    /// Retry-notifier settings.
    #[serde(default)]
    pub notifier: NotifierSettings,

    /// Grouped snapshot cache settings.
    #[serde(default)]
    pub snapshot: SnapshotSettings,

    /// Secondary inventory platform settings.
    #[serde(default)]
    pub secondary: SecondarySettings,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated terminal ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.terminal.id.is_empty() {
            return Err(SyncError::InvalidConfig("terminal id must not be empty".into()));
        }

        if !self.remote.base_url.starts_with("http://")
            && !self.remote.base_url.starts_with("https://")
        {
            return Err(SyncError::InvalidUrl(format!(
                "remote base_url must start with http:// or https://, got: {}",
                self.remote.base_url
            )));
        }

        if self.notifier.queue_limit == 0 {
            return Err(SyncError::InvalidConfig(
                "notifier queue_limit must be greater than 0".into(),
            ));
        }

        if self.replay.store_read_max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "store_read_max_attempts must be greater than 0".into(),
            ));
        }

        if self.secondary.enabled && self.secondary.base_url.is_empty() {
            return Err(SyncError::InvalidConfig(
                "secondary.base_url required when secondary.enabled".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("TALLY_TERMINAL_ID") {
            debug!(terminal_id = %id, "Overriding terminal ID from environment");
            self.terminal.id = id;
        }

        if let Ok(name) = std::env::var("TALLY_TERMINAL_NAME") {
            self.terminal.name = name;
        }

        if let Ok(url) = std::env::var("TALLY_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.base_url = url;
        }

        if let Ok(limit) = std::env::var("TALLY_NOTIFIER_QUEUE_LIMIT") {
            if let Ok(parsed) = limit.parse::<usize>() {
                self.notifier.queue_limit = parsed;
            }
        }

        if let Ok(ttl) = std::env::var("TALLY_SNAPSHOT_TTL_SECS") {
            if let Ok(parsed) = ttl.parse::<u64>() {
                self.snapshot.ttl_secs = parsed;
            }
        }

        if let Ok(enabled) = std::env::var("TALLY_SECONDARY_ENABLED") {
            self.secondary.enabled = matches!(enabled.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the terminal ID.
    pub fn terminal_id(&self) -> &str {
        &self.terminal.id
    }

    /// Returns the remote base URL without a trailing slash.
    pub fn remote_base_url(&self) -> &str {
        self.remote.base_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.terminal.id.is_empty()); // Auto-generated
        assert_eq!(config.notifier.queue_limit, 500);
        assert_eq!(config.replay.store_read_max_attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.terminal.id = String::new();
        assert!(config.validate().is_err());

        config.terminal.id = "t-1".to_string();
        config.remote.base_url = "ws://not-http".to_string();
        assert!(config.validate().is_err());

        config.remote.base_url = "https://backend.example.com".to_string();
        assert!(config.validate().is_ok());

        config.notifier.queue_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secondary_requires_url_when_enabled() {
        let mut config = SyncConfig::default();
        config.secondary.enabled = true;
        assert!(config.validate().is_err());

        config.secondary.base_url = "https://platform.example.com".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let mut config = SyncConfig::default();
        config.remote.base_url = "https://backend.example.com/".to_string();
        assert_eq!(config.remote_base_url(), "https://backend.example.com");
    }

    #[test]
    fn test_toml_serialization() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[terminal]"));
        assert!(toml_str.contains("[remote]"));
        assert!(toml_str.contains("[notifier]"));
    }
}
