//! # Station Configuration
//!
//! Configuration for the sync engine and its host.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     MEDIASTATION_ROLE=user                                             │
//! │     MEDIASTATION_NODE_PORT=5000                                        │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/mediastation/stations.toml (Linux)                       │
//! │     ~/Library/Application Support/org.mediastation.mediastation/...    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     role = admin, port 5000, upload timeout 240 s                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # stations.toml
//! [app]
//! name = "Museum Editor"
//! role = "admin"          # admin | user
//!
//! [node]
//! port = 5000
//! path = "/"
//! connect_timeout_secs = 5
//! request_timeout_secs = 10
//! upload_timeout_secs = 240
//! icmp_ping_enabled = true
//!
//! [storage]
//! database_path = "/var/lib/mediastation/stations.db"
//! media_root = "/var/lib/mediastation/media"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use station_core::AppRole;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

const CONFIG_FILE_NAME: &str = "stations.toml";

/// Parses a role argument. Anything but `admin` or `user` is a programming
/// error, reported before any work starts.
pub fn parse_role(role: &str) -> SyncResult<AppRole> {
    role.parse::<AppRole>()
        .map_err(|_| SyncError::InvalidRole(role.to_string()))
}

// =============================================================================
// App Settings
// =============================================================================

/// Identity of this application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Display name, used in logs.
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Role to register with on nodes.
    #[serde(default)]
    pub role: AppRole,
}

fn default_app_name() -> String {
    "Media Station".to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            name: default_app_name(),
            role: AppRole::default(),
        }
    }
}

// =============================================================================
// Node Settings
// =============================================================================

/// How to reach and talk to media nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// WebSocket port every node listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// WebSocket path.
    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Connect attempts after the first failure.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// How long to wait for a reply to an ordinary request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long to wait for a node to acknowledge one media upload.
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,

    /// Whether health checks start with an ICMP ping.
    #[serde(default = "default_true")]
    pub icmp_ping_enabled: bool,

    #[serde(default = "default_icmp_timeout")]
    pub icmp_timeout_secs: u64,
}

fn default_port() -> u16 {
    5000
}
fn default_path() -> String {
    "/".to_string()
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_connect_retries() -> u32 {
    2
}
fn default_initial_backoff() -> u64 {
    250
}
fn default_max_backoff() -> u64 {
    2000
}
fn default_request_timeout() -> u64 {
    10
}
fn default_upload_timeout() -> u64 {
    240
}
fn default_true() -> bool {
    true
}
fn default_icmp_timeout() -> u64 {
    2
}

impl Default for NodeSettings {
    fn default() -> Self {
        NodeSettings {
            port: default_port(),
            path: default_path(),
            connect_timeout_secs: default_connect_timeout(),
            connect_retries: default_connect_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            request_timeout_secs: default_request_timeout(),
            upload_timeout_secs: default_upload_timeout(),
            icmp_ping_enabled: default_true(),
            icmp_timeout_secs: default_icmp_timeout(),
        }
    }
}

impl NodeSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn icmp_timeout(&self) -> Duration {
        Duration::from_secs(self.icmp_timeout_secs)
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Where stations and cached media live on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Root of the media cache. Defaults to the platform data directory.
    #[serde(default)]
    pub media_root: Option<PathBuf>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub app: AppSettings,

    #[serde(default)]
    pub node: NodeSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (stations.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
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

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let node = &self.node;

        if node.port == 0 {
            return Err(SyncError::InvalidConfig("node.port must be greater than 0".into()));
        }

        for (name, value) in [
            ("connect_timeout_secs", node.connect_timeout_secs),
            ("request_timeout_secs", node.request_timeout_secs),
            ("upload_timeout_secs", node.upload_timeout_secs),
            ("icmp_timeout_secs", node.icmp_timeout_secs),
        ] {
            if value == 0 {
                return Err(SyncError::InvalidConfig(format!(
                    "node.{} must be greater than 0",
                    name
                )));
            }
        }

        if node.upload_timeout_secs < node.request_timeout_secs {
            return Err(SyncError::InvalidConfig(format!(
                "node.upload_timeout_secs ({}) must not be shorter than node.request_timeout_secs ({})",
                node.upload_timeout_secs, node.request_timeout_secs
            )));
        }

        if node.max_backoff_ms < node.initial_backoff_ms {
            return Err(SyncError::InvalidConfig(
                "node.max_backoff_ms must not be below node.initial_backoff_ms".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) -> SyncResult<()> {
        if let Ok(role) = std::env::var("MEDIASTATION_ROLE") {
            debug!(role = %role, "Overriding role from environment");
            self.app.role = parse_role(&role)?;
        }

        if let Ok(port) = std::env::var("MEDIASTATION_NODE_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.node.port = p,
                Err(_) => warn!(port = %port, "Ignoring invalid node port in environment"),
            }
        }

        if let Ok(path) = std::env::var("MEDIASTATION_DB_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("MEDIASTATION_MEDIA_ROOT") {
            self.storage.media_root = Some(PathBuf::from(path));
        }

        if let Ok(secs) = std::env::var("MEDIASTATION_UPLOAD_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.node.upload_timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid upload timeout in environment"),
            }
        }

        Ok(())
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("org", "mediastation", "mediastation")
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn role(&self) -> AppRole {
        self.app.role
    }

    /// Database file, falling back to the platform data directory.
    pub fn database_path(&self) -> SyncResult<PathBuf> {
        self.storage
            .database_path
            .clone()
            .or_else(|| Self::project_dirs().map(|d| d.data_dir().join("stations.db")))
            .ok_or_else(|| SyncError::InvalidConfig("No database path available".into()))
    }

    /// Media cache root, falling back to the platform data directory.
    pub fn media_root(&self) -> SyncResult<PathBuf> {
        self.storage
            .media_root
            .clone()
            .or_else(|| Self::project_dirs().map(|d| d.data_dir().join("media")))
            .ok_or_else(|| SyncError::InvalidConfig("No media root available".into()))
    }
}
