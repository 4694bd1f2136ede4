//! # Sync Error Types
//!
//! Error types for node communication and sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  InvalidMessage         │ │
//! │  │  InvalidRole    │  │  NotConnected   │  │  Codec                  │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  SerializationFailed    │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Domain       │  │    Database     │                              │
//! │  │                 │  │                 │                              │
//! │  │  Core(..)       │  │  Db(..)         │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A node that is offline, blocked or silent is NOT an error here: those
//! outcomes travel as `ConnectionStatus` values and `Ok(false)`.

use station_core::{CoreError, StationId};
use station_db::DbError;
use thiserror::Error;

use crate::codec::CodecError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Role string that is neither `admin` nor `user`.
    #[error("Invalid app role: '{0}'. Valid options: admin, user")]
    InvalidRole(String),

    /// Node URL could not be built.
    #[error("Invalid node URL: {0}")]
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
    /// Failed to establish the WebSocket connection.
    #[error("Connection to {ip} failed: {message}")]
    ConnectionFailed { ip: String, message: String },

    /// No open connection to this node.
    #[error("Not connected to {0}")]
    NotConnected(String),

    /// Node closed the connection.
    #[error("Disconnected from node")]
    Disconnected,

    /// Connection or send timeout.
    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Host probe could not run.
    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    /// The node did not accept this application.
    #[error("Registration at {ip} refused: {outcome}")]
    RegistrationRefused { ip: String, outcome: String },

    /// The station has no node holding the manifest.
    #[error("Station {0} has no controller node")]
    NoController(StationId),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Frame could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Reply that does not fit the request.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Failed to serialize the manifest or a config.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Domain and Storage Errors
    // =========================================================================
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed => SyncError::Disconnected,
            WsError::AlreadyClosed => SyncError::Disconnected,
            WsError::Protocol(p) => SyncError::WebSocketError(p.to_string()),
            WsError::Io(io) => SyncError::ConnectionFailed {
                ip: String::new(),
                message: io.to_string(),
            },
            other => SyncError::WebSocketError(other.to_string()),
        }
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
    /// Returns true if the operation can be retried later.
    ///
    /// ## Retryable Errors
    /// - Connection failures and timeouts
    /// - Closed connections
    ///
    /// ## Non-Retryable Errors
    /// - Configuration and role errors
    /// - Domain errors (unknown station, content, node)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed { .. }
                | SyncError::NotConnected(_)
                | SyncError::Disconnected
                | SyncError::Timeout(_)
                | SyncError::WebSocketError(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidRole(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error indicates a protocol mismatch.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::Codec(_) | SyncError::InvalidMessage(_) | SyncError::SerializationFailed(_)
        )
    }

    /// Returns true for a missing station, folder, content, node or tag.
    pub fn is_not_found(&self) -> bool {
        match self {
            SyncError::Core(err) => err.is_not_found(),
            SyncError::Db(DbError::Core(err)) => err.is_not_found(),
            SyncError::Db(err) => err.is_not_found(),
            _ => false,
        }
    }
}
