//! # Error Types
//!
//! Domain-specific error types for station-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  station-core errors (this file)                                       │
//! │  ├── CoreError        - Lookups, tree edits, manifest parsing          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  station-db errors (separate crate)                                    │
//! │  └── DbError          - Database, storage and cache failures           │
//! │                                                                         │
//! │  station-sync errors (separate crate)                                  │
//! │  └── SyncError        - Transport, protocol, configuration             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SyncError → Host        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every lookup by id fails immediately with the matching `*NotFound`
//! variant. Nothing in this crate falls back to a default entity.

use thiserror::Error;

use crate::types::{ContentId, FolderId, NodeId, StationId, TagId};

// =============================================================================
// Core Error
// =============================================================================

/// Domain errors raised by the station model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Station id is not known to the repository.
    #[error("Station not found: {0}")]
    StationNotFound(StationId),

    /// Folder id does not exist anywhere in the station tree.
    #[error("Folder not found: {0}")]
    FolderNotFound(FolderId),

    /// Content id does not exist anywhere in the station tree.
    #[error("Content not found: {0}")]
    ContentNotFound(ContentId),

    /// Node id is not in the station's node registry.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Tag id is not in the station's tag registry.
    #[error("Tag not found: {0}")]
    TagNotFound(TagId),

    /// A content has no media assigned for the given node.
    #[error("Content {content_id} has no media for node {node_id}")]
    MediaNotFound { content_id: ContentId, node_id: NodeId },

    /// The root folder anchors the tree and cannot be removed.
    #[error("The root folder cannot be removed")]
    RootFolderRemoval,

    /// A second node with role `controller` was added or promoted.
    ///
    /// ## When This Occurs
    /// ```text
    /// Registry: { 0: controller, 1: default }
    ///      │
    ///      ▼
    /// add_node("Lobby", "10.0.0.9", Controller)
    ///      │
    ///      ▼
    /// ControllerAlreadyDefined { existing: 0 }
    /// ```
    #[error("Node {existing} is already the controller of this station")]
    ControllerAlreadyDefined { existing: NodeId },

    /// Every id of a kind was handed out; the counter cannot advance.
    #[error("No {kind} ids left in this station")]
    IdsExhausted { kind: &'static str },

    /// A required manifest property is absent.
    ///
    /// `path` names the property, e.g. `rootFolder.subfolders[1].name`.
    #[error("Manifest is missing required property '{path}'")]
    MissingManifestField { path: String },

    /// A manifest property has the wrong JSON type or an invalid value.
    #[error("Manifest property '{path}' is invalid: expected {expected}")]
    InvalidManifestField { path: String, expected: String },

    /// The manifest text is not JSON at all.
    #[error("Manifest is not valid JSON: {0}")]
    ManifestJson(#[from] serde_json::Error),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns true for an unknown station, folder, content, node, tag or media slot.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::StationNotFound(_)
                | CoreError::FolderNotFound(_)
                | CoreError::ContentNotFound(_)
                | CoreError::NodeNotFound(_)
                | CoreError::TagNotFound(_)
                | CoreError::MediaNotFound { .. }
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g. an ip address with a port, an extension with a dot).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
