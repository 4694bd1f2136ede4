//! # Domain Types
//!
//! Leaf types shared by the station tree, the cache and the sync engine.
//!
//! ## Type Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Node       │   │      Media      │   │       Tag       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (u32)       │   │  node_id        │   │  id (u32)       │       │
//! │  │  name           │   │  id_on_device   │   │  name           │       │
//! │  │  ip             │   │  file_name      │   └─────────────────┘       │
//! │  │  role           │   │  kind           │                              │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │                                                                         │
//! │  ┌──────────────────────┐   ┌──────────────────────┐                   │
//! │  │  PendingCacheEntry   │   │  PendingDeleteEntry  │                   │
//! │  │  ──────────────────  │   │  ──────────────────  │                   │
//! │  │  station_id          │   │  station_id          │                   │
//! │  │  content_id          │   │  node_id             │                   │
//! │  │  node_id             │   │  media_id (device)   │                   │
//! │  │  file_extension      │   └──────────────────────┘                   │
//! │  └──────────────────────┘                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every entity id is a `u32` handed out by a per-station counter. Ids a
//! node assigns to uploaded media are `i64`, with `-1` meaning "not yet
//! uploaded".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Identifiers
// =============================================================================

pub type StationId = u32;
pub type FolderId = u32;
pub type ContentId = u32;
pub type NodeId = u32;
pub type TagId = u32;

/// Id a node assigned to an uploaded media file.
pub type DeviceMediaId = i64;

/// Id of the root folder of every station.
pub const ROOT_FOLDER_ID: FolderId = 0;

/// Node id that by convention belongs to the controller.
pub const CONTROLLER_NODE_ID: NodeId = 0;

/// Sentinel device id for media that was never acknowledged by its node.
pub const UNKNOWN_DEVICE_ID: DeviceMediaId = -1;

/// Highest light-intensity preset index.
pub const MAX_LIGHT_INTENSITY: u8 = 2;

// =============================================================================
// Node
// =============================================================================

/// Role of a node within its station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Holds the authoritative content manifest.
    Controller,
    /// Plays media only.
    Default,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Controller => "controller",
            NodeRole::Default => "default",
        }
    }
}

impl Default for NodeRole {
    fn default() -> Self {
        NodeRole::Default
    }
}

impl FromStr for NodeRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "controller" => Ok(NodeRole::Controller),
            "default" => Ok(NodeRole::Default),
            _ => Err(ValidationError::NotAllowed {
                field: "role".to_string(),
                allowed: vec!["controller".to_string(), "default".to_string()],
            }),
        }
    }
}

/// A networked playback or control endpoint of a station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub ip: String,
    pub role: NodeRole,
}

impl Node {
    pub fn is_controller(&self) -> bool {
        self.role == NodeRole::Controller
    }
}

// =============================================================================
// Tag
// =============================================================================

/// A label that contents reference by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

// =============================================================================
// Media
// =============================================================================

/// Image or video, with the video's duration in seconds.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaKind {
    Image,
    Video { duration: f64 },
}

impl MediaKind {
    /// Manifest name of the variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video { .. } => "video",
        }
    }
}

/// A media file assigned to one (content, node) slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Media {
    pub node_id: NodeId,
    pub id_on_device: DeviceMediaId,
    pub file_name: String,
    pub kind: MediaKind,
}

impl Media {
    /// New image that has not been uploaded yet.
    pub fn image(node_id: NodeId, file_name: impl Into<String>) -> Self {
        Media {
            node_id,
            id_on_device: UNKNOWN_DEVICE_ID,
            file_name: file_name.into(),
            kind: MediaKind::Image,
        }
    }

    /// New video that has not been uploaded yet.
    pub fn video(node_id: NodeId, file_name: impl Into<String>, duration: f64) -> Self {
        Media {
            node_id,
            id_on_device: UNKNOWN_DEVICE_ID,
            file_name: file_name.into(),
            kind: MediaKind::Video { duration },
        }
    }

    /// True once the node acknowledged the upload with an id.
    pub fn is_uploaded(&self) -> bool {
        self.id_on_device != UNKNOWN_DEVICE_ID
    }

    /// File extension derived from `file_name`, lowercased.
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
    }
}

// =============================================================================
// Pending Work
// =============================================================================

/// One media file queued for upload and not yet confirmed by its node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingCacheEntry {
    pub station_id: StationId,
    pub content_id: ContentId,
    pub node_id: NodeId,
    pub file_extension: String,
}

/// A device-side media id the node must be told to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingDeleteEntry {
    pub station_id: StationId,
    pub node_id: NodeId,
    #[ts(type = "number")]
    pub media_id: DeviceMediaId,
}

// =============================================================================
// App Role
// =============================================================================

/// Role this application registers with on a node.
///
/// Only `admin` may change what a node plays; `user` sessions are
/// remote controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum AppRole {
    Admin,
    User,
}

impl AppRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppRole::Admin => "admin",
            AppRole::User => "user",
        }
    }
}

impl Default for AppRole {
    fn default() -> Self {
        AppRole::Admin
    }
}

impl fmt::Display for AppRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(AppRole::Admin),
            "user" => Ok(AppRole::User),
            _ => Err(ValidationError::NotAllowed {
                field: "role".to_string(),
                allowed: vec!["admin".to_string(), "user".to_string()],
            }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_constructors_start_unuploaded() {
        let image = Media::image(1, "poster.PNG");
        assert!(!image.is_uploaded());
        assert_eq!(image.kind.type_name(), "image");
        assert_eq!(image.extension().as_deref(), Some("png"));

        let mut video = Media::video(2, "intro.mp4", 12.5);
        assert_eq!(video.kind, MediaKind::Video { duration: 12.5 });
        video.id_on_device = 7;
        assert!(video.is_uploaded());
    }

    #[test]
    fn test_extension_missing() {
        assert_eq!(Media::image(0, "noext").extension(), None);
        assert_eq!(Media::image(0, "trailing.").extension(), None);
    }

    #[test]
    fn test_app_role_parse() {
        assert_eq!("admin".parse::<AppRole>().unwrap(), AppRole::Admin);
        assert_eq!("user".parse::<AppRole>().unwrap(), AppRole::User);
        assert!("root".parse::<AppRole>().is_err());
        assert!("Admin".parse::<AppRole>().is_err());
    }

    #[test]
    fn test_node_role_serialization() {
        let json = serde_json::to_string(&NodeRole::Controller).unwrap();
        assert_eq!(json, "\"controller\"");
        assert_eq!("default".parse::<NodeRole>().unwrap(), NodeRole::Default);
    }
}
