//! # Progress and Status Types
//!
//! Values the sync engine reports to its host. They are plain data so the
//! host can forward them to a UI unchanged (TypeScript bindings are
//! generated from them).
//!
//! ## Sync Event Stream
//! ```text
//! MediaPlayer  Connecting ─► LoadingMedia ─► SendingMedia ─► MediaProgress* ─► MediaSent
//!                                                                     └──────► MediaFailed
//! MediaPlayer  DeleteSent / DeleteFailed
//! Controller   Connecting ─► ManifestSent
//! MediaStation Done { success }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{ContentId, DeviceMediaId, NodeId};

// =============================================================================
// Connection Status
// =============================================================================

/// Outcome of a connection health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    IcmpPingFailed,
    TcpConnectionFailed,
    WebSocketPingFailed,
    RegistrationFailed,
    Online,
}

impl ConnectionStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectionStatus::Online)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectionStatus::IcmpPingFailed => "host does not answer ICMP ping",
            ConnectionStatus::TcpConnectionFailed => "connection refused",
            ConnectionStatus::WebSocketPingFailed => "node does not answer ping",
            ConnectionStatus::RegistrationFailed => "registration refused",
            ConnectionStatus::Online => "online",
        };
        f.write_str(text)
    }
}

/// A step of the connection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    IcmpPing,
    TcpConnect,
    WsPing,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Started,
    Succeeded,
    Failed,
}

/// Intermediate state of a running pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StepProgress {
    pub step: PipelineStep,
    pub state: StepState,
}

// =============================================================================
// Sync Events
// =============================================================================

/// Which part of the station an event concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncScope {
    MediaPlayer,
    Controller,
    MediaStation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEventKind {
    Connecting,
    ConnectionFailed { status: ConnectionStatus },
    /// Another session holds this node.
    RegistrationBlocked,
    RegistrationRejected,
    LoadingMedia { content_id: ContentId },
    SendingMedia { content_id: ContentId },
    MediaProgress { content_id: ContentId, sent: u32, total: u32 },
    MediaSent {
        content_id: ContentId,
        #[ts(type = "number")]
        id_on_device: DeviceMediaId,
    },
    MediaFailed { content_id: ContentId, reason: String },
    DeleteSent {
        #[ts(type = "number")]
        media_id: DeviceMediaId,
    },
    DeleteFailed {
        #[ts(type = "number")]
        media_id: DeviceMediaId,
        reason: String,
    },
    ManifestSent,
    NoController,
    Done { success: bool },
}

/// One progress event of a sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncEvent {
    pub scope: SyncScope,
    /// Node the event concerns; absent for station-wide events.
    pub node_id: Option<NodeId>,
    pub kind: SyncEventKind,
}

impl SyncEvent {
    pub fn player(node_id: NodeId, kind: SyncEventKind) -> Self {
        SyncEvent {
            scope: SyncScope::MediaPlayer,
            node_id: Some(node_id),
            kind,
        }
    }

    pub fn controller(node_id: NodeId, kind: SyncEventKind) -> Self {
        SyncEvent {
            scope: SyncScope::Controller,
            node_id: Some(node_id),
            kind,
        }
    }

    pub fn station(kind: SyncEventKind) -> Self {
        SyncEvent {
            scope: SyncScope::MediaStation,
            node_id: None,
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = SyncEvent::player(
            2,
            SyncEventKind::MediaSent {
                content_id: 4,
                id_on_device: 17,
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["scope"], "media_player");
        assert_eq!(value["node_id"], 2);
        assert_eq!(value["kind"]["type"], "media_sent");
        assert_eq!(value["kind"]["id_on_device"], 17);

        let back: SyncEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_connection_status() {
        assert!(ConnectionStatus::Online.is_online());
        assert!(!ConnectionStatus::RegistrationFailed.is_online());
        let json = serde_json::to_string(&ConnectionStatus::WebSocketPingFailed).unwrap();
        assert_eq!(json, "\"web_socket_ping_failed\"");
    }
}
