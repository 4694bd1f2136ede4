//! # station-sync: Node Communication and Sync for Media Stations
//!
//! Talks to the nodes of a station over WebSocket frames and pushes the
//! station's pending work to them.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Station Sync Architecture                        │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │            StationManager (authoring facade, per-station lock)    │  │
//! │  └──────────────┬────────────────────────────────┬──────────────────┘  │
//! │                 │                                │                      │
//! │  ┌──────────────▼──────────────┐  ┌──────────────▼──────────────────┐  │
//! │  │ StationSync (orchestrator)  │  │ ConnectionPipeline (health)      │  │
//! │  │ upload ─► delete ─► commit  │  │ ICMP ─► TCP ─► WS ping ─► reg.   │  │
//! │  └──────────────┬──────────────┘  └──────────────┬──────────────────┘  │
//! │                 └───────────────┬────────────────┘                      │
//! │                                 ▼                                       │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │ NodeCommandService: requests, replies, timeouts                   │  │
//! │  │   CommandRouter ◄── decode_lossy ◄── incoming frames              │  │
//! │  └──────────────────────────────┬───────────────────────────────────┘  │
//! │                                 ▼                                       │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │ Transport (trait) ── WsTransport: one socket per node ip,         │  │
//! │  │                      connect retries with backoff                 │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`codec`] - Multi-part binary frame format
//! - [`protocol`] - Command vocabulary and registration outcomes
//! - [`router`] - Incoming frame dispatch and pending request queues
//! - [`transport`] - WebSocket transport
//! - [`probe`] - ICMP reachability probe
//! - [`service`] - Request/response commands to nodes
//! - [`pipeline`] - Connection health check
//! - [`progress`] - Sync event reporters
//! - [`orchestrator`] - Station sync and per-station locks
//! - [`manager`] - Station editing facade
//! - [`config`] - Configuration (file, environment)
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config = SyncConfig::load_or_default(None);
//! let (transport, incoming) = WsTransport::new(TransportConfig::from(&config.node));
//! let service = Arc::new(NodeCommandService::start(
//!     Arc::new(transport),
//!     incoming,
//!     Arc::new(NoOpEventHandler),
//!     ServiceTimeouts::from(&config.node),
//! ));
//!
//! let manager = StationManager::new(db, cache, service, probe, config.role(), true);
//! let ok = manager.sync(station_id, &TracingReporter).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod codec;
pub mod config;
pub mod error;
pub mod manager;
pub mod orchestrator;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod protocol;
pub mod router;
pub mod service;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use codec::{decode, decode_lossy, encode, CodecError, Part};
pub use config::{parse_role, AppSettings, NodeSettings, StorageSettings, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use manager::StationManager;
pub use orchestrator::{StationLocks, StationSync};
pub use pipeline::{ConnectionPipeline, StepCallback};
pub use probe::{AssumeReachable, HostProbe, SystemPing};
pub use progress::{ChannelReporter, NoOpReporter, SyncProgressReporter, TracingReporter};
pub use protocol::{Command, RegistrationOutcome};
pub use router::{CommandRouter, NodeEventHandler, NoOpEventHandler};
pub use service::{NodeCommandService, ServiceTimeouts};
pub use transport::{IncomingFrame, Transport, TransportConfig, WsTransport};
