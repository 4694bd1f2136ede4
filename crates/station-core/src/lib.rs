//! # station-core: Pure Domain Model for Media Stations
//!
//! A media station is a controller node plus playback nodes sharing one
//! content tree. This crate models that tree and its JSON manifest as
//! pure data with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Media Station Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                Host shell (stationctl / UI)                     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        station-sync: codec, router, pipeline, orchestrator      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        station-db: repositories, file storage, media cache      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ station-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  station  │  │  folder   │  │ manifest  │  │  events   │  │   │
//! │  │   │ registries│  │  content  │  │   JSON    │  │  status   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Ids, nodes, tags, media, pending-work entries
//! - [`folder`] - Folder tree and contents
//! - [`registry`] - Node and tag registries
//! - [`station`] - The station aggregate and its edit operations
//! - [`manifest`] - JSON manifest export and validated import
//! - [`events`] - Connection status and sync progress events
//! - [`validation`] - Input checks
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use station_core::{Media, NodeRole, Station, ROOT_FOLDER_ID};
//!
//! let mut station = Station::new(1, "Museum");
//! let controller = station.add_node("Entrance", "10.0.0.1", NodeRole::Controller).unwrap();
//! let content = station.add_content(ROOT_FOLDER_ID, "Welcome").unwrap();
//! station.set_media(content, Media::image(controller, "welcome.png")).unwrap();
//!
//! let json = station.to_manifest_json().unwrap();
//! let restored = Station::from_manifest_json(1, &json).unwrap();
//! assert_eq!(restored, station);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod events;
pub mod folder;
pub mod manifest;
pub mod registry;
pub mod station;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use events::{
    ConnectionStatus, PipelineStep, StepProgress, StepState, SyncEvent, SyncEventKind, SyncScope,
};
pub use folder::{Content, Folder};
pub use manifest::ManifestDoc;
pub use registry::{NodeRegistry, TagRegistry};
pub use station::Station;
pub use types::*;
