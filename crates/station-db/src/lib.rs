//! # station-db: Persistence for Media Stations
//!
//! Everything that has to survive a restart: station rows, queued device
//! deletes, and the media files waiting to be uploaded.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          station-db                                     │
//! │                                                                         │
//! │  ┌─────────────────────────┐        ┌───────────────────────────────┐  │
//! │  │ Database (SqlitePool)   │        │ MediaCache                    │  │
//! │  │  ├── stations()         │        │  per-station pending uploads  │  │
//! │  │  └── pending_deletes()  │        │           │                   │  │
//! │  └───────────┬─────────────┘        │           ▼                   │  │
//! │              │                      │ FileStorage (trait)           │  │
//! │              ▼                      │  ├── LocalFileStorage         │  │
//! │  migrations/sqlite/*.sql            │  └── MemoryFileStorage        │  │
//! │                                     └───────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let db = Database::new(DbConfig::new("stations.db")).await?;
//! let station = db.stations().create("Museum").await?;
//!
//! let cache = MediaCache::new(Arc::new(LocalFileStorage::new("media")));
//! cache.hydrate(station.id).await?;
//! ```

pub mod cache;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod storage;

pub use cache::{CacheSource, MediaCache};
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::pending_delete::PendingDeleteRepository;
pub use repository::station::{StationRepository, StationSummary};
pub use storage::{FileStorage, LocalFileStorage, MemoryFileStorage};
