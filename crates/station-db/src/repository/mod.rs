//! # Repository Module
//!
//! SQLite repositories for media stations.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  StationManager / StationSync                                           │
//! │       │                                                                 │
//! │       │  db.stations().get(id)                                          │
//! │       │  db.pending_deletes().list_for_station(id)                      │
//! │       ▼                                                                 │
//! │  StationRepository            PendingDeleteRepository                  │
//! │  ├── create / get / list      ├── add (idempotent)                     │
//! │  ├── save / delete            ├── list_for_station                     │
//! │  └── pending flag             └── remove / remove_all_*                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`StationRepository`](station::StationRepository) - Station rows and the pending flag
//! - [`PendingDeleteRepository`](pending_delete::PendingDeleteRepository) - Queued device deletes

pub mod pending_delete;
pub mod station;
