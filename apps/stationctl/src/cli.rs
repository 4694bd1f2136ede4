//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use station_core::{ContentId, FolderId, NodeId, StationId, ROOT_FOLDER_ID};

#[derive(Debug, Parser)]
#[command(name = "stationctl", version, about = "Edit and sync media stations")]
pub struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "MEDIASTATION_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List all stations
    List,

    /// Create an empty station
    Create { name: String },

    /// Print a station's manifest
    Show { station: StationId },

    /// Add a node to a station
    AddNode {
        station: StationId,
        name: String,
        ip: String,
        /// Make this node the station's controller
        #[arg(long)]
        controller: bool,
    },

    /// Add a folder
    AddFolder {
        station: StationId,
        name: String,
        #[arg(long, default_value_t = ROOT_FOLDER_ID)]
        parent: FolderId,
    },

    /// Add a content
    AddContent {
        station: StationId,
        name: String,
        #[arg(long, default_value_t = ROOT_FOLDER_ID)]
        folder: FolderId,
    },

    /// Assign a media file to a content on one node
    SetMedia {
        station: StationId,
        content: ContentId,
        node: NodeId,
        file: PathBuf,
        /// Video length in seconds; omit for images
        #[arg(long)]
        duration: Option<f64>,
    },

    /// Push pending changes to the station's nodes
    Sync {
        station: StationId,
        /// `admin` or `user` (defaults to the configured role)
        #[arg(long)]
        role: Option<String>,
    },

    /// Run the connection health check against a node
    Check { station: StationId, node: NodeId },

    /// Replace the local station with the controller's manifest
    Pull { station: StationId },
}
