//! Sync progress reporting.
//!
//! The orchestrator keeps no queryable state; everything a host learns about
//! a running sync arrives through a [`SyncProgressReporter`].

use station_core::{SyncEvent, SyncEventKind};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Receives the events of a sync run, in order.
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpReporter;

impl SyncProgressReporter for NoOpReporter {
    fn report(&self, _event: SyncEvent) {}
}

/// Forwards events to a channel, e.g. towards a UI task.
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelReporter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelReporter { tx }, rx)
    }
}

impl SyncProgressReporter for ChannelReporter {
    fn report(&self, event: SyncEvent) {
        // A closed receiver means nobody is watching anymore
        let _ = self.tx.send(event);
    }
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl SyncProgressReporter for TracingReporter {
    fn report(&self, event: SyncEvent) {
        let scope = event.scope;
        let node_id = event.node_id;
        match &event.kind {
            SyncEventKind::MediaProgress { .. } => {}
            SyncEventKind::ConnectionFailed { .. }
            | SyncEventKind::RegistrationBlocked
            | SyncEventKind::RegistrationRejected
            | SyncEventKind::MediaFailed { .. }
            | SyncEventKind::DeleteFailed { .. }
            | SyncEventKind::NoController
            | SyncEventKind::Done { success: false } => {
                warn!(?scope, ?node_id, kind = ?event.kind, "Sync")
            }
            kind => info!(?scope, ?node_id, ?kind, "Sync"),
        }
    }
}
