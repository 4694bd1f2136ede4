//! # Sync Orchestrator
//!
//! Pushes a station's pending work to its nodes, then commits the manifest
//! to the controller.
//!
//! ## Sync Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     StationSync::sync(station, role)                    │
//! │                                                                         │
//! │  1. Plan     cached uploads + pending deletes, grouped by node id       │
//! │              (ascending); entries for removed nodes are discarded       │
//! │                                                                         │
//! │  2. Per node (sequential, one connection at a time)                     │
//! │     ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────────┐   │
//! │     │ connect  │──►│ register │──►│ upload each  │──►│ delete each  │   │
//! │     │ + ping   │   │  (role)  │   │ cached file  │   │ queued id    │   │
//! │     └────┬─────┘   └────┬─────┘   └──────┬───────┘   └──────┬───────┘   │
//! │          │ fail         │ blocked/no     │ fail              │ fail     │
//! │          ▼              ▼                ▼                   ▼          │
//! │     node failed: stop at once, continue with next node                  │
//! │     (everything not yet delivered stays queued)                         │
//! │                                                                         │
//! │  3. Commit   only if every node succeeded:                              │
//! │              controller ◄── contents put <manifest>                     │
//! │              pending-changes flag cleared                               │
//! │                                                                         │
//! │  4. Done { success }                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A failed run leaves everything it could not deliver in the cache and the
//! pending-delete table, so the next run resumes from there. Each upload is
//! removed from the cache only after the device id is saved, and each delete
//! is removed from the table only after it was sent.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use station_core::{
    AppRole, ConnectionStatus, Node, NodeId, PendingCacheEntry, PendingDeleteEntry, Station,
    StationId, SyncEvent, SyncEventKind,
};
use station_db::{Database, MediaCache};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::parse_role;
use crate::error::SyncResult;
use crate::pipeline;
use crate::progress::SyncProgressReporter;
use crate::protocol::RegistrationOutcome;
use crate::service::NodeCommandService;

// =============================================================================
// Station Locks
// =============================================================================

/// One exclusive lock per station. Syncs and edits of the same station
/// take turns; different stations never wait on each other.
#[derive(Clone, Default)]
pub struct StationLocks {
    inner: Arc<Mutex<HashMap<StationId, Arc<Mutex<()>>>>>,
}

impl StationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock of a station.
    pub async fn lock(&self, station_id: StationId) -> OwnedMutexGuard<()> {
        let lock = self
            .inner
            .lock()
            .await
            .entry(station_id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Drops the lock entry of a deleted station.
    pub async fn forget(&self, station_id: StationId) {
        self.inner.lock().await.remove(&station_id);
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Work queued for one node.
#[derive(Debug, Default)]
struct NodeWork {
    uploads: Vec<PendingCacheEntry>,
    deletes: Vec<PendingDeleteEntry>,
}

/// Runs station syncs.
pub struct StationSync {
    db: Arc<Database>,
    cache: Arc<MediaCache>,
    service: Arc<NodeCommandService>,
    locks: StationLocks,
}

impl StationSync {
    pub fn new(
        db: Arc<Database>,
        cache: Arc<MediaCache>,
        service: Arc<NodeCommandService>,
        locks: StationLocks,
    ) -> Self {
        StationSync {
            db,
            cache,
            service,
            locks,
        }
    }

    pub fn locks(&self) -> &StationLocks {
        &self.locks
    }

    /// Syncs a station as the `admin` or `user` app.
    ///
    /// Returns whether everything was delivered and the manifest committed.
    /// Unreachable or refusing nodes are reported as events and yield
    /// `Ok(false)`; an unknown role string is an error.
    pub async fn sync(
        &self,
        station_id: StationId,
        role: &str,
        reporter: &dyn SyncProgressReporter,
    ) -> SyncResult<bool> {
        let role = parse_role(role)?;
        self.sync_as(station_id, role, reporter).await
    }

    pub async fn sync_as(
        &self,
        station_id: StationId,
        role: AppRole,
        reporter: &dyn SyncProgressReporter,
    ) -> SyncResult<bool> {
        let _guard = self.locks.lock(station_id).await;
        self.sync_locked(station_id, role, reporter).await
    }

    async fn sync_locked(
        &self,
        station_id: StationId,
        role: AppRole,
        reporter: &dyn SyncProgressReporter,
    ) -> SyncResult<bool> {
        let mut station = self.db.stations().get(station_id).await?;
        self.cache.ensure_hydrated(station_id).await?;

        let work = self.plan(&station).await?;
        info!(station_id, %role, nodes = work.len(), "Starting station sync");

        let mut success = true;
        for (node_id, node_work) in work {
            let node = station.node(node_id)?.clone();
            if !self.sync_node(&mut station, &node, role, node_work, reporter).await? {
                success = false;
            }
        }

        if success {
            success = self.commit(&station, role, reporter).await?;
        } else {
            warn!(station_id, "Station not fully synced, manifest not sent");
        }

        info!(station_id, success, "Station sync finished");
        reporter.report(SyncEvent::station(SyncEventKind::Done { success }));
        Ok(success)
    }

    /// Groups queued work by node, dropping work for nodes that are gone.
    async fn plan(&self, station: &Station) -> SyncResult<BTreeMap<NodeId, NodeWork>> {
        let mut work: BTreeMap<NodeId, NodeWork> = BTreeMap::new();

        for entry in self.cache.cached_media_for_station(station.id).await {
            if station.nodes.contains(entry.node_id) {
                work.entry(entry.node_id).or_default().uploads.push(entry);
            } else {
                warn!(
                    station_id = station.id,
                    node_id = entry.node_id,
                    content_id = entry.content_id,
                    "Discarding cached media for removed node"
                );
                self.cache
                    .delete_cached_media(station.id, entry.content_id, entry.node_id)
                    .await?;
            }
        }

        for entry in self.db.pending_deletes().list_for_station(station.id).await? {
            if station.nodes.contains(entry.node_id) {
                work.entry(entry.node_id).or_default().deletes.push(entry);
            } else {
                warn!(
                    station_id = station.id,
                    node_id = entry.node_id,
                    media_id = entry.media_id,
                    "Discarding pending delete for removed node"
                );
                self.db.pending_deletes().remove(&entry).await?;
            }
        }

        Ok(work)
    }

    /// Delivers one node's work. Returns `Ok(false)` if anything was left over.
    async fn sync_node(
        &self,
        station: &mut Station,
        node: &Node,
        role: AppRole,
        work: NodeWork,
        reporter: &dyn SyncProgressReporter,
    ) -> SyncResult<bool> {
        reporter.report(node_event(node, SyncEventKind::Connecting));
        if !self.open_session(node, role, reporter).await? {
            self.disconnect_quietly(&node.ip).await;
            return Ok(false);
        }

        let complete = self.deliver(station, node, work, reporter).await;
        self.disconnect_quietly(&node.ip).await;
        let complete = complete?;
        debug!(station_id = station.id, node_id = node.id, complete, "Node done");
        Ok(complete)
    }

    /// Sends uploads, then deletes, over an open session.
    ///
    /// Stops at the first failure: the session may be broken, and whatever
    /// was not delivered stays queued for the next run.
    async fn deliver(
        &self,
        station: &mut Station,
        node: &Node,
        work: NodeWork,
        reporter: &dyn SyncProgressReporter,
    ) -> SyncResult<bool> {
        let NodeWork {
            uploads,
            mut deletes,
        } = work;

        for entry in &uploads {
            if !self.upload(station, node, entry, &mut deletes, reporter).await? {
                return Ok(false);
            }
        }
        for entry in &deletes {
            if !self.send_delete(node, entry, reporter).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Connects and registers. Refusals are reported and yield `Ok(false)`.
    async fn open_session(
        &self,
        node: &Node,
        role: AppRole,
        reporter: &dyn SyncProgressReporter,
    ) -> SyncResult<bool> {
        let status = match pipeline::for_sync(&self.service, &node.ip).run(None).await {
            Ok(status) => status,
            Err(e) if e.is_retryable() => {
                warn!(node_id = node.id, ip = %node.ip, error = %e, "Connection broke during ping");
                ConnectionStatus::WebSocketPingFailed
            }
            Err(e) => return Err(e),
        };
        if !status.is_online() {
            warn!(node_id = node.id, ip = %node.ip, %status, "Node not reachable");
            reporter.report(node_event(node, SyncEventKind::ConnectionFailed { status }));
            return Ok(false);
        }

        let outcome = match self.service.register(&node.ip, role).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_retryable() => {
                warn!(node_id = node.id, error = %e, "Registration could not be sent");
                RegistrationOutcome::Rejected
            }
            Err(e) => return Err(e),
        };

        match outcome {
            RegistrationOutcome::Accepted => Ok(true),
            RegistrationOutcome::AcceptedBlocked => {
                reporter.report(node_event(node, SyncEventKind::RegistrationBlocked));
                Ok(false)
            }
            RegistrationOutcome::Rejected => {
                reporter.report(node_event(node, SyncEventKind::RegistrationRejected));
                Ok(false)
            }
        }
    }

    /// Uploads one cached file and records the id the node assigned.
    ///
    /// If the content vanished meanwhile, the uploaded file is queued for
    /// deletion on the same node.
    async fn upload(
        &self,
        station: &mut Station,
        node: &Node,
        entry: &PendingCacheEntry,
        deletes: &mut Vec<PendingDeleteEntry>,
        reporter: &dyn SyncProgressReporter,
    ) -> SyncResult<bool> {
        let content_id = entry.content_id;
        let failed = |reason: String| {
            warn!(node_id = node.id, content_id, %reason, "Media upload failed");
            reporter.report(node_event(node, SyncEventKind::MediaFailed { content_id, reason }));
            false
        };

        reporter.report(node_event(node, SyncEventKind::LoadingMedia { content_id }));
        let data = match self
            .cache
            .get_cached_media_file(station.id, content_id, node.id)
            .await
        {
            Ok(data) => data,
            Err(e) => return Ok(failed(e.to_string())),
        };

        reporter.report(node_event(node, SyncEventKind::SendingMedia { content_id }));
        let progress = |sent: u64, total: u64| {
            reporter.report(node_event(
                node,
                SyncEventKind::MediaProgress {
                    content_id,
                    sent: saturate(sent),
                    total: saturate(total),
                },
            ));
        };

        let id_on_device = match self
            .service
            .send_media(&node.ip, &entry.file_extension, data, &progress)
            .await
        {
            Ok(Some(id)) => id,
            Ok(None) => return Ok(failed("node did not acknowledge the upload".to_string())),
            Err(e) => return Ok(failed(e.to_string())),
        };

        match station.set_media_device_id(content_id, node.id, id_on_device) {
            Ok(()) => self.db.stations().save(station).await?,
            Err(e) if e.is_not_found() => {
                warn!(
                    node_id = node.id,
                    content_id,
                    id_on_device,
                    "Uploaded media no longer belongs to a content, queueing delete"
                );
                let orphan = PendingDeleteEntry {
                    station_id: station.id,
                    node_id: node.id,
                    media_id: id_on_device,
                };
                self.db.pending_deletes().add(&orphan).await?;
                deletes.push(orphan);
            }
            Err(e) => return Err(e.into()),
        }

        self.cache
            .delete_cached_media(station.id, content_id, node.id)
            .await?;
        reporter.report(node_event(
            node,
            SyncEventKind::MediaSent {
                content_id,
                id_on_device,
            },
        ));
        Ok(true)
    }

    /// Sends one queued delete, then forgets it.
    async fn send_delete(
        &self,
        node: &Node,
        entry: &PendingDeleteEntry,
        reporter: &dyn SyncProgressReporter,
    ) -> SyncResult<bool> {
        let media_id = entry.media_id;
        match self.service.delete_media(&node.ip, media_id).await {
            Ok(()) => {
                self.db.pending_deletes().remove(entry).await?;
                reporter.report(node_event(node, SyncEventKind::DeleteSent { media_id }));
                Ok(true)
            }
            Err(e) => {
                warn!(node_id = node.id, media_id, error = %e, "Delete not sent");
                reporter.report(node_event(
                    node,
                    SyncEventKind::DeleteFailed {
                        media_id,
                        reason: e.to_string(),
                    },
                ));
                Ok(false)
            }
        }
    }

    /// Sends the manifest to the controller and clears the pending flag.
    async fn commit(
        &self,
        station: &Station,
        role: AppRole,
        reporter: &dyn SyncProgressReporter,
    ) -> SyncResult<bool> {
        let Some(controller) = station.controller().cloned() else {
            warn!(station_id = station.id, "Station has no controller, manifest not sent");
            reporter.report(SyncEvent::station(SyncEventKind::NoController));
            return Ok(false);
        };

        reporter.report(node_event(&controller, SyncEventKind::Connecting));
        if !self.open_session(&controller, role, reporter).await? {
            self.disconnect_quietly(&controller.ip).await;
            return Ok(false);
        }

        let manifest = station.to_manifest_json()?;
        let sent = self.service.send_manifest(&controller.ip, &manifest).await;
        self.disconnect_quietly(&controller.ip).await;

        match sent {
            Ok(()) => {
                self.db.stations().set_pending_changes(station.id, false).await?;
                reporter.report(node_event(&controller, SyncEventKind::ManifestSent));
                info!(station_id = station.id, bytes = manifest.len(), "Manifest committed");
                Ok(true)
            }
            Err(e) if e.is_retryable() => {
                warn!(station_id = station.id, error = %e, "Manifest not sent");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn disconnect_quietly(&self, ip: &str) {
        if let Err(e) = self.service.disconnect(ip).await {
            debug!(ip, error = %e, "Disconnect failed");
        }
    }
}

fn node_event(node: &Node, kind: SyncEventKind) -> SyncEvent {
    if node.is_controller() {
        SyncEvent::controller(node.id, kind)
    } else {
        SyncEvent::player(node.id, kind)
    }
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

// =============================================================================
// Unit Tests
// =============================================================================
