//! # Station Manager
//!
//! The authoring side: every edit a host makes to a station goes through
//! here, under the same per-station lock the sync uses.
//!
//! ## Edit Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lock(station) ─► load ─► mutate (station-core) ─► side effects ─► save │
//! │                                                     │            + flag │
//! │                                                     ├─ cache new file    │
//! │                                                     ├─ drop cached file  │
//! │                                                     └─ queue device      │
//! │                                                        delete for media  │
//! │                                                        already uploaded  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every successful edit marks the station as having pending changes; only
//! a committed sync or a pull from the controller clears the mark.

use std::sync::Arc;

use station_core::{
    AppRole, ConnectionStatus, Content, ContentId, CoreError, CoreResult, FolderId, Media, NodeId,
    NodeRole, PendingDeleteEntry, Station, StationId, TagId, ValidationError,
};
use station_db::{CacheSource, Database, MediaCache, StationSummary};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{StationLocks, StationSync};
use crate::pipeline::{self, StepCallback};
use crate::probe::HostProbe;
use crate::progress::SyncProgressReporter;
use crate::protocol::RegistrationOutcome;
use crate::service::NodeCommandService;

/// Authoring facade over stations, their media cache and their nodes.
pub struct StationManager {
    db: Arc<Database>,
    cache: Arc<MediaCache>,
    service: Arc<NodeCommandService>,
    probe: Arc<dyn HostProbe>,
    sync: StationSync,
    locks: StationLocks,
    role: AppRole,
    icmp_enabled: bool,
}

impl StationManager {
    pub fn new(
        db: Arc<Database>,
        cache: Arc<MediaCache>,
        service: Arc<NodeCommandService>,
        probe: Arc<dyn HostProbe>,
        role: AppRole,
        icmp_enabled: bool,
    ) -> Self {
        let locks = StationLocks::new();
        let sync = StationSync::new(db.clone(), cache.clone(), service.clone(), locks.clone());
        StationManager {
            db,
            cache,
            service,
            probe,
            sync,
            locks,
            role,
            icmp_enabled,
        }
    }

    pub fn role(&self) -> AppRole {
        self.role
    }

    /// Remote control of nodes (play, stop, volume...).
    pub fn service(&self) -> &NodeCommandService {
        &self.service
    }

    pub fn sync_engine(&self) -> &StationSync {
        &self.sync
    }

    // =========================================================================
    // Stations
    // =========================================================================

    pub async fn create_station(&self, name: &str) -> SyncResult<Station> {
        let station = self.db.stations().create(name).await?;
        self.cache.hydrate(station.id).await?;
        Ok(station)
    }

    pub async fn list_stations(&self) -> SyncResult<Vec<StationSummary>> {
        Ok(self.db.stations().list().await?)
    }

    pub async fn station(&self, station_id: StationId) -> SyncResult<Station> {
        Ok(self.db.stations().get(station_id).await?)
    }

    pub async fn has_pending_changes(&self, station_id: StationId) -> SyncResult<bool> {
        Ok(self.db.stations().has_pending_changes(station_id).await?)
    }

    pub async fn rename_station(&self, station_id: StationId, name: &str) -> SyncResult<()> {
        self.edit(station_id, |station| station.rename(name)).await
    }

    /// Deletes a station together with its cached files and queued deletes.
    pub async fn delete_station(&self, station_id: StationId) -> SyncResult<()> {
        {
            let _guard = self.locks.lock(station_id).await;
            self.db.stations().delete(station_id).await?;
            self.cache.ensure_hydrated(station_id).await?;
            if self.cache.has_station(station_id).await {
                self.cache.delete_all_cached_media(station_id).await?;
            }
        }
        self.locks.forget(station_id).await;
        info!(station_id, "Station deleted");
        Ok(())
    }

    // =========================================================================
    // Folders
    // =========================================================================

    pub async fn add_folder(
        &self,
        station_id: StationId,
        parent_id: FolderId,
        name: &str,
    ) -> SyncResult<FolderId> {
        self.edit(station_id, |station| station.add_folder(parent_id, name))
            .await
    }

    pub async fn rename_folder(
        &self,
        station_id: StationId,
        folder_id: FolderId,
        name: &str,
    ) -> SyncResult<()> {
        self.edit(station_id, |station| station.rename_folder(folder_id, name))
            .await
    }

    /// Deletes a folder subtree and discards the media of every content in it.
    pub async fn delete_folder(&self, station_id: StationId, folder_id: FolderId) -> SyncResult<()> {
        let _guard = self.locks.lock(station_id).await;
        let mut station = self.db.stations().get(station_id).await?;

        let folder = station.remove_folder(folder_id)?;
        self.cache.ensure_hydrated(station_id).await?;
        for content in folder.all_contents() {
            self.discard_content_media(station_id, content).await?;
        }
        self.save(&station).await
    }

    // =========================================================================
    // Contents
    // =========================================================================

    pub async fn add_content(
        &self,
        station_id: StationId,
        folder_id: FolderId,
        name: &str,
    ) -> SyncResult<ContentId> {
        self.edit(station_id, |station| station.add_content(folder_id, name))
            .await
    }

    pub async fn rename_content(
        &self,
        station_id: StationId,
        content_id: ContentId,
        name: &str,
    ) -> SyncResult<()> {
        self.edit(station_id, |station| station.rename_content(content_id, name))
            .await
    }

    pub async fn move_content(
        &self,
        station_id: StationId,
        content_id: ContentId,
        folder_id: FolderId,
    ) -> SyncResult<()> {
        self.edit(station_id, |station| station.move_content(content_id, folder_id))
            .await
    }

    pub async fn delete_content(&self, station_id: StationId, content_id: ContentId) -> SyncResult<()> {
        let _guard = self.locks.lock(station_id).await;
        let mut station = self.db.stations().get(station_id).await?;

        let content = station.remove_content(content_id)?;
        self.cache.ensure_hydrated(station_id).await?;
        self.discard_content_media(station_id, &content).await?;
        self.save(&station).await
    }

    pub async fn set_light_intensity(
        &self,
        station_id: StationId,
        content_id: ContentId,
        level: u8,
    ) -> SyncResult<()> {
        self.edit(station_id, |station| station.set_light_intensity(content_id, level))
            .await
    }

    // =========================================================================
    // Media
    // =========================================================================

    /// Assigns a media file to a (content, node) slot and caches its bytes
    /// for the next sync.
    ///
    /// An uploaded media it replaces is queued for deletion on the node.
    pub async fn set_media(
        &self,
        station_id: StationId,
        content_id: ContentId,
        media: Media,
        source: CacheSource,
    ) -> SyncResult<()> {
        let extension = media.extension().ok_or_else(|| {
            CoreError::from(ValidationError::InvalidFormat {
                field: "file name".to_string(),
                reason: "missing file extension".to_string(),
            })
        })?;
        let node_id = media.node_id;

        let _guard = self.locks.lock(station_id).await;
        let mut station = self.db.stations().get(station_id).await?;

        let replaced = station.set_media(content_id, media)?;
        self.cache
            .cache_media(station_id, content_id, node_id, &extension, source)
            .await?;
        if let Some(old) = replaced {
            self.queue_device_delete(station_id, &old).await?;
        }

        debug!(station_id, content_id, node_id, %extension, "Media assigned");
        self.save(&station).await
    }

    /// Clears a (content, node) slot.
    pub async fn remove_media(
        &self,
        station_id: StationId,
        content_id: ContentId,
        node_id: NodeId,
    ) -> SyncResult<()> {
        let _guard = self.locks.lock(station_id).await;
        let mut station = self.db.stations().get(station_id).await?;

        let media = station.remove_media(content_id, node_id)?;
        self.cache.ensure_hydrated(station_id).await?;
        self.discard_media(station_id, content_id, &media).await?;
        self.save(&station).await
    }

    // =========================================================================
    // Tags
    // =========================================================================

    pub async fn add_tag(&self, station_id: StationId, name: &str) -> SyncResult<TagId> {
        self.edit(station_id, |station| station.add_tag(name)).await
    }

    pub async fn rename_tag(&self, station_id: StationId, tag_id: TagId, name: &str) -> SyncResult<()> {
        self.edit(station_id, |station| station.rename_tag(tag_id, name))
            .await
    }

    pub async fn delete_tag(&self, station_id: StationId, tag_id: TagId) -> SyncResult<()> {
        self.edit(station_id, |station| station.remove_tag(tag_id).map(|_| ()))
            .await
    }

    pub async fn tag_content(
        &self,
        station_id: StationId,
        content_id: ContentId,
        tag_id: TagId,
    ) -> SyncResult<bool> {
        self.edit(station_id, |station| station.tag_content(content_id, tag_id))
            .await
    }

    pub async fn untag_content(
        &self,
        station_id: StationId,
        content_id: ContentId,
        tag_id: TagId,
    ) -> SyncResult<bool> {
        self.edit(station_id, |station| station.untag_content(content_id, tag_id))
            .await
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    pub async fn add_node(
        &self,
        station_id: StationId,
        name: &str,
        ip: &str,
        role: NodeRole,
    ) -> SyncResult<NodeId> {
        self.edit(station_id, |station| station.add_node(name, ip, role))
            .await
    }

    pub async fn update_node(
        &self,
        station_id: StationId,
        node_id: NodeId,
        name: &str,
        ip: &str,
        role: NodeRole,
    ) -> SyncResult<()> {
        self.edit(station_id, |station| station.update_node(node_id, name, ip, role))
            .await
    }

    /// Removes a node. Its cached files and queued deletes are dropped,
    /// since they can never be delivered.
    pub async fn delete_node(&self, station_id: StationId, node_id: NodeId) -> SyncResult<()> {
        let _guard = self.locks.lock(station_id).await;
        let mut station = self.db.stations().get(station_id).await?;

        let (node, detached) = station.remove_node(node_id)?;
        self.cache.ensure_hydrated(station_id).await?;
        for entry in self.cache.cached_media_for_station(station_id).await {
            if entry.node_id == node_id {
                self.cache
                    .delete_cached_media(station_id, entry.content_id, node_id)
                    .await?;
            }
        }
        let dropped = self
            .db
            .pending_deletes()
            .remove_all_for_node(station_id, node_id)
            .await?;

        info!(
            station_id,
            node_id,
            name = %node.name,
            media = detached.len(),
            dropped_deletes = dropped,
            "Node removed"
        );
        self.save(&station).await
    }

    /// Runs the health-check pipeline against a node and closes the
    /// connection again.
    pub async fn check_node(
        &self,
        station_id: StationId,
        node_id: NodeId,
        progress: Option<StepCallback<'_>>,
    ) -> SyncResult<ConnectionStatus> {
        let station = self.db.stations().get(station_id).await?;
        let ip = station.node(node_id)?.ip.clone();

        let result = pipeline::health_check(
            &self.service,
            self.probe.as_ref(),
            &ip,
            self.role,
            self.icmp_enabled,
        )
        .run(progress)
        .await;

        if let Err(e) = self.service.disconnect(&ip).await {
            debug!(ip = %ip, error = %e, "Disconnect after check failed");
        }
        let status = result?;
        info!(station_id, node_id, %status, "Node checked");
        Ok(status)
    }

    // =========================================================================
    // Sync
    // =========================================================================

    /// Pushes pending work to the nodes as this manager's role.
    pub async fn sync(
        &self,
        station_id: StationId,
        reporter: &dyn SyncProgressReporter,
    ) -> SyncResult<bool> {
        self.sync.sync_as(station_id, self.role, reporter).await
    }

    /// Replaces the local station with the manifest held by its controller.
    ///
    /// Local pending work belongs to the replaced tree and is dropped.
    pub async fn pull_from_controller(&self, station_id: StationId) -> SyncResult<Station> {
        let _guard = self.locks.lock(station_id).await;
        let current = self.db.stations().get(station_id).await?;
        let controller = current
            .controller()
            .cloned()
            .ok_or(SyncError::NoController(station_id))?;

        let fetched = self.fetch_manifest(&controller.ip).await;
        if let Err(e) = self.service.disconnect(&controller.ip).await {
            debug!(ip = %controller.ip, error = %e, "Disconnect after pull failed");
        }
        let manifest = fetched?;

        let station = Station::from_manifest_json(station_id, &manifest)?;
        self.db.stations().save(&station).await?;
        self.cache.ensure_hydrated(station_id).await?;
        if self.cache.has_station(station_id).await {
            self.cache.delete_all_cached_media(station_id).await?;
        }
        self.db.pending_deletes().remove_all_for_station(station_id).await?;
        self.db.stations().set_pending_changes(station_id, false).await?;

        info!(station_id, name = %station.name, "Station pulled from controller");
        Ok(station)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn fetch_manifest(&self, ip: &str) -> SyncResult<String> {
        if !self.service.connect(ip).await? {
            return Err(SyncError::ConnectionFailed {
                ip: ip.to_string(),
                message: "controller not reachable".to_string(),
            });
        }
        let outcome = self.service.register(ip, self.role).await?;
        if outcome != RegistrationOutcome::Accepted {
            return Err(SyncError::RegistrationRefused {
                ip: ip.to_string(),
                outcome: outcome.to_string(),
            });
        }
        self.service
            .fetch_manifest(ip)
            .await?
            .ok_or_else(|| SyncError::InvalidMessage("controller sent no manifest".to_string()))
    }

    /// Loads, mutates and saves a station under its lock.
    async fn edit<T, F>(&self, station_id: StationId, mutate: F) -> SyncResult<T>
    where
        F: FnOnce(&mut Station) -> CoreResult<T> + Send,
        T: Send,
    {
        let _guard = self.locks.lock(station_id).await;
        let mut station = self.db.stations().get(station_id).await?;
        let value = mutate(&mut station)?;
        self.save(&station).await?;
        Ok(value)
    }

    async fn save(&self, station: &Station) -> SyncResult<()> {
        self.db.stations().save(station).await?;
        self.db.stations().set_pending_changes(station.id, true).await?;
        Ok(())
    }

    async fn discard_content_media(&self, station_id: StationId, content: &Content) -> SyncResult<()> {
        for media in content.media.values() {
            self.discard_media(station_id, content.id, media).await?;
        }
        Ok(())
    }

    /// Forgets a media that left the tree: its cached file if it was never
    /// sent, a device delete if it was.
    async fn discard_media(
        &self,
        station_id: StationId,
        content_id: ContentId,
        media: &Media,
    ) -> SyncResult<()> {
        if self
            .cache
            .is_media_cached(station_id, content_id, media.node_id)
            .await
        {
            self.cache
                .delete_cached_media(station_id, content_id, media.node_id)
                .await?;
        }
        self.queue_device_delete(station_id, media).await
    }

    async fn queue_device_delete(&self, station_id: StationId, media: &Media) -> SyncResult<()> {
        if !media.is_uploaded() {
            return Ok(());
        }
        self.db
            .pending_deletes()
            .add(&PendingDeleteEntry {
                station_id,
                node_id: media.node_id,
                media_id: media.id_on_device,
            })
            .await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::AssumeReachable;
    use crate::progress::NoOpReporter;
    use crate::testing::{FakeNode, FakeTransport};
    use station_core::{StepProgress, StepState, ROOT_FOLDER_ID};
    use station_db::{DbConfig, MemoryFileStorage};
    use std::sync::Mutex;

    const CONTROLLER_IP: &str = "10.0.0.1";
    const PLAYER_IP: &str = "10.0.0.2";

    async fn manager() -> (Arc<FakeTransport>, StationManager) {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        manager_over(db, Arc::new(MemoryFileStorage::new()))
    }

    /// A manager as a fresh process would build it over existing state.
    fn manager_over(
        db: Arc<Database>,
        storage: Arc<MemoryFileStorage>,
    ) -> (Arc<FakeTransport>, StationManager) {
        let fake = FakeTransport::new();
        let service = fake.service();
        let cache = Arc::new(MediaCache::new(storage));
        let manager = StationManager::new(
            db,
            cache,
            service,
            Arc::new(AssumeReachable),
            AppRole::Admin,
            true,
        );
        (fake, manager)
    }

    /// Station with a controller and a player; returns (station, player).
    async fn station(manager: &StationManager) -> (StationId, NodeId) {
        let station = manager.create_station("Museum").await.unwrap();
        manager
            .add_node(station.id, "Entrance", CONTROLLER_IP, NodeRole::Controller)
            .await
            .unwrap();
        let player = manager
            .add_node(station.id, "Hall", PLAYER_IP, NodeRole::Default)
            .await
            .unwrap();
        (station.id, player)
    }

    /// Marks a slot as uploaded under `id`, the way a sync would.
    async fn mark_uploaded(
        manager: &StationManager,
        station_id: StationId,
        content: ContentId,
        node: NodeId,
        id: i64,
    ) {
        let mut station = manager.station(station_id).await.unwrap();
        station.set_media_device_id(content, node, id).unwrap();
        manager.db.stations().save(&station).await.unwrap();
        manager
            .cache
            .delete_cached_media(station_id, content, node)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_edits_mark_pending_changes() {
        let (_, manager) = manager().await;
        let station = manager.create_station("Museum").await.unwrap();
        assert!(!manager.has_pending_changes(station.id).await.unwrap());

        let folder = manager.add_folder(station.id, ROOT_FOLDER_ID, "Lobby").await.unwrap();
        let content = manager.add_content(station.id, folder, "Welcome").await.unwrap();
        manager.set_light_intensity(station.id, content, 2).await.unwrap();
        let tag = manager.add_tag(station.id, "Kids").await.unwrap();
        assert!(manager.tag_content(station.id, content, tag).await.unwrap());

        let saved = manager.station(station.id).await.unwrap();
        let stored = saved.content(content).unwrap();
        assert_eq!(stored.light_intensity, 2);
        assert_eq!(stored.tag_ids, vec![tag]);
        assert!(manager.has_pending_changes(station.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_edit_changes_nothing() {
        let (_, manager) = manager().await;
        let station = manager.create_station("Museum").await.unwrap();

        let err = manager.rename_content(station.id, 42, "Ghost").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!manager.has_pending_changes(station.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_set_media_caches_file() {
        let (_, manager) = manager().await;
        let (station_id, player) = station(&manager).await;
        let content = manager.add_content(station_id, ROOT_FOLDER_ID, "Intro").await.unwrap();

        manager
            .set_media(
                station_id,
                content,
                Media::video(player, "Intro.MP4", 30.0),
                CacheSource::Bytes(vec![1, 2, 3]),
            )
            .await
            .unwrap();

        let cached = manager.cache.cached_media_for_station(station_id).await;
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].file_extension, "mp4");
        assert_eq!(
            manager
                .cache
                .get_cached_media_file(station_id, content, player)
                .await
                .unwrap(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_set_media_without_extension_is_rejected() {
        let (_, manager) = manager().await;
        let (station_id, player) = station(&manager).await;
        let content = manager.add_content(station_id, ROOT_FOLDER_ID, "Intro").await.unwrap();

        let err = manager
            .set_media(
                station_id,
                content,
                Media::image(player, "poster"),
                CacheSource::Bytes(vec![1]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Core(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn test_replacing_uploaded_media_queues_delete() {
        let (_, manager) = manager().await;
        let (station_id, player) = station(&manager).await;
        let content = manager.add_content(station_id, ROOT_FOLDER_ID, "Intro").await.unwrap();
        manager
            .set_media(station_id, content, Media::image(player, "a.png"), CacheSource::Bytes(vec![1]))
            .await
            .unwrap();
        mark_uploaded(&manager, station_id, content, player, 11).await;

        manager
            .set_media(station_id, content, Media::image(player, "b.png"), CacheSource::Bytes(vec![2]))
            .await
            .unwrap();

        let deletes = manager.db.pending_deletes().list_for_station(station_id).await.unwrap();
        assert_eq!(deletes.len(), 1);
        assert_eq!(deletes[0].media_id, 11);
        assert!(manager.cache.is_media_cached(station_id, content, player).await);
    }

    #[tokio::test]
    async fn test_deleting_content_discards_its_media() {
        let (_, manager) = manager().await;
        let (station_id, player) = station(&manager).await;
        let sent = manager.add_content(station_id, ROOT_FOLDER_ID, "Sent").await.unwrap();
        let unsent = manager.add_content(station_id, ROOT_FOLDER_ID, "Unsent").await.unwrap();
        for content in [sent, unsent] {
            manager
                .set_media(station_id, content, Media::image(player, "x.png"), CacheSource::Bytes(vec![1]))
                .await
                .unwrap();
        }
        mark_uploaded(&manager, station_id, sent, player, 5).await;

        manager.delete_content(station_id, sent).await.unwrap();
        manager.delete_content(station_id, unsent).await.unwrap();

        let deletes = manager.db.pending_deletes().list_for_station(station_id).await.unwrap();
        assert_eq!(deletes.iter().map(|d| d.media_id).collect::<Vec<_>>(), vec![5]);
        assert!(!manager.cache.is_media_cached(station_id, unsent, player).await);
    }

    #[tokio::test]
    async fn test_deleting_folder_discards_nested_media() {
        let (_, manager) = manager().await;
        let (station_id, player) = station(&manager).await;
        let folder = manager.add_folder(station_id, ROOT_FOLDER_ID, "Lobby").await.unwrap();
        let nested = manager.add_folder(station_id, folder, "Night").await.unwrap();
        let content = manager.add_content(station_id, nested, "Stars").await.unwrap();
        manager
            .set_media(station_id, content, Media::image(player, "s.png"), CacheSource::Bytes(vec![1]))
            .await
            .unwrap();

        manager.delete_folder(station_id, folder).await.unwrap();

        assert!(!manager.cache.is_media_cached(station_id, content, player).await);
        let station = manager.station(station_id).await.unwrap();
        assert!(station.content(content).is_err());
    }

    #[tokio::test]
    async fn test_deleting_node_purges_its_work() {
        let (_, manager) = manager().await;
        let (station_id, player) = station(&manager).await;
        let content = manager.add_content(station_id, ROOT_FOLDER_ID, "Intro").await.unwrap();
        manager
            .set_media(station_id, content, Media::image(player, "a.png"), CacheSource::Bytes(vec![1]))
            .await
            .unwrap();
        manager
            .db
            .pending_deletes()
            .add(&PendingDeleteEntry {
                station_id,
                node_id: player,
                media_id: 3,
            })
            .await
            .unwrap();

        manager.delete_node(station_id, player).await.unwrap();

        assert!(!manager.cache.is_media_cached(station_id, content, player).await);
        assert_eq!(
            manager.db.pending_deletes().count_for_station(station_id).await.unwrap(),
            0
        );
        let station = manager.station(station_id).await.unwrap();
        assert!(station.content(content).unwrap().media.is_empty());
    }

    #[tokio::test]
    async fn test_edits_after_restart_see_earlier_cached_files() {
        let db = Arc::new(Database::new(DbConfig::in_memory()).await.unwrap());
        let storage = Arc::new(MemoryFileStorage::new());
        let (_, before) = manager_over(db.clone(), storage.clone());
        let (station_id, player) = station(&before).await;
        let intro = before.add_content(station_id, ROOT_FOLDER_ID, "Intro").await.unwrap();
        let outro = before.add_content(station_id, ROOT_FOLDER_ID, "Outro").await.unwrap();
        for content in [intro, outro] {
            before
                .set_media(station_id, content, Media::image(player, "x.png"), CacheSource::Bytes(vec![1]))
                .await
                .unwrap();
        }

        let (_, after) = manager_over(db, storage.clone());
        after.delete_content(station_id, intro).await.unwrap();
        assert!(after.cache.is_media_cached(station_id, outro, player).await);
        assert!(!after.cache.is_media_cached(station_id, intro, player).await);

        after.delete_node(station_id, player).await.unwrap();
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_second_controller_is_rejected() {
        let (_, manager) = manager().await;
        let (station_id, _) = station(&manager).await;

        let err = manager
            .add_node(station_id, "Annex", "10.0.0.9", NodeRole::Controller)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::Core(CoreError::ControllerAlreadyDefined { existing: 0 })
        ));
    }

    #[tokio::test]
    async fn test_delete_station_clears_cache() {
        let (_, manager) = manager().await;
        let (station_id, player) = station(&manager).await;
        let content = manager.add_content(station_id, ROOT_FOLDER_ID, "Intro").await.unwrap();
        manager
            .set_media(station_id, content, Media::image(player, "a.png"), CacheSource::Bytes(vec![1]))
            .await
            .unwrap();

        manager.delete_station(station_id).await.unwrap();

        assert!(!manager.cache.has_station(station_id).await);
        assert!(manager.station(station_id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_check_node_reports_steps() {
        let (fake, manager) = manager().await;
        let (station_id, player) = station(&manager).await;
        fake.add_node(PLAYER_IP, FakeNode::default());

        let seen = Mutex::new(Vec::new());
        let record = |p: StepProgress| seen.lock().unwrap().push(p);
        let status = manager
            .check_node(station_id, player, Some(&record))
            .await
            .unwrap();

        assert_eq!(status, ConnectionStatus::Online);
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 8);
        assert!(seen.iter().all(|p| p.state != StepState::Failed));
        assert!(!manager.service().is_connected(PLAYER_IP).await);
    }

    #[tokio::test]
    async fn test_sync_then_pull_round_trip() {
        let (fake, manager) = manager().await;
        let (station_id, player) = station(&manager).await;
        fake.add_node(CONTROLLER_IP, FakeNode::default());
        fake.add_node(PLAYER_IP, FakeNode::default());
        let content = manager.add_content(station_id, ROOT_FOLDER_ID, "Intro").await.unwrap();
        manager
            .set_media(station_id, content, Media::image(player, "a.png"), CacheSource::Bytes(vec![1]))
            .await
            .unwrap();

        assert!(manager.sync(station_id, &NoOpReporter).await.unwrap());
        assert!(!manager.has_pending_changes(station_id).await.unwrap());

        let committed = manager.station(station_id).await.unwrap().to_manifest_json().unwrap();
        fake.set_manifest(CONTROLLER_IP, &committed);
        manager.rename_station(station_id, "Local edit").await.unwrap();

        let pulled = manager.pull_from_controller(station_id).await.unwrap();
        assert_eq!(pulled.name, "Museum");
        assert_eq!(pulled.media(content, player).unwrap().id_on_device, 1);
        assert!(!manager.has_pending_changes(station_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_pull_without_controller_fails() {
        let (_, manager) = manager().await;
        let station = manager.create_station("Museum").await.unwrap();

        let err = manager.pull_from_controller(station.id).await.unwrap_err();
        assert!(matches!(err, SyncError::NoController(id) if id == station.id));
    }
}
