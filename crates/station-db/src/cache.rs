//! # Media Cache
//!
//! Media files queued for upload, per station, plus the bookkeeping that
//! says which (content, node) slot each file belongs to.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          MediaCache                                     │
//! │                                                                         │
//! │  In memory                               In FileStorage                 │
//! │  ─────────                               ──────────────                 │
//! │  station 3 ─► [ (c0, n1, mp4),     ◄──►  3/0_1.mp4                      │
//! │                 (c2, n1, png) ]    ◄──►  3/2_1.png                      │
//! │  station 4 ─► [ ]                        (hydrated, nothing pending)    │
//! │                                                                         │
//! │  hydrate(3)  : list "3/", parse "{content}_{node}.{ext}"                │
//! │  cache_media : write file, then record entry                            │
//! │  delete_*    : remove file, then drop entry (and the station key when   │
//! │                its list becomes empty)                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The file names are the durable record, so a restart only needs
//! `hydrate` to rebuild the bookkeeping.
//!
//! ## Station Keys
//! A station key exists once the station was hydrated or had media cached,
//! and disappears when deletion empties its list.
//!
//! Whether a station was hydrated is tracked apart from its key: a key
//! created by `cache_media` alone says nothing about the files a previous
//! process left behind. `cache_media` and `ensure_hydrated` read storage
//! the first time they see a station.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use station_core::validation::validate_file_extension;
use station_core::{ContentId, NodeId, PendingCacheEntry, StationId};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::storage::FileStorage;

/// Where the bytes of a newly cached media file come from.
#[derive(Debug, Clone)]
pub enum CacheSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// Storage path of a cached file.
pub fn media_path(
    station_id: StationId,
    content_id: ContentId,
    node_id: NodeId,
    extension: &str,
) -> String {
    format!("{station_id}/{content_id}_{node_id}.{extension}")
}

/// Parses a cached file name (`{content}_{node}.{ext}`) back into an entry.
fn parse_file_name(station_id: StationId, name: &str) -> Option<PendingCacheEntry> {
    let (stem, extension) = name.rsplit_once('.')?;
    let (content, node) = stem.split_once('_')?;
    if validate_file_extension(extension).is_err() {
        return None;
    }
    Some(PendingCacheEntry {
        station_id,
        content_id: content.parse().ok()?,
        node_id: node.parse().ok()?,
        file_extension: extension.to_string(),
    })
}

/// Storage path of a pending entry.
pub fn entry_path(entry: &PendingCacheEntry) -> String {
    media_path(
        entry.station_id,
        entry.content_id,
        entry.node_id,
        &entry.file_extension,
    )
}

// =============================================================================
// Media Cache
// =============================================================================

#[derive(Default)]
struct CacheState {
    entries: HashMap<StationId, Vec<PendingCacheEntry>>,
    /// Stations whose stored files were read by this process.
    hydrated: HashSet<StationId>,
}

/// Per-station bookkeeping of media waiting to be uploaded.
pub struct MediaCache {
    storage: Arc<dyn FileStorage>,
    state: RwLock<CacheState>,
}

impl MediaCache {
    pub fn new(storage: Arc<dyn FileStorage>) -> Self {
        MediaCache {
            storage,
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Rebuilds a station's entries from the stored files.
    ///
    /// Returns the number of entries found. Files whose names do not follow
    /// the cache layout are skipped.
    pub async fn hydrate(&self, station_id: StationId) -> DbResult<usize> {
        let mut state = self.state.write().await;
        self.hydrate_locked(&mut state, station_id).await
    }

    /// Hydrates a station unless this process already did.
    ///
    /// Returns whether storage was read.
    pub async fn ensure_hydrated(&self, station_id: StationId) -> DbResult<bool> {
        let mut state = self.state.write().await;
        if state.hydrated.contains(&station_id) {
            return Ok(false);
        }
        self.hydrate_locked(&mut state, station_id).await?;
        Ok(true)
    }

    pub async fn is_hydrated(&self, station_id: StationId) -> bool {
        self.state.read().await.hydrated.contains(&station_id)
    }

    /// Stores a media file for upload and records it.
    ///
    /// A file already cached for the same (content, node) slot is replaced.
    pub async fn cache_media(
        &self,
        station_id: StationId,
        content_id: ContentId,
        node_id: NodeId,
        extension: &str,
        source: CacheSource,
    ) -> DbResult<PendingCacheEntry> {
        validate_file_extension(extension).map_err(station_core::CoreError::from)?;

        let entry = PendingCacheEntry {
            station_id,
            content_id,
            node_id,
            file_extension: extension.to_ascii_lowercase(),
        };
        let path = entry_path(&entry);

        let mut state = self.state.write().await;
        if !state.hydrated.contains(&station_id) {
            self.hydrate_locked(&mut state, station_id).await?;
        }

        match &source {
            CacheSource::Bytes(data) => self.storage.save_file(&path, data).await?,
            CacheSource::Path(source) => self.storage.save_file_by_path(&path, source).await?,
        }

        let list = state.entries.entry(station_id).or_default();
        let previous = list
            .iter()
            .position(|e| e.content_id == content_id && e.node_id == node_id)
            .map(|pos| list.remove(pos));
        list.push(entry.clone());

        if let Some(previous) = previous {
            if previous.file_extension != entry.file_extension {
                self.remove_file(&entry_path(&previous)).await?;
            }
        }

        debug!(station_id, content_id, node_id, path = %path, "Cached media");
        Ok(entry)
    }

    pub async fn is_media_cached(
        &self,
        station_id: StationId,
        content_id: ContentId,
        node_id: NodeId,
    ) -> bool {
        self.find(station_id, content_id, node_id).await.is_some()
    }

    /// Loads the bytes of a cached media file.
    pub async fn get_cached_media_file(
        &self,
        station_id: StationId,
        content_id: ContentId,
        node_id: NodeId,
    ) -> DbResult<Vec<u8>> {
        let entry = self
            .find(station_id, content_id, node_id)
            .await
            .ok_or(DbError::CachedMediaNotFound {
                station_id,
                content_id,
                node_id,
            })?;
        self.storage.load_file(&entry_path(&entry)).await
    }

    /// Snapshot of every station's entries.
    pub async fn get_all_cached_media(&self) -> HashMap<StationId, Vec<PendingCacheEntry>> {
        self.state.read().await.entries.clone()
    }

    /// Snapshot of one station's entries (empty if the station has none).
    pub async fn cached_media_for_station(&self, station_id: StationId) -> Vec<PendingCacheEntry> {
        self.state
            .read()
            .await
            .entries
            .get(&station_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the station has a bookkeeping key.
    pub async fn has_station(&self, station_id: StationId) -> bool {
        self.state.read().await.entries.contains_key(&station_id)
    }

    /// Removes one cached file and its entry.
    pub async fn delete_cached_media(
        &self,
        station_id: StationId,
        content_id: ContentId,
        node_id: NodeId,
    ) -> DbResult<()> {
        let mut state = self.state.write().await;
        let entries = &mut state.entries;

        let list = match entries.get_mut(&station_id) {
            Some(list) if !list.is_empty() => list,
            _ => return Err(DbError::NoCachedMedia { station_id }),
        };
        let pos = list
            .iter()
            .position(|e| e.content_id == content_id && e.node_id == node_id)
            .ok_or(DbError::CachedMediaNotFound {
                station_id,
                content_id,
                node_id,
            })?;

        self.remove_file(&entry_path(&list[pos])).await?;
        list.remove(pos);
        if list.is_empty() {
            entries.remove(&station_id);
        }

        debug!(station_id, content_id, node_id, "Deleted cached media");
        Ok(())
    }

    /// Removes every cached file of a station and its bookkeeping key.
    pub async fn delete_all_cached_media(&self, station_id: StationId) -> DbResult<()> {
        let mut state = self.state.write().await;
        let entries = &mut state.entries;

        let list = entries
            .get(&station_id)
            .ok_or(DbError::NoCachedMedia { station_id })?;
        for entry in list {
            self.remove_file(&entry_path(entry)).await?;
        }
        entries.remove(&station_id);

        info!(station_id, "Deleted all cached media");
        Ok(())
    }

    async fn find(
        &self,
        station_id: StationId,
        content_id: ContentId,
        node_id: NodeId,
    ) -> Option<PendingCacheEntry> {
        self.state
            .read()
            .await
            .entries
            .get(&station_id)?
            .iter()
            .find(|e| e.content_id == content_id && e.node_id == node_id)
            .cloned()
    }

    async fn hydrate_locked(&self, state: &mut CacheState, station_id: StationId) -> DbResult<usize> {
        let names = self.storage.list_files(&station_id.to_string()).await?;

        let mut found = Vec::with_capacity(names.len());
        for name in &names {
            match parse_file_name(station_id, name) {
                Some(entry) => found.push(entry),
                None => warn!(station_id, file = %name, "Skipping unrecognized file in media cache"),
            }
        }

        let count = found.len();
        state.entries.insert(station_id, found);
        state.hydrated.insert(station_id);
        info!(station_id, count, "Hydrated media cache");
        Ok(count)
    }

    /// Deletes a stored file; a file that is already gone is not an error.
    async fn remove_file(&self, path: &str) -> DbResult<()> {
        match self.storage.delete_file(path).await {
            Err(DbError::NotFound { .. }) => {
                warn!(path = %path, "Cached file was already missing");
                Ok(())
            }
            other => other,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
