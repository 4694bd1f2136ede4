//! # Station
//!
//! A station is one physical installation: a content tree, the nodes that
//! play it, the tags that classify it, and the counters that hand out ids.
//!
//! ## Ownership
//! ```text
//! Station
//! ├── root_folder: Folder (id 0)
//! │     └── ... Folder / Content / Media (per node)
//! ├── nodes: NodeRegistry   (node id 0 = controller by convention)
//! ├── tags:  TagRegistry    (contents reference tags by id)
//! └── counters: folder / content / node / tag (next id to hand out)
//! ```
//!
//! ## Cascades
//! | Operation       | Cascade                                             |
//! |-----------------|-----------------------------------------------------|
//! | `remove_tag`    | tag id removed from every content                   |
//! | `remove_node`   | the node's media removed from every content         |
//! | `remove_folder` | whole subtree detached and returned to the caller   |
//!
//! Methods that detach media return it so the caller can queue device-side
//! deletes for anything that was already uploaded.

use crate::error::{CoreError, CoreResult};
use crate::folder::{Content, Folder};
use crate::registry::{NodeRegistry, TagRegistry};
use crate::types::{
    ContentId, DeviceMediaId, FolderId, Media, MediaKind, Node, NodeId, NodeRole, StationId, Tag,
    TagId, ROOT_FOLDER_ID,
};
use crate::validation::{
    validate_duration, validate_light_intensity, validate_name, validate_node_ip,
};

/// Name given to the root folder of a new station.
pub const ROOT_FOLDER_NAME: &str = "root";

/// A media installation and its content tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub root_folder: Folder,
    pub tags: TagRegistry,
    pub nodes: NodeRegistry,
    pub folder_id_counter: u32,
    pub content_id_counter: u32,
    pub node_id_counter: u32,
    pub tag_id_counter: u32,
}

impl Station {
    /// Creates an empty station with only the root folder.
    pub fn new(id: StationId, name: impl Into<String>) -> Self {
        Station {
            id,
            name: name.into(),
            root_folder: Folder::new(ROOT_FOLDER_ID, ROOT_FOLDER_NAME, None),
            tags: TagRegistry::new(),
            nodes: NodeRegistry::new(),
            folder_id_counter: ROOT_FOLDER_ID + 1,
            content_id_counter: 0,
            node_id_counter: 0,
            tag_id_counter: 0,
        }
    }

    pub fn rename(&mut self, name: &str) -> CoreResult<()> {
        validate_name("station name", name)?;
        self.name = name.trim().to_string();
        Ok(())
    }

    // =========================================================================
    // Folders
    // =========================================================================

    pub fn folder(&self, id: FolderId) -> CoreResult<&Folder> {
        self.root_folder
            .find_folder(id)
            .ok_or(CoreError::FolderNotFound(id))
    }

    pub fn folder_mut(&mut self, id: FolderId) -> CoreResult<&mut Folder> {
        self.root_folder
            .find_folder_mut(id)
            .ok_or(CoreError::FolderNotFound(id))
    }

    pub fn add_folder(&mut self, parent_id: FolderId, name: &str) -> CoreResult<FolderId> {
        validate_name("folder name", name)?;
        self.folder(parent_id)?;

        let id = next_id(&mut self.folder_id_counter, "folder")?;
        let folder = Folder::new(id, name.trim(), Some(parent_id));
        self.folder_mut(parent_id)?.subfolders.push(folder);
        Ok(id)
    }

    pub fn rename_folder(&mut self, id: FolderId, name: &str) -> CoreResult<()> {
        validate_name("folder name", name)?;
        self.folder_mut(id)?.name = name.trim().to_string();
        Ok(())
    }

    /// Detaches a folder with everything below it.
    pub fn remove_folder(&mut self, id: FolderId) -> CoreResult<Folder> {
        if id == ROOT_FOLDER_ID {
            return Err(CoreError::RootFolderRemoval);
        }
        self.root_folder
            .remove_subfolder(id)
            .ok_or(CoreError::FolderNotFound(id))
    }

    // =========================================================================
    // Contents
    // =========================================================================

    pub fn content(&self, id: ContentId) -> CoreResult<&Content> {
        self.root_folder
            .find_content(id)
            .ok_or(CoreError::ContentNotFound(id))
    }

    pub fn content_mut(&mut self, id: ContentId) -> CoreResult<&mut Content> {
        self.root_folder
            .find_content_mut(id)
            .ok_or(CoreError::ContentNotFound(id))
    }

    pub fn add_content(&mut self, folder_id: FolderId, name: &str) -> CoreResult<ContentId> {
        validate_name("content name", name)?;
        self.folder(folder_id)?;

        let id = next_id(&mut self.content_id_counter, "content")?;
        let content = Content::new(id, name.trim(), folder_id);
        self.folder_mut(folder_id)?.contents.push(content);
        Ok(id)
    }

    pub fn rename_content(&mut self, id: ContentId, name: &str) -> CoreResult<()> {
        validate_name("content name", name)?;
        self.content_mut(id)?.name = name.trim().to_string();
        Ok(())
    }

    /// Moves a content into another folder.
    pub fn move_content(&mut self, id: ContentId, folder_id: FolderId) -> CoreResult<()> {
        self.folder(folder_id)?;
        let mut content = self
            .root_folder
            .remove_content(id)
            .ok_or(CoreError::ContentNotFound(id))?;
        content.folder_id = folder_id;
        self.folder_mut(folder_id)?.contents.push(content);
        Ok(())
    }

    pub fn remove_content(&mut self, id: ContentId) -> CoreResult<Content> {
        self.root_folder
            .remove_content(id)
            .ok_or(CoreError::ContentNotFound(id))
    }

    pub fn set_light_intensity(&mut self, id: ContentId, level: u8) -> CoreResult<()> {
        validate_light_intensity(level)?;
        self.content_mut(id)?.light_intensity = level;
        Ok(())
    }

    // =========================================================================
    // Media
    // =========================================================================

    pub fn media(&self, content_id: ContentId, node_id: NodeId) -> CoreResult<&Media> {
        self.content(content_id)?
            .media
            .get(&node_id)
            .ok_or(CoreError::MediaNotFound {
                content_id,
                node_id,
            })
    }

    /// Assigns media to a (content, node) slot, returning the replaced media.
    pub fn set_media(&mut self, content_id: ContentId, media: Media) -> CoreResult<Option<Media>> {
        self.nodes.get(media.node_id)?;
        validate_name("file name", &media.file_name)?;
        if let MediaKind::Video { duration } = media.kind {
            validate_duration(duration)?;
        }
        Ok(self.content_mut(content_id)?.set_media(media))
    }

    pub fn remove_media(&mut self, content_id: ContentId, node_id: NodeId) -> CoreResult<Media> {
        self.content_mut(content_id)?
            .remove_media(node_id)
            .ok_or(CoreError::MediaNotFound {
                content_id,
                node_id,
            })
    }

    /// Records the id a node assigned to an uploaded media file.
    pub fn set_media_device_id(
        &mut self,
        content_id: ContentId,
        node_id: NodeId,
        id_on_device: DeviceMediaId,
    ) -> CoreResult<()> {
        let media = self
            .content_mut(content_id)?
            .media
            .get_mut(&node_id)
            .ok_or(CoreError::MediaNotFound {
                content_id,
                node_id,
            })?;
        media.id_on_device = id_on_device;
        Ok(())
    }

    /// Every media of the station with its content id.
    pub fn all_media(&self) -> Vec<(ContentId, &Media)> {
        self.root_folder
            .all_contents()
            .into_iter()
            .flat_map(|c| c.media.values().map(move |m| (c.id, m)))
            .collect()
    }

    pub fn media_for_node(&self, node_id: NodeId) -> Vec<(ContentId, &Media)> {
        self.all_media()
            .into_iter()
            .filter(|(_, m)| m.node_id == node_id)
            .collect()
    }

    // =========================================================================
    // Tags
    // =========================================================================

    pub fn add_tag(&mut self, name: &str) -> CoreResult<TagId> {
        validate_name("tag name", name)?;
        let id = next_id(&mut self.tag_id_counter, "tag")?;
        self.tags.add(Tag {
            id,
            name: name.trim().to_string(),
        });
        Ok(id)
    }

    pub fn rename_tag(&mut self, id: TagId, name: &str) -> CoreResult<()> {
        validate_name("tag name", name)?;
        self.tags.get_mut(id)?.name = name.trim().to_string();
        Ok(())
    }

    /// Removes a tag and strips its id from every content.
    pub fn remove_tag(&mut self, id: TagId) -> CoreResult<Tag> {
        let tag = self.tags.remove(id)?;
        self.root_folder.for_each_content_mut(&mut |content| {
            content.remove_tag(id);
        });
        Ok(tag)
    }

    /// Tags a content. Returns `false` if it already carried the tag.
    pub fn tag_content(&mut self, content_id: ContentId, tag_id: TagId) -> CoreResult<bool> {
        self.tags.get(tag_id)?;
        Ok(self.content_mut(content_id)?.add_tag(tag_id))
    }

    pub fn untag_content(&mut self, content_id: ContentId, tag_id: TagId) -> CoreResult<bool> {
        Ok(self.content_mut(content_id)?.remove_tag(tag_id))
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    pub fn node(&self, id: NodeId) -> CoreResult<&Node> {
        self.nodes.get(id)
    }

    pub fn controller(&self) -> Option<&Node> {
        self.nodes.controller()
    }

    pub fn add_node(&mut self, name: &str, ip: &str, role: NodeRole) -> CoreResult<NodeId> {
        validate_name("node name", name)?;
        validate_node_ip(ip)?;

        let id = self.node_id_counter;
        let following = successor(id, "node")?;
        // The counter only advances once the registry accepted the node
        self.nodes.add(Node {
            id,
            name: name.trim().to_string(),
            ip: ip.trim().to_string(),
            role,
        })?;
        self.node_id_counter = following;
        Ok(id)
    }

    pub fn update_node(&mut self, id: NodeId, name: &str, ip: &str, role: NodeRole) -> CoreResult<()> {
        validate_name("node name", name)?;
        validate_node_ip(ip)?;
        self.nodes.update(Node {
            id,
            name: name.trim().to_string(),
            ip: ip.trim().to_string(),
            role,
        })
    }

    /// Removes a node together with every media assigned to it.
    pub fn remove_node(&mut self, id: NodeId) -> CoreResult<(Node, Vec<(ContentId, Media)>)> {
        let node = self.nodes.remove(id)?;
        let mut detached = Vec::new();
        self.root_folder.for_each_content_mut(&mut |content| {
            if let Some(media) = content.remove_media(id) {
                detached.push((content.id, media));
            }
        });
        Ok((node, detached))
    }
}

fn next_id(counter: &mut u32, kind: &'static str) -> CoreResult<u32> {
    let id = *counter;
    *counter = successor(id, kind)?;
    Ok(id)
}

fn successor(id: u32, kind: &'static str) -> CoreResult<u32> {
    id.checked_add(1).ok_or(CoreError::IdsExhausted { kind })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn station_with_nodes() -> Station {
        let mut station = Station::new(1, "Museum");
        station
            .add_node("Controller", "10.0.0.1", NodeRole::Controller)
            .unwrap();
        station
            .add_node("Player", "10.0.0.2", NodeRole::Default)
            .unwrap();
        station
    }

    #[test]
    fn test_new_station_has_root_only() {
        let station = Station::new(3, "Empty");
        assert_eq!(station.root_folder.id, ROOT_FOLDER_ID);
        assert!(station.root_folder.parent_id.is_none());
        assert_eq!(station.folder_id_counter, 1);
        assert!(station.controller().is_none());
    }

    #[test]
    fn test_node_counter_overflow_is_an_error() {
        let mut station = station_with_nodes();
        station.node_id_counter = u32::MAX;

        let err = station
            .add_node("Annex", "10.0.0.3", NodeRole::Default)
            .unwrap_err();
        assert!(matches!(err, CoreError::IdsExhausted { kind: "node" }));
        assert!(station.node(u32::MAX).is_err());
        assert_eq!(station.node_id_counter, u32::MAX);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut station = Station::new(1, "Museum");
        let a = station.add_folder(ROOT_FOLDER_ID, "A").unwrap();
        let b = station.add_folder(a, "B").unwrap();
        station.remove_folder(b).unwrap();
        let c = station.add_folder(a, "C").unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(station.folder(c).unwrap().parent_id, Some(a));
    }

    #[test]
    fn test_lookups_fail_with_typed_errors() {
        let mut station = Station::new(1, "Museum");
        assert!(matches!(station.folder(5), Err(CoreError::FolderNotFound(5))));
        assert!(matches!(station.content(5), Err(CoreError::ContentNotFound(5))));
        assert!(matches!(station.node(5), Err(CoreError::NodeNotFound(5))));
        assert!(matches!(
            station.remove_folder(ROOT_FOLDER_ID),
            Err(CoreError::RootFolderRemoval)
        ));
        assert!(matches!(
            station.add_content(9, "x"),
            Err(CoreError::FolderNotFound(9))
        ));
    }

    #[test]
    fn test_first_node_gets_controller_id() {
        let station = station_with_nodes();
        assert_eq!(station.controller().unwrap().id, 0);
        assert_eq!(station.node(1).unwrap().name, "Player");
    }

    #[test]
    fn test_rejected_controller_does_not_consume_id() {
        let mut station = station_with_nodes();
        assert!(station
            .add_node("Second", "10.0.0.3", NodeRole::Controller)
            .is_err());
        let id = station
            .add_node("Third", "10.0.0.3", NodeRole::Default)
            .unwrap();
        assert_eq!(id, 2);
    }

    #[test]
    fn test_set_media_replaces_slot() {
        let mut station = station_with_nodes();
        let content = station.add_content(ROOT_FOLDER_ID, "Intro").unwrap();

        assert!(station
            .set_media(content, Media::image(1, "a.png"))
            .unwrap()
            .is_none());
        station.set_media_device_id(content, 1, 42).unwrap();

        let replaced = station
            .set_media(content, Media::video(1, "b.mp4", 10.0))
            .unwrap()
            .unwrap();
        assert_eq!(replaced.id_on_device, 42);
        assert!(!station.media(content, 1).unwrap().is_uploaded());
    }

    #[test]
    fn test_set_media_requires_known_node() {
        let mut station = station_with_nodes();
        let content = station.add_content(ROOT_FOLDER_ID, "Intro").unwrap();
        assert!(matches!(
            station.set_media(content, Media::image(7, "a.png")),
            Err(CoreError::NodeNotFound(7))
        ));
    }

    #[test]
    fn test_remove_tag_cascades() {
        let mut station = station_with_nodes();
        let folder = station.add_folder(ROOT_FOLDER_ID, "Hall").unwrap();
        let a = station.add_content(ROOT_FOLDER_ID, "A").unwrap();
        let b = station.add_content(folder, "B").unwrap();
        let tag = station.add_tag("evening").unwrap();
        let other = station.add_tag("morning").unwrap();

        station.tag_content(a, tag).unwrap();
        station.tag_content(b, tag).unwrap();
        station.tag_content(b, other).unwrap();
        assert!(!station.tag_content(b, other).unwrap());

        station.remove_tag(tag).unwrap();
        assert!(station.content(a).unwrap().tag_ids.is_empty());
        assert_eq!(station.content(b).unwrap().tag_ids, vec![other]);
        assert!(matches!(
            station.tag_content(a, tag),
            Err(CoreError::TagNotFound(_))
        ));
    }

    #[test]
    fn test_remove_node_detaches_media() {
        let mut station = station_with_nodes();
        let a = station.add_content(ROOT_FOLDER_ID, "A").unwrap();
        let b = station.add_content(ROOT_FOLDER_ID, "B").unwrap();
        station.set_media(a, Media::image(1, "a.png")).unwrap();
        station.set_media(b, Media::image(1, "b.png")).unwrap();
        station.set_media(b, Media::image(0, "c.png")).unwrap();

        let (node, detached) = station.remove_node(1).unwrap();
        assert_eq!(node.id, 1);
        assert_eq!(detached.len(), 2);
        assert!(station.media_for_node(1).is_empty());
        assert_eq!(station.media_for_node(0).len(), 1);
    }

    #[test]
    fn test_move_content() {
        let mut station = station_with_nodes();
        let folder = station.add_folder(ROOT_FOLDER_ID, "Hall").unwrap();
        let content = station.add_content(ROOT_FOLDER_ID, "A").unwrap();

        station.move_content(content, folder).unwrap();
        assert_eq!(station.content(content).unwrap().folder_id, folder);
        assert!(station.root_folder.contents.is_empty());
        assert!(station.move_content(content, 99).is_err());
        // A failed move leaves the content where it was
        assert_eq!(station.content(content).unwrap().folder_id, folder);
    }

    #[test]
    fn test_light_intensity_validated() {
        let mut station = station_with_nodes();
        let content = station.add_content(ROOT_FOLDER_ID, "A").unwrap();
        station.set_light_intensity(content, 2).unwrap();
        assert!(station.set_light_intensity(content, 3).is_err());
        assert_eq!(station.content(content).unwrap().light_intensity, 2);
    }
}
