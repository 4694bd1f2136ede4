//! # Folder Tree
//!
//! Folders own their subfolders and contents. The parent link is an id,
//! never an owning edge, so the tree stays a plain owned structure.
//!
//! ```text
//! Folder 0 "root" (parent: none)
//! ├── Folder 1 "Lobby" (parent: 0)
//! │   ├── Content 0 "Welcome"   media: {0: image, 1: video}
//! │   └── Folder 3 "Night" (parent: 1)
//! └── Folder 2 "Hall" (parent: 0)
//!     └── Content 1 "Loop"      media: {2: video}
//! ```

use std::collections::BTreeMap;

use crate::types::{ContentId, FolderId, Media, NodeId, TagId};

// =============================================================================
// Content
// =============================================================================

/// A playable item living in exactly one folder.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub id: ContentId,
    pub name: String,
    pub folder_id: FolderId,
    /// Light preset index (0, 1 or 2).
    pub light_intensity: u8,
    pub tag_ids: Vec<TagId>,
    pub media: BTreeMap<NodeId, Media>,
}

impl Content {
    pub fn new(id: ContentId, name: impl Into<String>, folder_id: FolderId) -> Self {
        Content {
            id,
            name: name.into(),
            folder_id,
            light_intensity: 0,
            tag_ids: Vec::new(),
            media: BTreeMap::new(),
        }
    }

    /// Puts `media` into its node's slot and returns what it replaced.
    pub fn set_media(&mut self, media: Media) -> Option<Media> {
        self.media.insert(media.node_id, media)
    }

    pub fn remove_media(&mut self, node_id: NodeId) -> Option<Media> {
        self.media.remove(&node_id)
    }

    /// Adds a tag id unless it is already present.
    pub fn add_tag(&mut self, tag_id: TagId) -> bool {
        if self.tag_ids.contains(&tag_id) {
            return false;
        }
        self.tag_ids.push(tag_id);
        true
    }

    pub fn remove_tag(&mut self, tag_id: TagId) -> bool {
        let before = self.tag_ids.len();
        self.tag_ids.retain(|id| *id != tag_id);
        self.tag_ids.len() != before
    }
}

// =============================================================================
// Folder
// =============================================================================

/// A node of the content tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub parent_id: Option<FolderId>,
    pub subfolders: Vec<Folder>,
    pub contents: Vec<Content>,
}

impl Folder {
    pub fn new(id: FolderId, name: impl Into<String>, parent_id: Option<FolderId>) -> Self {
        Folder {
            id,
            name: name.into(),
            parent_id,
            subfolders: Vec::new(),
            contents: Vec::new(),
        }
    }

    pub fn find_folder(&self, id: FolderId) -> Option<&Folder> {
        if self.id == id {
            return Some(self);
        }
        self.subfolders.iter().find_map(|f| f.find_folder(id))
    }

    pub fn find_folder_mut(&mut self, id: FolderId) -> Option<&mut Folder> {
        if self.id == id {
            return Some(self);
        }
        self.subfolders
            .iter_mut()
            .find_map(|f| f.find_folder_mut(id))
    }

    pub fn find_content(&self, id: ContentId) -> Option<&Content> {
        self.contents
            .iter()
            .find(|c| c.id == id)
            .or_else(|| self.subfolders.iter().find_map(|f| f.find_content(id)))
    }

    pub fn find_content_mut(&mut self, id: ContentId) -> Option<&mut Content> {
        if let Some(pos) = self.contents.iter().position(|c| c.id == id) {
            return self.contents.get_mut(pos);
        }
        self.subfolders
            .iter_mut()
            .find_map(|f| f.find_content_mut(id))
    }

    /// Detaches a descendant folder (not `self`) and returns it.
    pub fn remove_subfolder(&mut self, id: FolderId) -> Option<Folder> {
        if let Some(pos) = self.subfolders.iter().position(|f| f.id == id) {
            return Some(self.subfolders.remove(pos));
        }
        self.subfolders
            .iter_mut()
            .find_map(|f| f.remove_subfolder(id))
    }

    /// Detaches a content from anywhere below this folder.
    pub fn remove_content(&mut self, id: ContentId) -> Option<Content> {
        if let Some(pos) = self.contents.iter().position(|c| c.id == id) {
            return Some(self.contents.remove(pos));
        }
        self.subfolders
            .iter_mut()
            .find_map(|f| f.remove_content(id))
    }

    /// All contents of this folder and its descendants, depth first.
    pub fn all_contents(&self) -> Vec<&Content> {
        let mut out: Vec<&Content> = self.contents.iter().collect();
        for sub in &self.subfolders {
            out.extend(sub.all_contents());
        }
        out
    }

    pub fn for_each_content_mut<F: FnMut(&mut Content)>(&mut self, f: &mut F) {
        for content in &mut self.contents {
            f(content);
        }
        for sub in &mut self.subfolders {
            sub.for_each_content_mut(f);
        }
    }

    /// Ids of this folder and every descendant folder.
    pub fn folder_ids(&self) -> Vec<FolderId> {
        let mut out = vec![self.id];
        for sub in &self.subfolders {
            out.extend(sub.folder_ids());
        }
        out
    }
}
