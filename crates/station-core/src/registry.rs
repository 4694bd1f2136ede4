//! # Node and Tag Registries
//!
//! Ordered id → entity maps owned by a station. Iteration order is the id
//! order, which is the order the sync engine walks nodes in.

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};
use crate::types::{Node, NodeId, NodeRole, Tag, TagId};

// =============================================================================
// Node Registry
// =============================================================================

/// The nodes of a station, with at most one controller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeRegistry {
    nodes: BTreeMap<NodeId, Node>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, rejecting a second controller.
    ///
    /// An existing entry with the same id is replaced.
    pub fn add(&mut self, node: Node) -> CoreResult<()> {
        if node.role == NodeRole::Controller {
            self.ensure_no_other_controller(node.id)?;
        }
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Replaces the node with the same id.
    pub fn update(&mut self, node: Node) -> CoreResult<()> {
        if !self.nodes.contains_key(&node.id) {
            return Err(CoreError::NodeNotFound(node.id));
        }
        self.add(node)
    }

    pub fn remove(&mut self, id: NodeId) -> CoreResult<Node> {
        self.nodes.remove(&id).ok_or(CoreError::NodeNotFound(id))
    }

    pub fn get(&self, id: NodeId) -> CoreResult<&Node> {
        self.nodes.get(&id).ok_or(CoreError::NodeNotFound(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// The controller node, if one is configured.
    pub fn controller(&self) -> Option<&Node> {
        self.nodes.values().find(|n| n.is_controller())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn ensure_no_other_controller(&self, id: NodeId) -> CoreResult<()> {
        match self.controller() {
            Some(existing) if existing.id != id => Err(CoreError::ControllerAlreadyDefined {
                existing: existing.id,
            }),
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Tag Registry
// =============================================================================

/// The tags of a station.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagRegistry {
    tags: BTreeMap<TagId, Tag>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tag: Tag) {
        self.tags.insert(tag.id, tag);
    }

    pub fn get(&self, id: TagId) -> CoreResult<&Tag> {
        self.tags.get(&id).ok_or(CoreError::TagNotFound(id))
    }

    pub fn get_mut(&mut self, id: TagId) -> CoreResult<&mut Tag> {
        self.tags.get_mut(&id).ok_or(CoreError::TagNotFound(id))
    }

    pub fn remove(&mut self, id: TagId) -> CoreResult<Tag> {
        self.tags.remove(&id).ok_or(CoreError::TagNotFound(id))
    }

    pub fn contains(&self, id: TagId) -> bool {
        self.tags.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
