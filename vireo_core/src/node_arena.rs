//! Arena-based storage for scene nodes.
//!
//! A `Vec` of generational slots indexed by [`NodeId`] for O(1) lookups.
//! Slot index 0 is reserved for nil, so NodeId index 1 maps to slot 0.
//! Removing a node bumps its slot generation; any NodeId still held by a
//! route or an SFNode value then fails to resolve instead of aliasing a
//! later occupant of the same slot.

use vireo_ids::NodeId;

use crate::node::Node;

struct Slot {
    generation: u32,
    node: Option<Node>,
}

pub struct NodeArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: u32,
}

impl NodeArena {
    /// Create a new empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Create a new arena with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Insert a node, reusing a freed slot if one exists.
    /// The node's `id` field is set to the assigned ID.
    pub fn insert(&mut self, mut node: Node) -> NodeId {
        let id = match self.free.pop() {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                let id = NodeId::from_parts(idx + 1, slot.generation);
                node.id = id;
                slot.node = Some(node);
                id
            }
            None => {
                let idx = self.slots.len() as u32;
                let id = NodeId::from_parts(idx + 1, 0);
                node.id = id;
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                id
            }
        };
        self.live += 1;
        id
    }

    #[inline]
    fn slot(&self, id: NodeId) -> Option<&Slot> {
        if id.is_nil() {
            return None;
        }
        let slot = self.slots.get((id.index() as usize) - 1)?;
        (slot.generation == id.generation()).then_some(slot)
    }

    /// Get a reference to the node (if the ID is live).
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slot(id)?.node.as_ref()
    }

    /// Get a mutable reference to the node (if the ID is live).
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_nil() {
            return None;
        }
        let slot = self.slots.get_mut((id.index() as usize) - 1)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_mut()
    }

    /// Remove a node, bumping the slot generation so the ID goes stale.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        if id.is_nil() {
            return None;
        }
        let idx = (id.index() as usize) - 1;
        let slot = self.slots.get_mut(idx)?;
        if slot.generation != id.generation() {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(idx as u32);
        self.live -= 1;
        Some(node)
    }

    /// Number of live nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.live as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    #[inline]
    pub fn contains_key(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Iterate over all live nodes.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.node
                .as_ref()
                .map(|node| (NodeId::from_parts(idx as u32 + 1, slot.generation), node))
        })
    }

    /// Iterate mutably over all live nodes.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NodeId, &mut Node)> {
        self.slots.iter_mut().enumerate().filter_map(|(idx, slot)| {
            let generation = slot.generation;
            slot.node
                .as_mut()
                .map(move |node| (NodeId::from_parts(idx as u32 + 1, generation), node))
        })
    }

    /// All live node IDs.
    pub fn keys(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    pub fn values(&self) -> impl Iterator<Item = &Node> {
        self.slots.iter().filter_map(|slot| slot.node.as_ref())
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.slots.iter_mut().filter_map(|slot| slot.node.as_mut())
    }
}

impl Default for NodeArena {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::interface::NodeType;

    fn blank_node() -> Node {
        Node::new(Arc::new(NodeType::new("Blank")))
    }

    #[test]
    fn insert_assigns_live_id() {
        let mut arena = NodeArena::new();
        let id = arena.insert(blank_node());
        assert!(!id.is_nil());
        assert_eq!(arena.get(id).unwrap().id, id);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn removed_ids_go_stale() {
        let mut arena = NodeArena::new();
        let id = arena.insert(blank_node());
        assert!(arena.remove(id).is_some());
        assert!(arena.get(id).is_none());
        assert!(arena.remove(id).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    fn reused_slot_does_not_alias() {
        let mut arena = NodeArena::new();
        let first = arena.insert(blank_node());
        arena.remove(first);
        let second = arena.insert(blank_node());
        // Same slot, new generation.
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(arena.get(first).is_none());
        assert!(arena.get(second).is_some());
    }

    #[test]
    fn nil_never_resolves() {
        let mut arena = NodeArena::new();
        arena.insert(blank_node());
        assert!(arena.get(NodeId::nil()).is_none());
        assert!(arena.get_mut(NodeId::nil()).is_none());
    }

    #[test]
    fn iter_walks_live_nodes_only() {
        let mut arena = NodeArena::new();
        let a = arena.insert(blank_node());
        let b = arena.insert(blank_node());
        let c = arena.insert(blank_node());
        arena.remove(b);
        let keys: Vec<NodeId> = arena.keys().collect();
        assert_eq!(keys, vec![a, c]);
    }
}
