//! Generational node identifiers for the scene arena.
//!
//! A `NodeId` packs an arena slot index (low 32 bits) and a generation
//! (high 32 bits) into a `u64`. Index 0 is reserved for nil. When an arena
//! slot is reused its generation is bumped, so IDs held by stale routes or
//! SFNode values stop resolving instead of aliasing a new node. This is what
//! lets cyclic scenes (a node routed back to an ancestor) tear down cleanly:
//! nothing owns a node except the arena.

use std::fmt;

/// Identifier of a node in a [`NodeArena`]-style slot store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// The nil ID. Never resolves; `SFNode` uses it for VRML `NULL`.
    #[inline]
    pub const fn nil() -> Self {
        Self(0)
    }

    #[inline]
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self((index as u64) | ((generation as u64) << 32))
    }

    /// Arena slot index. 0 means nil.
    #[inline]
    pub const fn index(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub const fn is_nil(self) -> bool {
        self.index() == 0
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}:{})", self.index(), self.generation())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index(), self.generation())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_is_default_and_index_zero() {
        assert_eq!(NodeId::default(), NodeId::nil());
        assert!(NodeId::nil().is_nil());
        assert_eq!(NodeId::nil().index(), 0);
    }

    #[test]
    fn parts_round_trip() {
        let id = NodeId::from_parts(7, 3);
        assert_eq!(id.index(), 7);
        assert_eq!(id.generation(), 3);
        assert_eq!(NodeId::from_u64(id.as_u64()), id);
    }

    #[test]
    fn generation_distinguishes_reused_slots() {
        assert_ne!(NodeId::from_parts(7, 0), NodeId::from_parts(7, 1));
    }
}
