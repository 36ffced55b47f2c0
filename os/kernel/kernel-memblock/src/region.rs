use crate::flags::RegionFlags;
use crate::node::NodeId;
use crate::{PhysAddr, cap_size};
use core::fmt;

/// One tracked physical address interval `[base, base + size)`.
///
/// A region lives in exactly one slot of a [`RegionArray`](crate::RegionArray)
/// and is copied, never referenced, across merges, splits and array growth.
#[repr(C)]
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Region {
    base: PhysAddr,
    size: u64,
    flags: RegionFlags,
    node: Option<NodeId>,
}

impl Region {
    /// Bytes taken by one region record in a backing array.
    pub const RECORD_SIZE: usize = size_of::<Self>();

    /// The zeroed sentinel occupying slot 0 of an empty array.
    pub const EMPTY: Self = Self {
        base: 0,
        size: 0,
        flags: RegionFlags::NONE,
        node: None,
    };

    /// Create a region. `size` is clipped at the top of the address space,
    /// and `node` is dropped without the `numa` feature.
    #[inline]
    #[must_use]
    pub const fn new(
        base: PhysAddr,
        size: u64,
        flags: RegionFlags,
        node: Option<NodeId>,
    ) -> Self {
        let mut region = Self {
            base,
            size: cap_size(base, size),
            flags,
            node: None,
        };
        region.set_node(node);
        region
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysAddr {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Exclusive end address.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> PhysAddr {
        self.base + self.size
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> RegionFlags {
        self.flags
    }

    /// The node this region belongs to, if one was assigned.
    #[inline]
    #[must_use]
    pub const fn node(&self) -> Option<NodeId> {
        self.node
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    #[must_use]
    pub const fn contains(&self, addr: PhysAddr) -> bool {
        self.base <= addr && addr < self.end()
    }

    /// Returns `true` if `[base, base + size)` shares at least one byte with this region.
    #[inline]
    #[must_use]
    pub const fn overlaps(&self, base: PhysAddr, size: u64) -> bool {
        let size = cap_size(base, size);
        base < self.end() && self.base < base + size
    }

    /// Returns `true` if `next` starts where this region ends and carries the same metadata.
    #[inline]
    #[must_use]
    pub fn merges_with(&self, next: &Self) -> bool {
        self.end() == next.base && self.flags == next.flags && self.node == next.node
    }

    #[inline]
    pub(crate) const fn set_base(&mut self, base: PhysAddr) {
        self.base = base;
    }

    #[inline]
    pub(crate) const fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    #[inline]
    pub(crate) const fn flags_mut(&mut self) -> &mut RegionFlags {
        &mut self.flags
    }

    /// Tag the region with a node. Without NUMA support node ids are not kept.
    #[inline]
    pub(crate) const fn set_node(&mut self, node: Option<NodeId>) {
        #[cfg(feature = "numa")]
        {
            self.node = node;
        }
        #[cfg(not(feature = "numa"))]
        {
            let _ = node;
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Region[{:#x}-{:#x}, {:#x} bytes",
            self.base,
            self.end(),
            self.size
        )?;
        if let Some(node) = self.node {
            write!(f, ", node {node}")?;
        }
        if !self.flags.is_none() {
            write!(f, ", flags {:#x}", self.flags.into_bits())?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::memory::PHYS_ADDR_MAX;

    #[test]
    fn new_clips_at_the_ceiling() {
        let r = Region::new(PHYS_ADDR_MAX - 0x10, 0x100, RegionFlags::NONE, None);
        assert_eq!(r.size(), 0x10);
        assert_eq!(r.end(), PHYS_ADDR_MAX);
    }

    #[cfg(feature = "numa")]
    #[test]
    fn new_keeps_the_node() {
        let r = Region::new(0x1000, 0x1000, RegionFlags::NONE, NodeId::new(3));
        assert_eq!(r.node(), NodeId::new(3));
    }

    #[cfg(not(feature = "numa"))]
    #[test]
    fn new_drops_the_node_without_numa() {
        let r = Region::new(0x1000, 0x1000, RegionFlags::NONE, NodeId::new(3));
        assert_eq!(r.node(), None);
        assert_eq!(r, Region::new(0x1000, 0x1000, RegionFlags::NONE, None));
    }

    #[test]
    fn overlap_excludes_neighbours() {
        let r = Region::new(0x1000, 0x1000, RegionFlags::NONE, None);
        assert!(!r.overlaps(0x0, 0x1000));
        assert!(!r.overlaps(0x2000, 0x1000));
        assert!(r.overlaps(0xfff, 2));
        assert!(r.overlaps(0x1fff, 1));
        assert!(r.overlaps(0x0, 0x4000));
    }

    #[test]
    fn merge_requires_matching_metadata() {
        let a = Region::new(0x1000, 0x1000, RegionFlags::NONE, None);
        let b = Region::new(0x2000, 0x1000, RegionFlags::NONE, None);
        let c = Region::new(0x2000, 0x1000, RegionFlags::new().with_hotplug(true), None);
        let d = Region::new(0x2000, 0x1000, RegionFlags::NONE, NodeId::new(1));
        let gap = Region::new(0x2001, 0x1000, RegionFlags::NONE, None);
        assert!(a.merges_with(&b));
        assert!(!a.merges_with(&c));
        #[cfg(feature = "numa")]
        assert!(!a.merges_with(&d));
        assert!(!a.merges_with(&gap));
    }
}
