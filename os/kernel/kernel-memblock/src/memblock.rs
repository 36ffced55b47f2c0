use crate::array::{RegionArray, range_end};
use crate::error::MemblockError;
use crate::flags::RegionFlags;
use crate::mapper::PhysMapper;
use crate::node::NodeId;
use crate::region::Region;
use crate::{PhysAddr, cap_size};
use core::ops::Range;
use kernel_info::memory::{MEMBLOCK_ALLOC_ANYWHERE, SMP_CACHE_BYTES};
use log::{debug, warn};

/// Selects one of the two region arrays.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RegionKind {
    /// Available physical memory.
    Memory,
    /// Claimed or otherwise unusable physical memory.
    Reserved,
}

/// The early physical memory tracker.
///
/// Owns the `memory` and `reserved` arrays and the allocation policy. It is
/// created once during boot and passed around by exclusive reference; nothing
/// else holds on to its arrays across a call, since any mutation may move them.
pub struct Memblock<'a, M: PhysMapper> {
    memory: RegionArray<'a>,
    reserved: RegionArray<'a>,
    bottom_up: bool,
    current_limit: PhysAddr,
    can_resize: bool,
    mapper: M,
}

impl<'a, M: PhysMapper> Memblock<'a, M> {
    /// Create an empty tracker on top of the boot-provided slot arrays.
    ///
    /// Searches run top-down without a limit; growing the arrays stays
    /// disabled until [`allow_resize`](Self::allow_resize) is called.
    ///
    /// # Panics
    /// If either slot array is empty.
    pub fn new(memory: &'a mut [Region], reserved: &'a mut [Region], mapper: M) -> Self {
        Self {
            memory: RegionArray::new("memory", memory),
            reserved: RegionArray::new("reserved", reserved),
            bottom_up: false,
            current_limit: MEMBLOCK_ALLOC_ANYWHERE,
            can_resize: false,
            mapper,
        }
    }

    /// Available memory.
    #[inline]
    #[must_use]
    pub const fn memory(&self) -> &RegionArray<'a> {
        &self.memory
    }

    /// Reserved memory.
    #[inline]
    #[must_use]
    pub const fn reserved(&self) -> &RegionArray<'a> {
        &self.reserved
    }

    #[inline]
    #[must_use]
    pub const fn array(&self, kind: RegionKind) -> &RegionArray<'a> {
        match kind {
            RegionKind::Memory => &self.memory,
            RegionKind::Reserved => &self.reserved,
        }
    }

    #[inline]
    pub(crate) const fn array_mut(&mut self, kind: RegionKind) -> &mut RegionArray<'a> {
        match kind {
            RegionKind::Memory => &mut self.memory,
            RegionKind::Reserved => &mut self.reserved,
        }
    }

    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Allow full arrays to grow into tracked memory.
    ///
    /// Call once enough memory has been added for the replacement arrays to
    /// be found.
    pub const fn allow_resize(&mut self) {
        self.can_resize = true;
    }

    #[inline]
    #[must_use]
    pub const fn can_resize(&self) -> bool {
        self.can_resize
    }

    /// Search free memory from low addresses up (`true`) or from the top down (`false`).
    pub const fn set_bottom_up(&mut self, enable: bool) {
        self.bottom_up = enable;
    }

    #[inline]
    #[must_use]
    pub const fn bottom_up(&self) -> bool {
        self.bottom_up
    }

    /// Upper bound for every free-range search.
    pub const fn set_current_limit(&mut self, limit: PhysAddr) {
        self.current_limit = limit;
    }

    #[inline]
    #[must_use]
    pub const fn current_limit(&self) -> PhysAddr {
        self.current_limit
    }

    /// Add `[base, base + size)` to available memory.
    ///
    /// # Errors
    /// If the memory array is full and cannot grow.
    pub fn add(&mut self, base: PhysAddr, size: u64) -> Result<(), MemblockError> {
        debug!("memblock_add: [{:#x}-{:#x}]", base, range_end(base, size));
        self.add_range(RegionKind::Memory, base, size, None, RegionFlags::NONE)
    }

    /// Add `[base, base + size)` to available memory, on `node` and with `flags`.
    ///
    /// # Errors
    /// If the memory array is full and cannot grow.
    pub fn add_node(
        &mut self,
        base: PhysAddr,
        size: u64,
        node: NodeId,
        flags: RegionFlags,
    ) -> Result<(), MemblockError> {
        debug!(
            "memblock_add_node: [{:#x}-{:#x}] nid={} flags={:#x}",
            base,
            range_end(base, size),
            node,
            flags.into_bits()
        );
        self.add_range(RegionKind::Memory, base, size, Some(node), flags)
    }

    /// Remove `[base, base + size)` from available memory.
    ///
    /// # Errors
    /// If a region has to be split and the memory array cannot grow.
    pub fn remove(&mut self, base: PhysAddr, size: u64) -> Result<(), MemblockError> {
        debug!("memblock_remove: [{:#x}-{:#x}]", base, range_end(base, size));
        self.remove_range(RegionKind::Memory, base, size)
    }

    /// Mark `[base, base + size)` as reserved.
    ///
    /// A plain reservation does not merge into an adjacent entry that carries
    /// a node or the `reserved_noinit` flag.
    ///
    /// # Errors
    /// If the reserved array is full and cannot grow.
    pub fn reserve(&mut self, base: PhysAddr, size: u64) -> Result<(), MemblockError> {
        debug!("memblock_reserve: [{:#x}-{:#x}]", base, range_end(base, size));
        self.add_range(RegionKind::Reserved, base, size, None, RegionFlags::NONE)
    }

    /// Release a reservation of `[base, base + size)`.
    ///
    /// # Errors
    /// If a region has to be split and the reserved array cannot grow.
    pub fn free(&mut self, base: PhysAddr, size: u64) -> Result<(), MemblockError> {
        debug!("memblock_free: [{:#x}-{:#x}]", base, range_end(base, size));
        self.remove_range(RegionKind::Reserved, base, size)
    }

    /// Returns `true` if `[base, base + size)` intersects any region of `kind`.
    #[must_use]
    pub fn overlaps_region(&self, kind: RegionKind, base: PhysAddr, size: u64) -> bool {
        self.array(kind).overlaps(base, size)
    }

    /// Shrink every memory region to `align` boundaries, dropping the ones
    /// smaller than one aligned unit.
    ///
    /// # Panics
    /// If `align` is not a power of two.
    pub fn trim_memory(&mut self, align: u64) {
        assert!(align.is_power_of_two(), "trim alignment {align:#x} is not a power of two");
        self.memory.trim(align);
    }

    /// Assign `[base, base + size)` of the `kind` array to `node`, splitting
    /// regions that straddle the range.
    ///
    /// # Errors
    /// If a region has to be split and the array cannot grow.
    pub fn set_node(
        &mut self,
        base: PhysAddr,
        size: u64,
        kind: RegionKind,
        node: NodeId,
    ) -> Result<(), MemblockError> {
        let range = self.isolate_range(kind, base, size)?;
        self.array_mut(kind).update(range, |r| r.set_node(Some(node)));
        Ok(())
    }

    /// Give every reserved region the node of the memory it lies in.
    ///
    /// Tagging may split reserved regions and thereby grow the reserved
    /// array, which relocates entries already visited. The pass is restarted
    /// from scratch whenever the array's generation changes under it.
    ///
    /// # Errors
    /// If the reserved array has to grow and cannot.
    pub fn set_reserved_nodes_from_memory(&mut self) -> Result<(), MemblockError> {
        'pass: loop {
            let generation = self.reserved.generation();
            let mut idx = 0;
            while let Some(region) = self.memory.regions().get(idx).copied() {
                if let Some(node) = region.node() {
                    self.set_node(region.base(), region.size(), RegionKind::Reserved, node)?;
                    if self.reserved.generation() != generation {
                        debug!("memblock: reserved array moved while assigning nodes, restarting");
                        continue 'pass;
                    }
                }
                idx += 1;
            }
            return Ok(());
        }
    }

    /// Mark memory in `[base, base + size)` as hotpluggable.
    ///
    /// # Errors
    /// If a region has to be split and the memory array cannot grow.
    pub fn mark_hotplug(&mut self, base: PhysAddr, size: u64) -> Result<(), MemblockError> {
        self.update_flags(RegionKind::Memory, base, size, |f| f.set_hotplug(true))
    }

    /// Clear the hotplug flag of memory in `[base, base + size)`.
    ///
    /// # Errors
    /// If a region has to be split and the memory array cannot grow.
    pub fn clear_hotplug(&mut self, base: PhysAddr, size: u64) -> Result<(), MemblockError> {
        self.update_flags(RegionKind::Memory, base, size, |f| f.set_hotplug(false))
    }

    /// Mark memory in `[base, base + size)` as mirrored.
    ///
    /// # Errors
    /// If a region has to be split and the memory array cannot grow.
    pub fn mark_mirror(&mut self, base: PhysAddr, size: u64) -> Result<(), MemblockError> {
        self.update_flags(RegionKind::Memory, base, size, |f| f.set_mirror(true))
    }

    /// Keep memory in `[base, base + size)` out of the direct map and out of
    /// every free-range search.
    ///
    /// # Errors
    /// If a region has to be split and the memory array cannot grow.
    pub fn mark_nomap(&mut self, base: PhysAddr, size: u64) -> Result<(), MemblockError> {
        self.update_flags(RegionKind::Memory, base, size, |f| f.set_nomap(true))
    }

    /// Undo [`mark_nomap`](Self::mark_nomap).
    ///
    /// # Errors
    /// If a region has to be split and the memory array cannot grow.
    pub fn clear_nomap(&mut self, base: PhysAddr, size: u64) -> Result<(), MemblockError> {
        self.update_flags(RegionKind::Memory, base, size, |f| f.set_nomap(false))
    }

    /// Mark reservations in `[base, base + size)` as not to be initialized.
    ///
    /// # Errors
    /// If a region has to be split and the reserved array cannot grow.
    pub fn reserved_mark_noinit(&mut self, base: PhysAddr, size: u64) -> Result<(), MemblockError> {
        self.update_flags(RegionKind::Reserved, base, size, |f| f.set_reserved_noinit(true))
    }

    /// Find and reserve `size` bytes aligned to `align` within `[start, end)`.
    ///
    /// An `align` of zero falls back to the cache line size.
    ///
    /// # Errors
    /// [`MemblockError::NoSpace`] if no free range fits, or the errors of
    /// [`reserve`](Self::reserve).
    pub fn phys_alloc_range(
        &mut self,
        size: u64,
        align: u64,
        start: PhysAddr,
        end: PhysAddr,
    ) -> Result<PhysAddr, MemblockError> {
        let align = if align == 0 {
            warn!("memblock: zero alignment requested, using {SMP_CACHE_BYTES:#x}");
            SMP_CACHE_BYTES
        } else {
            align
        };

        let found = self
            .find_in_range(start, end, size, align)
            .ok_or(MemblockError::NoSpace { size, align })?;
        self.reserve(found, size)?;
        debug!("memblock_phys_alloc: {size:#x} bytes at {found:#x}");
        Ok(found)
    }

    /// Find and reserve `size` bytes aligned to `align` below the current limit.
    ///
    /// # Errors
    /// See [`phys_alloc_range`](Self::phys_alloc_range).
    pub fn phys_alloc(&mut self, size: u64, align: u64) -> Result<PhysAddr, MemblockError> {
        self.phys_alloc_range(size, align, 0, self.current_limit)
    }

    /// Total size of available memory.
    #[inline]
    #[must_use]
    pub const fn phys_mem_size(&self) -> u64 {
        self.memory.total_size()
    }

    /// Total size of reserved memory.
    #[inline]
    #[must_use]
    pub const fn reserved_size(&self) -> u64 {
        self.reserved.total_size()
    }

    /// Lowest available address, or 0 without memory.
    #[must_use]
    pub fn start_of_dram(&self) -> PhysAddr {
        self.memory.first().map_or(0, Region::base)
    }

    /// End of the highest memory region, or 0 without memory.
    #[must_use]
    pub fn end_of_dram(&self) -> PhysAddr {
        self.memory.last().map_or(0, Region::end)
    }

    /// Returns `true` if `addr` lies in available memory.
    #[must_use]
    pub fn is_memory(&self, addr: PhysAddr) -> bool {
        self.memory.search(addr).is_some()
    }

    /// Returns `true` if `[base, base + size)` lies entirely within one memory region.
    #[must_use]
    pub fn is_region_memory(&self, base: PhysAddr, size: u64) -> bool {
        let end = base + cap_size(base, size);
        self.memory
            .search(base)
            .is_some_and(|idx| self.memory.regions()[idx].end() >= end)
    }

    /// Returns `true` if `[base, base + size)` intersects any reservation.
    #[must_use]
    pub fn is_region_reserved(&self, base: PhysAddr, size: u64) -> bool {
        self.reserved.overlaps(base, size)
    }

    /// Log both arrays at debug level.
    pub fn dump_all(&self) {
        debug!("MEMBLOCK configuration:");
        debug!(
            " memory size = {:#x} reserved size = {:#x}",
            self.phys_mem_size(),
            self.reserved_size()
        );
        dump(&self.memory);
        dump(&self.reserved);
    }

    /// Insert `[base, base + size)` into the `kind` array, growing it first if needed.
    pub(crate) fn add_range(
        &mut self,
        kind: RegionKind,
        base: PhysAddr,
        size: u64,
        node: Option<NodeId>,
        flags: RegionFlags,
    ) -> Result<(), MemblockError> {
        let size = cap_size(base, size);
        if size == 0 {
            return Ok(());
        }
        let end = base + size;

        loop {
            let array = self.array(kind);
            let needed = array.uncovered_gaps(base, end);
            if needed == 0 {
                return Ok(());
            }
            if array.len() + needed <= array.capacity() {
                break;
            }
            self.double_array(kind, base, size)?;
        }

        self.array_mut(kind).insert_range(base, end, flags, node);
        Ok(())
    }

    fn remove_range(&mut self, kind: RegionKind, base: PhysAddr, size: u64) -> Result<(), MemblockError> {
        let size = cap_size(base, size);
        if size == 0 {
            return Ok(());
        }
        let end = base + size;

        loop {
            let array = self.array(kind);
            if array.len() + array.remainders_needed(base, end) <= array.capacity() {
                break;
            }
            self.double_array(kind, base, size)?;
        }

        self.array_mut(kind).carve(base, end);
        Ok(())
    }

    /// Split the `kind` array at the boundaries of `[base, base + size)` and
    /// return the indices of the regions inside it.
    ///
    /// Any growth happens before the first split, so the returned indices
    /// are valid for the array as it is afterwards.
    fn isolate_range(
        &mut self,
        kind: RegionKind,
        base: PhysAddr,
        size: u64,
    ) -> Result<Range<usize>, MemblockError> {
        let size = cap_size(base, size);
        if size == 0 {
            return Ok(0..0);
        }
        let end = base + size;

        loop {
            let array = self.array(kind);
            if array.len() + array.splits_needed(base, end) <= array.capacity() {
                break;
            }
            self.double_array(kind, base, size)?;
        }

        Ok(self.array_mut(kind).isolate(base, end))
    }

    fn update_flags(
        &mut self,
        kind: RegionKind,
        base: PhysAddr,
        size: u64,
        f: impl Fn(&mut RegionFlags),
    ) -> Result<(), MemblockError> {
        let range = self.isolate_range(kind, base, size)?;
        self.array_mut(kind).update(range, |r| f(r.flags_mut()));
        Ok(())
    }

    #[inline]
    pub(crate) const fn mapper_and_array(&mut self, kind: RegionKind) -> (&M, &mut RegionArray<'a>) {
        match kind {
            RegionKind::Memory => (&self.mapper, &mut self.memory),
            RegionKind::Reserved => (&self.mapper, &mut self.reserved),
        }
    }
}

fn dump(array: &RegionArray<'_>) {
    debug!(" {}.cnt  = {:#x}", array.name(), array.len());
    for (idx, r) in array.iter().enumerate() {
        let node = r.node().map_or(-1, |n| i32::from(n.as_u16()));
        debug!(
            " {}[{idx:#x}]\t[{:#018x}-{:#018x}], {:#x} bytes on node {node} flags: {:#x}",
            array.name(),
            r.base(),
            r.end() - 1,
            r.size(),
            r.flags().into_bits()
        );
    }
}
