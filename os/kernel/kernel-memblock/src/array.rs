//! # Region Arrays
//!
//! A [`RegionArray`] is a sorted, non-overlapping list of [`Region`]s stored
//! in a caller-provided slice. All structural changes are index based:
//! entries are shifted with `copy_within`, never referenced across a change.
//!
//! ## Invariants
//! - Entries `0..len()` are sorted by base and do not overlap.
//! - No two neighbours are contiguous and carry the same flags and node.
//! - [`total_size`](RegionArray::total_size) is the sum of all entry sizes.
//! - `len() <= capacity()`; slots past `len()` hold [`Region::EMPTY`].
//!
//! The array never grows by itself. Callers ask how many slots an operation
//! needs ([`uncovered_gaps`](RegionArray::uncovered_gaps),
//! [`splits_needed`](RegionArray::splits_needed)), make room, and only then
//! mutate, so a failed growth leaves the array untouched.

use crate::flags::RegionFlags;
use crate::node::NodeId;
use crate::region::Region;
use crate::{PhysAddr, cap_size};
use core::mem::MaybeUninit;
use core::ops::Range;
use kernel_info::memory::{align_down, align_up};
use log::warn;

/// Physical span currently backing a grown [`RegionArray`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ArrayStorage {
    pub base: PhysAddr,
    pub size: u64,
}

/// A named, ordered collection of regions.
pub struct RegionArray<'a> {
    name: &'static str,
    slots: &'a mut [Region],
    count: usize,
    total_size: u64,
    generation: u64,
    /// `None` while the boot-provided slots are in use.
    storage: Option<ArrayStorage>,
}

impl<'a> RegionArray<'a> {
    /// Wrap `slots` as an empty array. Existing slot contents are discarded.
    ///
    /// # Panics
    /// If `slots` is empty; an array needs at least one slot for its sentinel.
    pub fn new(name: &'static str, slots: &'a mut [Region]) -> Self {
        assert!(!slots.is_empty(), "{name}: region array needs at least one slot");
        slots.fill(Region::EMPTY);
        Self {
            name,
            slots,
            count: 0,
            total_size: 0,
            generation: 0,
            storage: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Number of live entries.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots in the current backing storage.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Sum of the sizes of all entries.
    #[inline]
    #[must_use]
    pub const fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Bumped every time the backing storage is replaced.
    ///
    /// A pass that walks the entries while mutating the array restarts when
    /// this value changes under it.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// The physical span backing this array, if it was obtained by growth.
    #[inline]
    #[must_use]
    pub const fn storage(&self) -> Option<ArrayStorage> {
        self.storage
    }

    /// The live entries, in ascending address order.
    #[inline]
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.slots[..self.count]
    }

    /// Raw access to any slot below [`capacity`](Self::capacity), live or not.
    ///
    /// Slot 0 of an empty array is the zeroed sentinel.
    #[inline]
    #[must_use]
    pub fn slot(&self, idx: usize) -> Option<&Region> {
        self.slots.get(idx)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Region> {
        self.regions().iter()
    }

    /// First entry, if any.
    #[inline]
    #[must_use]
    pub fn first(&self) -> Option<&Region> {
        self.regions().first()
    }

    /// Last entry, if any.
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&Region> {
        self.regions().last()
    }

    /// Returns `true` if `[base, base + size)` intersects any entry.
    #[must_use]
    pub fn overlaps(&self, base: PhysAddr, size: u64) -> bool {
        self.iter().any(|r| r.overlaps(base, size))
    }

    /// Index of the entry containing `addr`.
    #[must_use]
    pub fn search(&self, addr: PhysAddr) -> Option<usize> {
        let regions = self.regions();
        let idx = regions.partition_point(|r| r.end() <= addr);
        regions
            .get(idx)
            .filter(|r| r.contains(addr))
            .map(|_| idx)
    }

    /// Number of new entries needed to cover the parts of `[base, end)`
    /// not yet covered by any entry.
    pub(crate) fn uncovered_gaps(&self, base: PhysAddr, end: PhysAddr) -> usize {
        let mut base = base;
        let mut gaps = 0;
        for r in self.regions() {
            if r.base() >= end {
                break;
            }
            if r.end() <= base {
                continue;
            }
            if r.base() > base {
                gaps += 1;
            }
            base = r.end().min(end);
        }
        if base < end {
            gaps += 1;
        }
        gaps
    }

    /// Number of entries isolating `[base, end)` has to split off.
    pub(crate) fn splits_needed(&self, base: PhysAddr, end: PhysAddr) -> usize {
        let mut splits = 0;
        for r in self.regions() {
            if r.base() >= end {
                break;
            }
            if r.end() <= base {
                continue;
            }
            splits += usize::from(r.base() < base) + usize::from(r.end() > end);
        }
        splits
    }

    /// Number of entries removing `[base, end)` adds: one if a single entry
    /// strictly contains the range, none otherwise.
    pub(crate) fn remainders_needed(&self, base: PhysAddr, end: PhysAddr) -> usize {
        usize::from(self.iter().any(|r| r.base() < base && r.end() > end))
    }

    /// Cover `[base, end)`, then merge the touched neighbourhood.
    ///
    /// The caller must have made room for
    /// [`uncovered_gaps`](Self::uncovered_gaps) more entries.
    pub(crate) fn insert_range(
        &mut self,
        base: PhysAddr,
        end: PhysAddr,
        flags: RegionFlags,
        node: Option<NodeId>,
    ) {
        debug_assert!(base < end);
        if self.count == 0 {
            debug_assert_eq!(self.total_size, 0);
            self.insert_region(0, base, end - base, flags, node);
            return;
        }

        let mut base = base;
        let mut idx = 0;
        let mut start_rgn = None;
        let mut end_rgn = 0;
        while idx < self.count {
            let r = self.slots[idx];
            if r.base() >= end {
                break;
            }
            if r.end() <= base {
                idx += 1;
                continue;
            }
            if r.flags() != flags || r.node() != node {
                warn!(
                    "{}: [{:#x}-{:#x}] overlaps {r:?} with different attributes",
                    self.name, base, end
                );
            }
            if r.base() > base {
                start_rgn.get_or_insert(idx);
                self.insert_region(idx, base, r.base() - base, flags, node);
                idx += 1;
                end_rgn = idx;
            }
            base = r.end().min(end);
            idx += 1;
        }

        if base < end {
            start_rgn.get_or_insert(idx);
            self.insert_region(idx, base, end - base, flags, node);
            end_rgn = idx + 1;
        }

        if let Some(start_rgn) = start_rgn {
            self.merge_regions(start_rgn, end_rgn);
        }
    }

    /// Split entries at `base` and `end` so that `[base, end)` is covered by
    /// whole entries only, and return their index range.
    ///
    /// The caller must have made room for
    /// [`splits_needed`](Self::splits_needed) more entries.
    pub(crate) fn isolate(&mut self, base: PhysAddr, end: PhysAddr) -> Range<usize> {
        let mut start_rgn = 0;
        let mut end_rgn = 0;
        let mut idx = 0;
        while idx < self.count {
            let r = self.slots[idx];
            if r.base() >= end {
                break;
            }
            if r.end() <= base {
                idx += 1;
                continue;
            }

            if r.base() < base {
                // Intersects from below: split off the low part and continue
                // with the new top half.
                let low = base - r.base();
                self.shrink_front(idx, low);
                self.insert_region(idx, r.base(), low, r.flags(), r.node());
                idx += 1;
            } else if r.end() > end {
                // Intersects from above: split off the part inside the range
                // and look at it again.
                let low = end - r.base();
                self.shrink_front(idx, low);
                self.insert_region(idx, r.base(), low, r.flags(), r.node());
            } else {
                if end_rgn == 0 {
                    start_rgn = idx;
                }
                end_rgn = idx + 1;
                idx += 1;
            }
        }
        start_rgn..end_rgn
    }

    /// Drop `[base, end)` from every entry it touches.
    ///
    /// Entries straddling a boundary are shrunk in place. An entry strictly
    /// containing the range keeps its low part and gets its high part
    /// inserted after it, so the caller must have made room for
    /// [`remainders_needed`](Self::remainders_needed) more entries.
    pub(crate) fn carve(&mut self, base: PhysAddr, end: PhysAddr) {
        let mut idx = 0;
        while idx < self.count {
            let r = self.slots[idx];
            if r.base() >= end {
                break;
            }
            if r.end() <= base {
                idx += 1;
                continue;
            }
            match (r.base() < base, r.end() > end) {
                (true, true) => {
                    self.shrink_back(idx, r.end() - base);
                    self.insert_region(idx + 1, end, r.end() - end, r.flags(), r.node());
                    break;
                }
                (true, false) => {
                    self.shrink_back(idx, r.end() - base);
                    idx += 1;
                }
                (false, true) => {
                    self.shrink_front(idx, end - r.base());
                    break;
                }
                (false, false) => self.remove_region(idx),
            }
        }
    }

    /// Apply `f` to the entries in `range`, then merge neighbours that became compatible.
    pub(crate) fn update(&mut self, range: Range<usize>, mut f: impl FnMut(&mut Region)) {
        if range.is_empty() {
            return;
        }
        for r in &mut self.slots[range.clone()] {
            f(r);
        }
        self.merge_regions(range.start, range.end);
    }

    /// Remove the entry at `idx`, keeping the zeroed sentinel when the array empties.
    pub(crate) fn remove_region(&mut self, idx: usize) {
        debug_assert!(idx < self.count);
        self.total_size -= self.slots[idx].size();
        self.slots.copy_within(idx + 1..self.count, idx);
        self.count -= 1;
        self.slots[self.count] = Region::EMPTY;
        if self.count == 0 {
            debug_assert_eq!(self.total_size, 0);
        }
    }

    /// Shrink every entry to `[align_up(base), align_down(end))`, dropping
    /// the ones that vanish.
    pub(crate) fn trim(&mut self, align: u64) {
        let mut idx = 0;
        while idx < self.count {
            let r = self.slots[idx];
            let end = align_down(r.end(), align);
            match align_up(r.base(), align) {
                Some(start) if start == r.base() && end == r.end() => idx += 1,
                Some(start) if start < end => {
                    self.total_size -= r.size() - (end - start);
                    let slot = &mut self.slots[idx];
                    slot.set_base(start);
                    slot.set_size(end - start);
                    idx += 1;
                }
                _ => self.remove_region(idx),
            }
        }
    }

    /// Move the entries into `slots`, which become the new backing storage.
    ///
    /// Returns the storage that was replaced, if it had been obtained by an
    /// earlier growth.
    pub(crate) fn replace_storage(
        &mut self,
        slots: &'a mut [MaybeUninit<Region>],
        storage: ArrayStorage,
    ) -> Option<ArrayStorage> {
        debug_assert!(slots.len() >= self.slots.len());
        for (idx, slot) in slots.iter_mut().enumerate() {
            slot.write(self.slots.get(idx).copied().unwrap_or(Region::EMPTY));
        }
        let len = slots.len();
        // SAFETY: every element of `slots` was initialized above.
        let slots = unsafe { core::slice::from_raw_parts_mut(slots.as_mut_ptr().cast::<Region>(), len) };
        self.slots = slots;
        self.generation += 1;
        self.storage.replace(storage)
    }

    fn insert_region(
        &mut self,
        idx: usize,
        base: PhysAddr,
        size: u64,
        flags: RegionFlags,
        node: Option<NodeId>,
    ) {
        debug_assert!(self.count < self.slots.len(), "{}: no free slot", self.name);
        self.slots.copy_within(idx..self.count, idx + 1);
        self.slots[idx] = Region::new(base, size, flags, node);
        self.count += 1;
        self.total_size += size;
    }

    /// Move the base of entry `idx` up by `by` bytes.
    fn shrink_front(&mut self, idx: usize, by: u64) {
        let slot = &mut self.slots[idx];
        slot.set_base(slot.base() + by);
        slot.set_size(slot.size() - by);
        self.total_size -= by;
    }

    /// Move the end of entry `idx` down by `by` bytes.
    fn shrink_back(&mut self, idx: usize, by: u64) {
        let slot = &mut self.slots[idx];
        slot.set_size(slot.size() - by);
        self.total_size -= by;
    }

    fn merge_regions(&mut self, start_rgn: usize, end_rgn: usize) {
        let mut i = start_rgn.saturating_sub(1);
        let mut end_rgn = end_rgn.min(self.count.saturating_sub(1));
        while i < end_rgn {
            let this = self.slots[i];
            let next = self.slots[i + 1];
            if !this.merges_with(&next) {
                debug_assert!(this.end() <= next.base(), "{}: overlapping entries", self.name);
                i += 1;
                continue;
            }
            self.slots[i].set_size(this.size() + next.size());
            self.slots.copy_within(i + 2..self.count, i + 1);
            self.count -= 1;
            self.slots[self.count] = Region::EMPTY;
            end_rgn -= 1;
        }
    }
}

impl<'r> IntoIterator for &'r RegionArray<'_> {
    type Item = &'r Region;
    type IntoIter = core::slice::Iter<'r, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Clip `[base, base + size)` and return its exclusive end.
#[inline]
pub(crate) const fn range_end(base: PhysAddr, size: u64) -> PhysAddr {
    base + cap_size(base, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(a: &mut RegionArray<'_>, base: u64, size: u64) {
        let end = range_end(base, size);
        assert!(a.len() + a.uncovered_gaps(base, end) <= a.capacity());
        if a.uncovered_gaps(base, end) > 0 {
            a.insert_range(base, end, RegionFlags::NONE, None);
        }
    }

    fn remove(a: &mut RegionArray<'_>, base: u64, size: u64) {
        let end = range_end(base, size);
        assert!(a.len() + a.remainders_needed(base, end) <= a.capacity());
        a.carve(base, end);
    }

    fn spans(a: &RegionArray<'_>) -> Vec<(u64, u64)> {
        a.iter().map(|r| (r.base(), r.size())).collect()
    }

    #[test]
    fn gaps_count_uncovered_pieces() {
        let mut slots = [Region::EMPTY; 8];
        let mut a = RegionArray::new("test", &mut slots);
        assert_eq!(a.uncovered_gaps(0x1000, 0x2000), 1);

        add(&mut a, 0x2000, 0x1000);
        add(&mut a, 0x4000, 0x1000);
        assert_eq!(a.uncovered_gaps(0x2000, 0x3000), 0);
        assert_eq!(a.uncovered_gaps(0x2800, 0x4800), 1);
        assert_eq!(a.uncovered_gaps(0x1000, 0x6000), 3);
    }

    #[test]
    fn insert_fills_gaps_and_merges() {
        let mut slots = [Region::EMPTY; 8];
        let mut a = RegionArray::new("test", &mut slots);
        add(&mut a, 0x2000, 0x1000);
        add(&mut a, 0x4000, 0x1000);
        add(&mut a, 0x1000, 0x5000);

        assert_eq!(spans(&a), [(0x1000, 0x5000)]);
        assert_eq!(a.total_size(), 0x5000);
    }

    #[test]
    fn differing_flags_do_not_merge() {
        let mut slots = [Region::EMPTY; 8];
        let mut a = RegionArray::new("test", &mut slots);
        add(&mut a, 0x1000, 0x1000);
        a.insert_range(0x2000, 0x3000, RegionFlags::new().with_hotplug(true), None);

        assert_eq!(spans(&a), [(0x1000, 0x1000), (0x2000, 0x1000)]);
        assert!(a.regions()[1].flags().hotplug());
        assert_eq!(a.total_size(), 0x2000);
    }

    #[test]
    fn isolate_splits_both_ends() {
        let mut slots = [Region::EMPTY; 8];
        let mut a = RegionArray::new("test", &mut slots);
        add(&mut a, 0x1000, 0x4000);
        assert_eq!(a.splits_needed(0x2000, 0x3000), 2);

        let range = a.isolate(0x2000, 0x3000);
        assert_eq!(range, 1..2);
        assert_eq!(
            spans(&a),
            [(0x1000, 0x1000), (0x2000, 0x1000), (0x3000, 0x2000)]
        );
        assert_eq!(a.total_size(), 0x4000);
        assert_eq!(a.splits_needed(0x2000, 0x3000), 0);
    }

    #[test]
    fn remove_covers_several_entries() {
        let mut slots = [Region::EMPTY; 8];
        let mut a = RegionArray::new("test", &mut slots);
        add(&mut a, 0x1000, 0x1000);
        add(&mut a, 0x3000, 0x1000);
        add(&mut a, 0x5000, 0x1000);
        remove(&mut a, 0x1800, 0x3000);

        assert_eq!(spans(&a), [(0x1000, 0x800), (0x5000, 0x1000)]);
        assert_eq!(a.total_size(), 0x1800);
    }

    #[test]
    fn carving_a_hole_needs_one_slot() {
        let mut slots = [Region::EMPTY; 2];
        let mut a = RegionArray::new("test", &mut slots);
        add(&mut a, 0x1000, 0x4000);
        assert_eq!(a.remainders_needed(0x2000, 0x3000), 1);
        assert_eq!(a.remainders_needed(0x1000, 0x3000), 0);

        remove(&mut a, 0x2000, 0x1000);
        assert_eq!(spans(&a), [(0x1000, 0x1000), (0x3000, 0x2000)]);
        assert_eq!(a.total_size(), 0x3000);

        // Trimming either end of a full array splits nothing.
        remove(&mut a, 0x1800, 0x2000);
        remove(&mut a, 0x4800, 0x800);
        assert_eq!(spans(&a), [(0x1000, 0x800), (0x3800, 0x1000)]);
        assert_eq!(a.total_size(), 0x1800);
    }

    #[test]
    fn removing_everything_leaves_the_sentinel() {
        let mut slots = [Region::EMPTY; 4];
        let mut a = RegionArray::new("test", &mut slots);
        add(&mut a, 0x1000, 0x1000);
        remove(&mut a, 0, 0x10000);

        assert!(a.is_empty());
        assert_eq!(a.total_size(), 0);
        assert_eq!(a.slot(0), Some(&Region::EMPTY));
    }

    #[test]
    fn search_finds_containing_entry() {
        let mut slots = [Region::EMPTY; 8];
        let mut a = RegionArray::new("test", &mut slots);
        add(&mut a, 0x1000, 0x1000);
        add(&mut a, 0x4000, 0x1000);

        assert_eq!(a.search(0x1000), Some(0));
        assert_eq!(a.search(0x1fff), Some(0));
        assert_eq!(a.search(0x2000), None);
        assert_eq!(a.search(0x4800), Some(1));
        assert_eq!(a.search(0x5000), None);
    }

    #[test]
    fn replace_storage_keeps_entries_and_bumps_generation() {
        let mut slots = [Region::EMPTY; 2];
        let mut a = RegionArray::new("test", &mut slots);
        add(&mut a, 0x1000, 0x1000);
        add(&mut a, 0x3000, 0x1000);

        let grown: &mut [MaybeUninit<Region>] = Box::leak(Box::new([MaybeUninit::uninit(); 4]));
        let storage = ArrayStorage {
            base: 0x10_0000,
            size: 0x1000,
        };
        assert_eq!(a.replace_storage(grown, storage), None);

        assert_eq!(a.capacity(), 4);
        assert_eq!(a.generation(), 1);
        assert_eq!(a.storage(), Some(storage));
        assert_eq!(spans(&a), [(0x1000, 0x1000), (0x3000, 0x1000)]);
        assert_eq!(a.slot(3), Some(&Region::EMPTY));
    }
}
