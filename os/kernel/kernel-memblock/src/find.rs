//! # Free Range Search
//!
//! Free memory is every byte of `memory` that is not `reserved`. The
//! iterators below walk both arrays in lock step and yield the pieces of each
//! memory entry that fall between two reserved entries:
//!
//! ```text
//! memory     ├────────────────────┤        ├──────────────┤
//! reserved         ├────┤   ├──┤                 ├──┤
//! free       ├─────┤    ├───┤  ├──┤        ├─────┤  ├────┤
//! ```
//!
//! Memory flagged `nomap` or `driver_managed` is never free.

use crate::mapper::PhysMapper;
use crate::memblock::Memblock;
use crate::node::NodeId;
use crate::region::Region;
use crate::PhysAddr;
use kernel_info::memory::{PAGE_SIZE, PHYS_ADDR_MAX, align_down, align_up};

/// One free physical range `[start, end)`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FreeRange {
    pub start: PhysAddr,
    pub end: PhysAddr,
    /// Node of the memory entry the range was cut from.
    pub node: Option<NodeId>,
}

/// The `idx`-th gap between reserved entries; gap 0 starts at address 0 and
/// the last gap ends at the top of the address space.
fn reserved_gap(reserved: &[Region], idx: usize) -> (PhysAddr, PhysAddr) {
    let start = idx.checked_sub(1).map_or(0, |prev| reserved[prev].end());
    let end = reserved.get(idx).map_or(PHYS_ADDR_MAX, Region::base);
    (start, end)
}

/// Free ranges in ascending address order.
pub struct FreeRanges<'r> {
    memory: &'r [Region],
    reserved: &'r [Region],
    mem_idx: usize,
    gap_idx: usize,
}

impl<'r> FreeRanges<'r> {
    pub(crate) const fn new(memory: &'r [Region], reserved: &'r [Region]) -> Self {
        Self {
            memory,
            reserved,
            mem_idx: 0,
            gap_idx: 0,
        }
    }
}

impl Iterator for FreeRanges<'_> {
    type Item = FreeRange;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(m) = self.memory.get(self.mem_idx) {
            if m.flags().excluded_from_search() {
                self.mem_idx += 1;
                continue;
            }
            while self.gap_idx <= self.reserved.len() {
                let (r_start, r_end) = reserved_gap(self.reserved, self.gap_idx);
                if r_start >= m.end() {
                    break;
                }
                if m.base() < r_end {
                    let range = FreeRange {
                        start: m.base().max(r_start),
                        end: m.end().min(r_end),
                        node: m.node(),
                    };
                    if m.end() <= r_end {
                        self.mem_idx += 1;
                    } else {
                        self.gap_idx += 1;
                    }
                    return Some(range);
                }
                self.gap_idx += 1;
            }
            self.mem_idx += 1;
        }
        None
    }
}

/// Free ranges in descending address order.
pub struct FreeRangesRev<'r> {
    memory: &'r [Region],
    reserved: &'r [Region],
    /// Memory entries not yet visited; the current one is `mem_left - 1`.
    mem_left: usize,
    /// Gaps not yet visited; the current one is `gaps_left - 1`.
    gaps_left: usize,
}

impl<'r> FreeRangesRev<'r> {
    pub(crate) const fn new(memory: &'r [Region], reserved: &'r [Region]) -> Self {
        Self {
            memory,
            reserved,
            mem_left: memory.len(),
            gaps_left: reserved.len() + 1,
        }
    }
}

impl Iterator for FreeRangesRev<'_> {
    type Item = FreeRange;

    fn next(&mut self) -> Option<Self::Item> {
        while self.mem_left > 0 {
            let m = self.memory[self.mem_left - 1];
            if m.flags().excluded_from_search() {
                self.mem_left -= 1;
                continue;
            }
            while self.gaps_left > 0 {
                let (r_start, r_end) = reserved_gap(self.reserved, self.gaps_left - 1);
                if r_end <= m.base() {
                    break;
                }
                if m.end() > r_start {
                    let range = FreeRange {
                        start: m.base().max(r_start),
                        end: m.end().min(r_end),
                        node: m.node(),
                    };
                    if m.base() >= r_start {
                        self.mem_left -= 1;
                    } else {
                        self.gaps_left -= 1;
                    }
                    return Some(range);
                }
                self.gaps_left -= 1;
            }
            self.mem_left -= 1;
        }
        None
    }
}

impl<M: PhysMapper> Memblock<'_, M> {
    /// Iterate over free memory from the lowest address up.
    #[must_use]
    pub fn free_ranges(&self) -> FreeRanges<'_> {
        FreeRanges::new(self.memory().regions(), self.reserved().regions())
    }

    /// Iterate over free memory from the highest address down.
    #[must_use]
    pub fn free_ranges_rev(&self) -> FreeRangesRev<'_> {
        FreeRangesRev::new(self.memory().regions(), self.reserved().regions())
    }

    /// Find `size` free bytes aligned to `align` within `[start, end)`.
    ///
    /// `end` is limited by the current limit and the first page is never
    /// returned. The search direction follows [`bottom_up`](Self::bottom_up):
    /// top-down returns the highest fitting address, bottom-up the lowest.
    /// Nothing is reserved.
    #[must_use]
    pub fn find_in_range(
        &self,
        start: PhysAddr,
        end: PhysAddr,
        size: u64,
        align: u64,
    ) -> Option<PhysAddr> {
        let end = end.min(self.current_limit());
        let start = start.max(PAGE_SIZE);
        let end = end.max(start);

        if self.bottom_up() {
            self.find_bottom_up(start, end, size, align)
        } else {
            self.find_top_down(start, end, size, align)
        }
    }

    fn find_bottom_up(&self, start: PhysAddr, end: PhysAddr, size: u64, align: u64) -> Option<PhysAddr> {
        self.free_ranges().find_map(|range| {
            let this_start = range.start.clamp(start, end);
            let this_end = range.end.clamp(start, end);
            let cand = align_up(this_start, align)?;
            (cand < this_end && this_end - cand >= size).then_some(cand)
        })
    }

    fn find_top_down(&self, start: PhysAddr, end: PhysAddr, size: u64, align: u64) -> Option<PhysAddr> {
        self.free_ranges_rev().find_map(|range| {
            let this_start = range.start.clamp(start, end);
            let this_end = range.end.clamp(start, end);
            if this_end < size {
                return None;
            }
            let cand = align_down(this_end - size, align);
            (cand >= this_start && this_end > this_start).then_some(cand)
        })
    }
}
