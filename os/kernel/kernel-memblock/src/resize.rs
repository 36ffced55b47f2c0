//! # Array Growth
//!
//! A full [`RegionArray`](crate::RegionArray) is doubled into tracked memory:
//!
//! ```text
//!   memory    ├──────────────────────────────────────────────┤
//!   in flight            ├─────────┤
//!   above                          ├────────────────────────►│ current_limit
//!   below     │◄─────────┤
//! ```
//!
//! Top-down looks above the in-flight span first. Bottom-up looks below it
//! first.
//! The span being added or removed is never handed out as new storage. Once
//! the entries live in the new span, the span is reserved; only then is the
//! previous storage released, if it came from an earlier growth.

use crate::array::ArrayStorage;
use crate::error::MemblockError;
use crate::mapper::PhysMapper;
use crate::memblock::{Memblock, RegionKind};
use crate::region::Region;
use crate::PhysAddr;
use kernel_info::memory::{PAGE_SIZE, page_align};
use log::{debug, error};

impl<M: PhysMapper> Memblock<'_, M> {
    /// Double the capacity of the `kind` array.
    ///
    /// `[new_area_start, new_area_start + new_area_size)` is the range of the
    /// operation that ran out of slots and is excluded from the search.
    pub(crate) fn double_array(
        &mut self,
        kind: RegionKind,
        new_area_start: PhysAddr,
        new_area_size: u64,
    ) -> Result<(), MemblockError> {
        let name = self.array(kind).name();
        let old_cap = self.array(kind).capacity();
        let new_cap = old_cap * 2;

        if !self.can_resize() {
            error!("memblock: {name} is full and resizing is not allowed yet");
            return Err(MemblockError::ResizeNotAllowed { name });
        }

        let new_alloc_size = page_align((new_cap * Region::RECORD_SIZE) as u64);
        let limit = self.current_limit();
        let above = (new_area_start + new_area_size, limit);
        let below = (0, new_area_start.min(limit));
        let windows = match (new_area_size, self.bottom_up()) {
            (0, _) => [Some(above), None],
            (_, true) => [Some(below), Some(above)],
            (_, false) => [Some(above), Some(below)],
        };
        let addr = windows
            .into_iter()
            .flatten()
            .find_map(|(start, end)| self.find_in_range(start, end, new_alloc_size, PAGE_SIZE));
        let Some(addr) = addr else {
            error!("memblock: failed to double {name} array from {old_cap} to {new_cap} entries");
            return Err(MemblockError::ArrayExhausted {
                name,
                from: old_cap,
                to: new_cap,
            });
        };

        let (mapper, array) = self.mapper_and_array(kind);
        // SAFETY: `addr` was found in tracked memory outside every reservation,
        // is page aligned and spans `new_alloc_size >= new_cap * RECORD_SIZE` bytes.
        let slots = unsafe { mapper.phys_to_slice_mut::<Region>(addr, new_cap) };
        let old = array.replace_storage(
            slots,
            ArrayStorage {
                base: addr,
                size: new_alloc_size,
            },
        );
        debug!(
            "memblock: {name} is doubled to {new_cap} at [{addr:#x}-{:#x}]",
            addr + new_alloc_size - 1
        );

        self.reserve(addr, new_alloc_size)?;
        if let Some(old) = old {
            self.free(old.base, old.size)?;
        }
        Ok(())
    }
}
