//! # Early Physical Memory Tracking
//!
//! Bookkeeping of physical memory during early boot, before the frame
//! allocator exists. Two sorted [`RegionArray`]s describe the machine:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │ memory     what the firmware reported as usable RAM   │
//! │ reserved   what is already claimed (kernel, initrd,   │
//! │            ACPI tables, early allocations, ...)       │
//! └──────────────────────────┬────────────────────────────┘
//!                            │  memory − reserved
//! ┌──────────────────────────▼────────────────────────────┐
//! │ free ranges, searched top-down or bottom-up           │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! Adding merges with neighbours, removing splits straddling entries, and
//! both arrays start out in small boot-provided slot arrays. When one of
//! them fills up it is doubled into free tracked memory, which the tracker
//! then reserves for itself. Growth is off until
//! [`Memblock::allow_resize`] is called.
//!
//! ## Example
//!
//! ```
//! use kernel_memblock::{HhdmPhysMapper, Memblock, Region};
//!
//! let mut memory = [Region::EMPTY; 128];
//! let mut reserved = [Region::EMPTY; 128];
//! let mut mb = Memblock::new(&mut memory, &mut reserved, HhdmPhysMapper);
//!
//! mb.add(0x10_0000, 0x80_0000).unwrap();
//! mb.reserve(0x10_0000, 0x2_0000).unwrap();
//!
//! let pa = mb.phys_alloc(0x1000, 0x1000).unwrap();
//! assert_eq!(pa, 0x8f_f000);
//! assert!(mb.is_region_reserved(pa, 0x1000));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod array;
mod error;
mod find;
mod flags;
mod mapper;
mod memblock;
mod node;
mod region;
mod resize;

pub use crate::array::{ArrayStorage, RegionArray};
pub use crate::error::MemblockError;
pub use crate::find::{FreeRange, FreeRanges, FreeRangesRev};
pub use crate::flags::RegionFlags;
pub use crate::mapper::{HhdmPhysMapper, PhysMapper};
pub use crate::memblock::{Memblock, RegionKind};
pub use crate::node::NodeId;
pub use crate::region::Region;

/// A physical address.
pub type PhysAddr = u64;

/// Clip `size` so that `base + size` stops at the top of the address space.
#[inline]
#[must_use]
pub const fn cap_size(base: PhysAddr, size: u64) -> u64 {
    let room = kernel_info::memory::PHYS_ADDR_MAX - base;
    if size < room { size } else { room }
}
