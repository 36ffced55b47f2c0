//! # Physical Memory Layout

/// Size of the smallest page handed out by the early allocators.
pub const PAGE_SIZE: u64 = 4096;

/// Highest representable physical address.
///
/// Ranges that would run past this address are clipped so that they end
/// exactly here instead of wrapping around.
pub const PHYS_ADDR_MAX: u64 = u64::MAX;

/// Search limit meaning "anywhere in the physical address space".
pub const MEMBLOCK_ALLOC_ANYWHERE: u64 = PHYS_ADDR_MAX;

/// Number of slots in the statically provided array of available memory regions.
pub const INIT_MEMBLOCK_REGIONS: usize = 128;

/// Number of slots in the statically provided array of reserved memory regions.
pub const INIT_MEMBLOCK_RESERVED_REGIONS: usize = INIT_MEMBLOCK_REGIONS;

/// Number of NUMA nodes the kernel is able to describe.
pub const MAX_NUMNODES: u16 = 64;

/// Cache line size, used as the fallback alignment of early allocations.
pub const SMP_CACHE_BYTES: u64 = 64;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Round `addr` up to the next multiple of `align` (a power of two).
///
/// Returns `None` if rounding would overflow the address space.
#[inline]
#[must_use]
pub const fn align_up(addr: u64, align: u64) -> Option<u64> {
    debug_assert!(align.is_power_of_two());
    match addr.checked_add(align - 1) {
        Some(v) => Some(v & !(align - 1)),
        None => None,
    }
}

/// Round `addr` down to the previous multiple of `align` (a power of two).
#[inline]
#[must_use]
pub const fn align_down(addr: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    addr & !(align - 1)
}

/// Round a byte count up to whole pages.
#[inline]
#[must_use]
pub const fn page_align(size: u64) -> u64 {
    (size + (PAGE_SIZE - 1)) & !(PAGE_SIZE - 1)
}

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(SMP_CACHE_BYTES.is_power_of_two());
    assert!(INIT_MEMBLOCK_REGIONS.is_power_of_two());
    assert!(INIT_MEMBLOCK_RESERVED_REGIONS >= INIT_MEMBLOCK_REGIONS);
    assert!(MAX_NUMNODES > 0);
    assert!(HHDM_BASE.is_multiple_of(PAGE_SIZE));
};
