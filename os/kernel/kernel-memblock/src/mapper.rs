//! # Physical Memory Access for Grown Arrays
//!
//! When a region array outgrows its slots, the replacement is carved out of
//! tracked physical memory. The tracker can only write through virtual
//! addresses, so the [`PhysMapper`] hook turns the chosen physical span into
//! a slice the array can move its entries into.
//!
//! - **Kernel**: [`HhdmPhysMapper`] adds the higher-half direct map offset.
//! - **Tests**: a mock backed by ordinary heap memory standing in for RAM.

use crate::PhysAddr;
use core::mem::MaybeUninit;
use kernel_info::memory::HHDM_BASE;

/// Converts physical spans to *temporarily* usable slices in the current
/// virtual address space.
///
/// # Safety
/// - `pa..pa + len * size_of::<T>()` must be mapped as writable for `'a`.
/// - `pa` must be suitably aligned for `T`.
/// - Nothing else may access the span while the slice is alive.
pub trait PhysMapper {
    /// Map `len` elements of `T` starting at physical address `pa`.
    ///
    /// # Safety
    /// See the trait documentation.
    unsafe fn phys_to_slice_mut<'a, T>(&self, pa: PhysAddr, len: usize) -> &'a mut [MaybeUninit<T>];
}

/// [`PhysMapper`] for kernels with a higher-half direct map (HHDM).
///
/// Every physical address `pa` is visible at `HHDM_BASE + pa`.
///
/// # Safety
/// - The HHDM mapping must be present and cover the referenced physical range.
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    unsafe fn phys_to_slice_mut<'a, T>(&self, pa: PhysAddr, len: usize) -> &'a mut [MaybeUninit<T>] {
        let va = (HHDM_BASE + pa) as *mut MaybeUninit<T>;
        // SAFETY: Caller must ensure the physical span is valid and mapped via HHDM.
        unsafe { core::slice::from_raw_parts_mut(va, len) }
    }
}
