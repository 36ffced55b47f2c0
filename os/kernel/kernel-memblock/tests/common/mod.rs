#![allow(dead_code)]

use kernel_info::memory::{INIT_MEMBLOCK_REGIONS, INIT_MEMBLOCK_RESERVED_REGIONS};
use kernel_memblock::{Memblock, PhysAddr, PhysMapper, Region, RegionArray};
use std::cell::{RefCell, UnsafeCell};
use std::mem::MaybeUninit;

pub const SZ_1K: u64 = 0x400;
pub const SZ_2K: u64 = 0x800;
pub const SZ_4K: u64 = 0x1000;
pub const SZ_8K: u64 = 0x2000;
pub const SZ_16K: u64 = 0x4000;
pub const SZ_32K: u64 = 0x8000;
pub const SZ_64K: u64 = 0x1_0000;
pub const SZ_128K: u64 = 0x2_0000;
pub const SZ_256K: u64 = 0x4_0000;
pub const SZ_512K: u64 = 0x8_0000;
pub const SZ_1M: u64 = 0x10_0000;
pub const SZ_2M: u64 = 0x20_0000;
pub const SZ_4M: u64 = 0x40_0000;
pub const SZ_8M: u64 = 0x80_0000;
pub const SZ_16M: u64 = 0x100_0000;
pub const SZ_64M: u64 = 0x400_0000;
pub const SZ_256M: u64 = 0x1000_0000;
pub const SZ_512M: u64 = 0x2000_0000;
pub const SZ_1G: u64 = 0x4000_0000;

#[repr(C, align(4096))]
struct Frame([u8; 4096]);

/// Dummy physical memory.
///
/// A window `[base, base + size)` of the physical address space backed by
/// heap frames. Every span the tracker maps is recorded; mapping anything
/// outside the window fails the test.
pub struct DummyPhys {
    base: PhysAddr,
    size: u64,
    frames: UnsafeCell<Vec<Frame>>,
    mapped: RefCell<Vec<(PhysAddr, usize)>>,
}

impl DummyPhys {
    pub fn new(base: PhysAddr, size: u64) -> Self {
        assert_eq!(base % SZ_4K, 0);
        assert_eq!(size % SZ_4K, 0);
        let frames = (0..size / SZ_4K).map(|_| Frame([0; 4096])).collect();
        Self {
            base,
            size,
            frames: UnsafeCell::new(frames),
            mapped: RefCell::new(Vec::new()),
        }
    }

    /// A window of size zero: any growth fails the test.
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    pub const fn base(&self) -> PhysAddr {
        self.base
    }

    pub const fn end(&self) -> PhysAddr {
        self.base + self.size
    }

    /// Spans mapped so far, as `(physical address, bytes)`.
    pub fn mapped(&self) -> Vec<(PhysAddr, usize)> {
        self.mapped.borrow().clone()
    }
}

impl PhysMapper for DummyPhys {
    unsafe fn phys_to_slice_mut<'a, T>(&self, pa: PhysAddr, len: usize) -> &'a mut [MaybeUninit<T>] {
        let bytes = len * size_of::<T>();
        assert!(
            pa >= self.base && pa + bytes as u64 <= self.end(),
            "mapping [{pa:#x}+{bytes:#x}] outside of dummy memory [{:#x}-{:#x})",
            self.base,
            self.end()
        );
        self.mapped.borrow_mut().push((pa, bytes));

        let offset = usize::try_from(pa - self.base).unwrap();
        // SAFETY: the frames are never reallocated and the window check above
        // keeps the slice inside them.
        unsafe {
            let base = (*self.frames.get()).as_mut_ptr().cast::<u8>();
            std::slice::from_raw_parts_mut(base.add(offset).cast(), len)
        }
    }
}

/// Slot storage that lives for the rest of the test binary.
pub fn slots(n: usize) -> &'static mut [Region] {
    Box::leak(vec![Region::EMPTY; n].into_boxed_slice())
}

/// A tracker with the default boot array sizes that must not grow.
pub fn memblock() -> Memblock<'static, DummyPhys> {
    memblock_with(DummyPhys::none(), INIT_MEMBLOCK_REGIONS, INIT_MEMBLOCK_RESERVED_REGIONS)
}

pub fn memblock_with(
    ram: DummyPhys,
    memory_slots: usize,
    reserved_slots: usize,
) -> Memblock<'static, DummyPhys> {
    Memblock::new(slots(memory_slots), slots(reserved_slots), ram)
}

/// `(base, size)` of every entry.
pub fn spans(array: &RegionArray<'_>) -> Vec<(u64, u64)> {
    array.iter().map(|r| (r.base(), r.size())).collect()
}

/// Check the structural invariants of one array.
pub fn assert_consistent(array: &RegionArray<'_>) {
    let regions = array.regions();
    assert!(array.len() <= array.capacity(), "{}: count above capacity", array.name());

    let sum: u64 = regions.iter().map(Region::size).sum();
    assert_eq!(array.total_size(), sum, "{}: total size drifted", array.name());

    for r in regions {
        assert!(!r.is_empty(), "{}: empty live entry {r:?}", array.name());
    }
    for pair in regions.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(a.end() <= b.base(), "{}: {a:?} and {b:?} out of order", array.name());
        assert!(!a.merges_with(b), "{}: {a:?} and {b:?} not merged", array.name());
    }

    for idx in array.len()..array.capacity() {
        assert_eq!(array.slot(idx), Some(&Region::EMPTY), "{}: stale slot {idx}", array.name());
    }
}

pub fn assert_all_consistent(mb: &Memblock<'_, DummyPhys>) {
    assert_consistent(mb.memory());
    assert_consistent(mb.reserved());
}
