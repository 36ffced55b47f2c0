//! # Kernel Boot-Time Memory Configuration
//!
//! This crate holds the constants and small helpers that the early memory
//! bookkeeping shares with the rest of the kernel. It is the authoritative
//! source for page size, the physical address ceiling, the size of the
//! statically provided region arrays and the NUMA node limit.
//!
//! ## Physical Address Space
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │  First page (never allocated)   │
//! PAGE_SIZE             ├─────────────────────────────────┤
//!                       │                                 │
//!                       │  RAM, holes, firmware regions   │
//!                       │  (tracked by kernel-memblock)   │
//!                       │                                 │
//! PHYS_ADDR_MAX         └─────────────────────────────────┘ 0xFFFF_FFFF_FFFF_FFFF
//! ```
//!
//! Ranges are half-open, `[base, base + size)`. A range whose end would pass
//! [`PHYS_ADDR_MAX`](memory::PHYS_ADDR_MAX) ends exactly at it.
//!
//! ## Collaborators
//!
//! * [`page_align`](memory::page_align): byte counts to whole pages
//! * [`align_up`](memory::align_up) / [`align_down`](memory::align_down):
//!   power-of-two rounding, overflow-aware on the way up
//!
//! ```rust
//! use kernel_info::memory::{PAGE_SIZE, page_align};
//!
//! assert_eq!(page_align(1), PAGE_SIZE);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
