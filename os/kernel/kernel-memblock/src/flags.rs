use bitfield_struct::bitfield;

/// Attributes of a tracked region.
///
/// Two adjacent regions are only merged when their flags are identical.
/// Reserved bits are forced to 0.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct RegionFlags {
    /// Bit 0 — Hotpluggable.
    ///
    /// The range may be removed at runtime and should not hold long-lived
    /// kernel data.
    pub hotplug: bool,

    /// Bit 1 — Mirrored.
    ///
    /// The range is backed by mirrored (redundant) memory.
    pub mirror: bool,

    /// Bit 2 — Not mapped.
    ///
    /// The range must not be added to the direct map; free-range searches
    /// skip it.
    pub nomap: bool,

    /// Bit 3 — Driver managed.
    ///
    /// The range was handed over to a driver and is never used for early
    /// allocations.
    pub driver_managed: bool,

    /// Bit 4 — Reserved, do not initialize.
    ///
    /// Only meaningful on reserved regions: the page descriptors covering the
    /// range are left uninitialized.
    pub reserved_noinit: bool,

    /// Bits 5–31 — Reserved (must be 0).
    #[bits(27, default = 0)]
    _reserved_5_31: u32,
}

impl RegionFlags {
    /// No attributes.
    pub const NONE: Self = Self::new();

    /// Returns `true` if no attribute is set.
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.into_bits() == 0
    }

    /// Returns `true` if free-range searches must not hand out this region.
    #[inline]
    #[must_use]
    pub const fn excluded_from_search(self) -> bool {
        self.nomap() || self.driver_managed()
    }
}
