use core::fmt;
use kernel_info::memory::MAX_NUMNODES;

/// A NUMA node identifier, always below [`MAX_NUMNODES`].
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(u16);

impl NodeId {
    /// Validate a raw node number.
    #[inline]
    #[must_use]
    pub const fn new(id: u16) -> Option<Self> {
        if Self::is_valid(id) {
            Some(Self(id))
        } else {
            None
        }
    }

    /// Returns `true` if `id` names a node the kernel can describe.
    #[inline]
    #[must_use]
    pub const fn is_valid(id: u16) -> bool {
        id < MAX_NUMNODES
    }

    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
