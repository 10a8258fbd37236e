//! Region handle type.

use std::fmt;

use super::PageSlot;

/// Opaque handle to a live allocation.
///
/// A handle names the page that hosts the region and the offset of the
/// region's payload inside that page. It replaces pointer arithmetic: the
/// allocator finds the bookkeeping record by searching the page's region
/// list for the matching offset.
///
/// # Example
/// ```
/// use nibblecap::{PageSlot, RegionHandle};
///
/// let handle = RegionHandle::new(PageSlot::new(0), 32);
/// assert_eq!(handle.slot(), PageSlot::new(0));
/// assert_eq!(handle.offset(), 32);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionHandle {
    slot: PageSlot,
    offset: usize,
}

impl RegionHandle {
    /// Create a new RegionHandle.
    #[inline]
    pub fn new(slot: PageSlot, offset: usize) -> Self {
        Self { slot, offset }
    }

    /// Page hosting the region.
    #[inline]
    pub fn slot(&self) -> PageSlot {
        self.slot
    }

    /// Payload offset within the page.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl fmt::Display for RegionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Region({}+{})", self.slot.0, self.offset)
    }
}
