//! Page slot identifier.

use std::fmt;

/// Identifies a page held by the [`PageAllocator`](crate::alloc::PageAllocator).
///
/// Pages live in an arena (`Vec<Option<CachePage>>`), so a slot is a direct
/// index: `pages[slot.0]`. Slots of released pages are reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageSlot(pub usize);

impl PageSlot {
    /// Create a new PageSlot.
    #[inline]
    pub fn new(index: usize) -> Self {
        PageSlot(index)
    }
}

impl fmt::Display for PageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.0)
    }
}
