//! Page - the fixed-size memory block everything else is carved from.
//!
//! A [`Page`] is a raw 4KB byte array obtained from a
//! [`PageSource`](super::PageSource). The allocator embeds region
//! bookkeeping inside pages; the stream buffer fills whole pages with
//! captured bytes.

use crate::common::config::PAGE_SIZE;

/// A page of memory (4KB, 4KB-aligned).
///
/// Pages are always handled boxed and move between the page source, the
/// allocator's page cache and stream-buffer nodes without being copied.
///
/// # Example
/// ```
/// use nibblecap::alloc::Page;
///
/// let mut page = Page::new();
/// page.as_mut_slice()[0] = 0xFF;
/// assert_eq!(page.as_slice()[0], 0xFF);
/// ```
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a new zeroed page.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Create a new zeroed page directly on the heap.
    pub fn boxed() -> Box<Self> {
        Box::new(Self::new())
    }

    /// Get immutable slice of page data.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get mutable slice of page data.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Zero out `len` bytes starting at `offset`.
    pub fn zero_range(&mut self, offset: usize, len: usize) {
        self.data[offset..offset + len].fill(0);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_and_alignment() {
        assert_eq!(std::mem::size_of::<Page>(), PAGE_SIZE);
        assert_eq!(std::mem::align_of::<Page>(), 4096);
    }

    #[test]
    fn test_page_boxed_is_zeroed() {
        let page = Page::boxed();
        assert!(page.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_page_zero_range() {
        let mut page = Page::new();
        page.as_mut_slice()[10..20].fill(0xAB);
        page.as_mut_slice()[30] = 0xCD;

        page.zero_range(10, 10);

        assert!(page.as_slice()[10..20].iter().all(|&b| b == 0));
        assert_eq!(page.as_slice()[30], 0xCD);
    }

    #[test]
    fn test_page_reset_clears_everything() {
        let mut page = Page::boxed();
        page.as_mut_slice().fill(0x5A);
        page.reset();
        assert!(page.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_boxed_page_keeps_alignment() {
        let page = Page::boxed();
        let addr = page.as_slice().as_ptr() as usize;
        assert_eq!(addr % PAGE_SIZE, 0);
    }
}
