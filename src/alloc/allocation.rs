//! RAII ownership of an allocated region.

use std::sync::Arc;

use crate::alloc::PageAllocator;
use crate::common::{RegionHandle, Result};

/// A region that frees itself when dropped.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use nibblecap::alloc::{AllocFlags, PageAllocator};
///
/// let allocator = Arc::new(PageAllocator::with_system_pages(None));
/// {
///     let lease = allocator.lease(32, AllocFlags::Blocking).unwrap();
///     lease.with_bytes_mut(|b| b[0] = 7).unwrap();
///     assert_eq!(lease.with_bytes(|b| b[0]).unwrap(), 7);
/// }
/// assert_eq!(allocator.pages_held(), 0);
/// ```
pub struct Allocation {
    allocator: Arc<PageAllocator>,
    handle: RegionHandle,
    size: usize,
}

impl Allocation {
    pub(crate) fn new(allocator: Arc<PageAllocator>, handle: RegionHandle, size: usize) -> Self {
        Self {
            allocator,
            handle,
            size,
        }
    }

    /// Handle of the owned region.
    #[inline]
    pub fn handle(&self) -> RegionHandle {
        self.handle
    }

    /// Payload size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `f` over the payload.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        self.allocator.with_region(self.handle, f)
    }

    /// Run `f` over the mutable payload.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        self.allocator.with_region_mut(self.handle, f)
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Err(e) = self.allocator.free(self.handle) {
            log::error!("failed to free {}: {}", self.handle, e);
        }
    }
}

impl std::fmt::Debug for Allocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Allocation")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .finish()
    }
}
