//! Page Allocator - first-fit regions carved out of whole pages.
//!
//! The [`PageAllocator`] provides:
//! - Small allocations packed into pages obtained from a [`PageSource`]
//! - Bookkeeping headers embedded in the pages themselves
//! - Whole-page hand-out for callers that need raw pages
//! - A context-appropriate lock: safe from interrupt and process context

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::alloc::page::Page;
use crate::alloc::page_source::{PageSource, SystemPageSource};
use crate::alloc::region_header::{RegionHeader, RegionKind};
use crate::alloc::{Allocation, AllocatorStats};
use crate::common::config::{MAX_REGION_SIZE, PAGE_SIZE, REGION_HEADER_SIZE};
use crate::common::{Error, PageSlot, RegionHandle, Result};
use crate::sync::{irq, IrqLock, IrqLockGuard};

/// The context an allocation request is made from.
///
/// The caller states it; the allocator picks the lock mode from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocFlags {
    /// Interrupt or deferred context: never sleep, suppress local interrupts.
    Atomic,
    /// Process context: plain locking.
    Blocking,
}

impl AllocFlags {
    /// `Atomic` in interrupt or deferred context, `Blocking` otherwise.
    pub fn for_current_context() -> Self {
        if irq::in_interrupt() {
            AllocFlags::Atomic
        } else {
            AllocFlags::Blocking
        }
    }
}

/// A region recorded in a page's region list.
///
/// The region occupies `[start, start + REGION_HEADER_SIZE + size)`; the
/// payload starts right after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedRegion {
    /// Offset of the region header within the page.
    pub start: usize,
    /// Payload size in bytes.
    pub size: usize,
}

impl AllocatedRegion {
    /// One past the last byte of the region.
    #[inline]
    pub fn end(&self) -> usize {
        self.start + REGION_HEADER_SIZE + self.size
    }

    /// Offset of the payload within the page.
    #[inline]
    pub fn payload_offset(&self) -> usize {
        self.start + REGION_HEADER_SIZE
    }
}

/// A page plus its ordered region list.
///
/// The list always starts with the head sentinel and ends with the tail
/// sentinel; `start` values are strictly increasing.
struct CachePage {
    page: Box<Page>,
    regions: Vec<AllocatedRegion>,
}

impl CachePage {
    fn new(mut page: Box<Page>) -> Self {
        let head = AllocatedRegion { start: 0, size: 0 };
        let tail = AllocatedRegion {
            start: PAGE_SIZE - REGION_HEADER_SIZE,
            size: 0,
        };

        RegionHeader::new(RegionKind::HeadSentinel, head.start, 0)
            .write_to(&mut page.as_mut_slice()[head.start..]);
        RegionHeader::new(RegionKind::TailSentinel, tail.start, 0)
            .write_to(&mut page.as_mut_slice()[tail.start..]);

        Self {
            page,
            regions: vec![head, tail],
        }
    }

    /// First-fit: insert into the first gap that holds header + payload.
    fn try_insert(&mut self, size: usize) -> Option<AllocatedRegion> {
        let needed = size + REGION_HEADER_SIZE;

        let index = self
            .regions
            .windows(2)
            .position(|pair| pair[1].start - pair[0].end() >= needed)?;

        let region = AllocatedRegion {
            start: self.regions[index].end(),
            size,
        };

        RegionHeader::new(RegionKind::Live, region.start, size)
            .write_to(&mut self.page.as_mut_slice()[region.start..]);
        self.regions.insert(index + 1, region);

        Some(region)
    }

    /// Index of the live region whose payload starts at `offset`.
    fn find_live(&self, offset: usize) -> Option<usize> {
        let start = offset.checked_sub(REGION_HEADER_SIZE)?;
        let index = self
            .regions
            .binary_search_by_key(&start, |r| r.start)
            .ok()?;

        // sentinels are never handed out
        if index == 0 || index == self.regions.len() - 1 {
            return None;
        }

        let region = self.regions[index];
        let header = RegionHeader::from_bytes(&self.page.as_slice()[region.start..])?;
        (header.kind == RegionKind::Live
            && header.start as usize == region.start
            && header.size as usize == region.size)
            .then_some(index)
    }

    /// Remove a region and zero its header and payload.
    fn remove(&mut self, index: usize) -> AllocatedRegion {
        let region = self.regions.remove(index);
        self.page
            .zero_range(region.start, REGION_HEADER_SIZE + region.size);
        region
    }

    fn is_unused(&self) -> bool {
        self.regions.len() == 2
    }
}

/// Arena of cache pages addressed by [`PageSlot`].
#[derive(Default)]
struct CacheInner {
    pages: Vec<Option<CachePage>>,
    free_slots: Vec<PageSlot>,
}

impl CacheInner {
    fn page(&self, slot: PageSlot) -> Option<&CachePage> {
        self.pages.get(slot.0).and_then(Option::as_ref)
    }

    fn page_mut(&mut self, slot: PageSlot) -> Option<&mut CachePage> {
        self.pages.get_mut(slot.0).and_then(Option::as_mut)
    }

    fn install(&mut self, page: CachePage) -> PageSlot {
        match self.free_slots.pop() {
            Some(slot) => {
                self.pages[slot.0] = Some(page);
                slot
            }
            None => {
                self.pages.push(Some(page));
                PageSlot::new(self.pages.len() - 1)
            }
        }
    }

    fn held(&self) -> usize {
        self.pages.iter().filter(|p| p.is_some()).count()
    }
}

/// Fixed-page memory pool usable from every execution context.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                        PageAllocator                         │
/// │  pages: Vec<Option<CachePage>>   (arena, indexed by PageSlot) │
/// │  ┌────────────────────────────────────────────────────────┐  │
/// │  │ Page  [HEAD][hdr|payload][hdr|payload]   gap   [TAIL]  │  │
/// │  │ regions: start-ordered list mirroring the headers      │  │
/// │  └────────────────────────────────────────────────────────┘  │
/// │  source: Arc<dyn PageSource>     stats: AllocatorStats       │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// All state sits behind one [`IrqLock`]. `Atomic` requests and every call
/// made from interrupt or deferred context take it with local interrupts
/// suppressed; process-context `Blocking` requests take it plainly.
///
/// # Fragmentation
/// Free space is never tracked: a gap is whatever lies between two
/// surviving neighbours in the region list. Freeing reopens that span and
/// live regions are never moved to compact it. A page goes back to the
/// source once only its sentinels remain.
pub struct PageAllocator {
    inner: IrqLock<CacheInner>,
    source: Arc<dyn PageSource>,
    stats: AllocatorStats,
}

impl PageAllocator {
    /// Create an allocator drawing pages from `source`.
    pub fn new(source: Arc<dyn PageSource>) -> Self {
        Self {
            inner: IrqLock::new("page_allocator", CacheInner::default()),
            source,
            stats: AllocatorStats::new(),
        }
    }

    /// Allocator backed by a heap page source with an optional page limit.
    pub fn with_system_pages(page_limit: Option<usize>) -> Self {
        Self::new(Arc::new(SystemPageSource::from_limit(page_limit)))
    }

    // ========================================================================
    // Public API: regions
    // ========================================================================

    /// Allocate `size` bytes.
    ///
    /// # Errors
    /// - `Error::OutOfCapacity` if `size` exceeds [`MAX_REGION_SIZE`]
    /// - `Error::AllocationExhausted` if no page has room and the page
    ///   source refuses a new page
    pub fn alloc(&self, size: usize, flags: AllocFlags) -> Result<RegionHandle> {
        if size > MAX_REGION_SIZE {
            self.stats.failed_allocations.fetch_add(1, Ordering::Relaxed);
            return Err(Error::OutOfCapacity {
                requested: size,
                max: MAX_REGION_SIZE,
            });
        }

        let mut inner = self.lock_for(flags);

        // First fit over existing pages
        for (index, entry) in inner.pages.iter_mut().enumerate() {
            if let Some(cache_page) = entry {
                if let Some(region) = cache_page.try_insert(size) {
                    self.stats.allocations.fetch_add(1, Ordering::Relaxed);
                    return Ok(RegionHandle::new(
                        PageSlot::new(index),
                        region.payload_offset(),
                    ));
                }
            }
        }

        // No room anywhere: grow by one page and search it
        let page = match self.source.get_zeroed_page() {
            Some(page) => page,
            None => {
                self.stats.failed_allocations.fetch_add(1, Ordering::Relaxed);
                return Err(Error::AllocationExhausted { requested: size });
            }
        };
        self.stats.pages_acquired.fetch_add(1, Ordering::Relaxed);

        let slot = inner.install(CachePage::new(page));
        let region = inner
            .page_mut(slot)
            .and_then(|p| p.try_insert(size))
            .ok_or(Error::OutOfCapacity {
                requested: size,
                max: MAX_REGION_SIZE,
            })?;

        log::debug!("allocator grew to {} pages (new {})", inner.held(), slot);
        self.stats.allocations.fetch_add(1, Ordering::Relaxed);
        Ok(RegionHandle::new(slot, region.payload_offset()))
    }

    /// Free a region, releasing its page once only sentinels remain.
    ///
    /// # Errors
    /// - `Error::InvalidHandle` if `handle` does not name a live region
    pub fn free(&self, handle: RegionHandle) -> Result<()> {
        let mut inner = self.inner.lock_auto();

        let cache_page = inner
            .page_mut(handle.slot())
            .ok_or(Error::InvalidHandle { handle })?;
        let index = cache_page
            .find_live(handle.offset())
            .ok_or(Error::InvalidHandle { handle })?;

        cache_page.remove(index);
        let unused = cache_page.is_unused();
        self.stats.frees.fetch_add(1, Ordering::Relaxed);

        if unused {
            if let Some(cache_page) = inner.pages[handle.slot().0].take() {
                inner.free_slots.push(handle.slot());
                self.source.free_page(cache_page.page);
                self.stats.pages_released.fetch_add(1, Ordering::Relaxed);
                log::debug!("allocator released {}, {} pages held", handle.slot(), inner.held());
            }
        }

        Ok(())
    }

    /// Allocate a region owned by an RAII [`Allocation`].
    pub fn lease(self: &Arc<Self>, size: usize, flags: AllocFlags) -> Result<Allocation> {
        let handle = self.alloc(size, flags)?;
        Ok(Allocation::new(Arc::clone(self), handle, size))
    }

    /// Run `f` over the payload of a live region.
    pub fn with_region<R>(&self, handle: RegionHandle, f: impl FnOnce(&[u8]) -> R) -> Result<R> {
        let inner = self.inner.lock_auto();
        let cache_page = inner
            .page(handle.slot())
            .ok_or(Error::InvalidHandle { handle })?;
        let index = cache_page
            .find_live(handle.offset())
            .ok_or(Error::InvalidHandle { handle })?;
        let region = cache_page.regions[index];

        let offset = region.payload_offset();
        Ok(f(&cache_page.page.as_slice()[offset..offset + region.size]))
    }

    /// Run `f` over the mutable payload of a live region.
    pub fn with_region_mut<R>(
        &self,
        handle: RegionHandle,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R> {
        let mut inner = self.inner.lock_auto();
        let cache_page = inner
            .page_mut(handle.slot())
            .ok_or(Error::InvalidHandle { handle })?;
        let index = cache_page
            .find_live(handle.offset())
            .ok_or(Error::InvalidHandle { handle })?;
        let region = cache_page.regions[index];

        let offset = region.payload_offset();
        Ok(f(&mut cache_page.page.as_mut_slice()[offset..offset + region.size]))
    }

    // ========================================================================
    // Public API: whole pages
    // ========================================================================

    /// Take a whole zeroed page from the page source.
    ///
    /// # Errors
    /// - `Error::AllocationExhausted` if the source refuses
    pub fn acquire_page(&self, flags: AllocFlags) -> Result<Box<Page>> {
        if flags == AllocFlags::Blocking && irq::in_interrupt() {
            log::warn!("blocking page request from atomic context, treating as atomic");
        }

        match self.source.get_zeroed_page() {
            Some(page) => {
                self.stats.pages_acquired.fetch_add(1, Ordering::Relaxed);
                Ok(page)
            }
            None => {
                self.stats.failed_allocations.fetch_add(1, Ordering::Relaxed);
                Err(Error::AllocationExhausted {
                    requested: PAGE_SIZE,
                })
            }
        }
    }

    /// Return a page obtained from [`acquire_page`](Self::acquire_page).
    pub fn release_page(&self, page: Box<Page>) {
        self.source.free_page(page);
        self.stats.pages_released.fetch_add(1, Ordering::Relaxed);
    }

    // ========================================================================
    // Public API: introspection
    // ========================================================================

    /// Number of pages hosting regions.
    pub fn pages_held(&self) -> usize {
        self.inner.lock_auto().held()
    }

    /// Number of pages the page source has handed out (regions + whole pages).
    pub fn pages_in_use(&self) -> usize {
        self.source.pages_in_use()
    }

    /// Region lists of every held page, sentinels included.
    pub fn layout(&self) -> Vec<(PageSlot, Vec<AllocatedRegion>)> {
        let inner = self.inner.lock_auto();
        inner
            .pages
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                entry
                    .as_ref()
                    .map(|p| (PageSlot::new(index), p.regions.clone()))
            })
            .collect()
    }

    /// Get allocator statistics.
    pub fn stats(&self) -> &AllocatorStats {
        &self.stats
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn lock_for(&self, flags: AllocFlags) -> IrqLockGuard<'_, CacheInner> {
        match flags {
            AllocFlags::Atomic => self.inner.lock_irqsave(),
            AllocFlags::Blocking if irq::in_interrupt() => {
                log::warn!("blocking allocation from atomic context, treating as atomic");
                self.inner.lock_irqsave()
            }
            AllocFlags::Blocking => self.inner.lock(),
        }
    }
}

impl Drop for PageAllocator {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        let leaked: usize = inner
            .pages
            .iter()
            .flatten()
            .map(|p| p.regions.len() - 2)
            .sum();
        if leaked > 0 {
            log::warn!("page allocator dropped with {} live regions", leaked);
        }

        for cache_page in inner.pages.drain(..).flatten() {
            self.source.free_page(cache_page.page);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator() -> PageAllocator {
        PageAllocator::with_system_pages(None)
    }

    fn assert_ordered(allocator: &PageAllocator) {
        for (_, regions) in allocator.layout() {
            assert!(regions.windows(2).all(|w| w[0].start < w[1].start));
            assert!(regions.windows(2).all(|w| w[0].end() <= w[1].start));
        }
    }

    #[test]
    fn test_first_allocation_creates_page() {
        let allocator = allocator();
        assert_eq!(allocator.pages_held(), 0);

        let handle = allocator.alloc(100, AllocFlags::Blocking).unwrap();
        assert_eq!(allocator.pages_held(), 1);
        assert_eq!(handle.slot(), PageSlot::new(0));
        // right after the head sentinel
        assert_eq!(handle.offset(), 2 * REGION_HEADER_SIZE);
    }

    #[test]
    fn test_first_fit_packs_regions() {
        let allocator = allocator();
        let a = allocator.alloc(100, AllocFlags::Blocking).unwrap();
        let b = allocator.alloc(50, AllocFlags::Atomic).unwrap();

        assert_eq!(a.slot(), b.slot());
        assert_eq!(b.offset(), a.offset() + 100 + REGION_HEADER_SIZE);
        assert_ordered(&allocator);
    }

    #[test]
    fn test_oversized_request() {
        let allocator = allocator();
        let result = allocator.alloc(MAX_REGION_SIZE + 1, AllocFlags::Blocking);
        assert!(matches!(result, Err(Error::OutOfCapacity { .. })));
        assert_eq!(allocator.pages_held(), 0);

        // the maximum fits exactly into a fresh page
        let handle = allocator.alloc(MAX_REGION_SIZE, AllocFlags::Blocking).unwrap();
        assert_eq!(allocator.pages_held(), 1);
        allocator.free(handle).unwrap();
    }

    #[test]
    fn test_full_page_spills_to_new_page() {
        let allocator = allocator();
        let a = allocator.alloc(MAX_REGION_SIZE, AllocFlags::Blocking).unwrap();
        let b = allocator.alloc(1, AllocFlags::Blocking).unwrap();
        assert_ne!(a.slot(), b.slot());
        assert_eq!(allocator.pages_held(), 2);
    }

    #[test]
    fn test_free_releases_empty_page() {
        let allocator = allocator();
        let a = allocator.alloc(10, AllocFlags::Blocking).unwrap();
        let b = allocator.alloc(10, AllocFlags::Blocking).unwrap();

        allocator.free(a).unwrap();
        assert_eq!(allocator.pages_held(), 1);

        allocator.free(b).unwrap();
        assert_eq!(allocator.pages_held(), 0);
        assert_eq!(allocator.pages_in_use(), 0);
    }

    #[test]
    fn test_double_free_rejected() {
        let allocator = allocator();
        let a = allocator.alloc(10, AllocFlags::Blocking).unwrap();
        let _keep = allocator.alloc(10, AllocFlags::Blocking).unwrap();

        allocator.free(a).unwrap();
        assert!(matches!(
            allocator.free(a),
            Err(Error::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_sentinel_handle_rejected() {
        let allocator = allocator();
        let a = allocator.alloc(10, AllocFlags::Blocking).unwrap();
        let head = RegionHandle::new(a.slot(), REGION_HEADER_SIZE);
        assert!(allocator.free(head).is_err());
        let bogus = RegionHandle::new(PageSlot::new(9), 32);
        assert!(allocator.free(bogus).is_err());
    }

    #[test]
    fn test_freed_gap_is_reused_first_fit() {
        let allocator = allocator();
        let a = allocator.alloc(64, AllocFlags::Blocking).unwrap();
        let b = allocator.alloc(64, AllocFlags::Blocking).unwrap();
        let c = allocator.alloc(64, AllocFlags::Blocking).unwrap();

        allocator.free(b).unwrap();

        // the span b occupied is the first gap that fits
        let d = allocator.alloc(64, AllocFlags::Blocking).unwrap();
        assert_eq!(d.offset(), b.offset());

        // live regions never move, so a larger request goes after c
        allocator.free(d).unwrap();
        let e = allocator.alloc(100, AllocFlags::Blocking).unwrap();
        assert!(e.offset() > c.offset());
        assert!(a.offset() < b.offset());
        assert_ordered(&allocator);
    }

    #[test]
    fn test_region_memory_is_zeroed_on_free() {
        let allocator = allocator();
        let keep = allocator.alloc(8, AllocFlags::Blocking).unwrap();
        let a = allocator.alloc(8, AllocFlags::Blocking).unwrap();
        allocator
            .with_region_mut(a, |bytes| bytes.fill(0xEE))
            .unwrap();
        allocator.free(a).unwrap();

        let b = allocator.alloc(8, AllocFlags::Blocking).unwrap();
        assert_eq!(b, a);
        let contents = allocator.with_region(b, |bytes| bytes.to_vec()).unwrap();
        assert_eq!(contents, vec![0u8; 8]);
        allocator.free(keep).unwrap();
    }

    #[test]
    fn test_page_limit_exhaustion() {
        let allocator = PageAllocator::with_system_pages(Some(1));
        let _a = allocator.alloc(MAX_REGION_SIZE, AllocFlags::Blocking).unwrap();

        let result = allocator.alloc(1, AllocFlags::Atomic);
        assert!(matches!(result, Err(Error::AllocationExhausted { .. })));
        assert!(allocator.acquire_page(AllocFlags::Atomic).is_err());
        assert_eq!(allocator.stats().snapshot().failed_allocations, 2);
    }

    #[test]
    fn test_whole_pages_are_counted() {
        let allocator = allocator();
        let page = allocator.acquire_page(AllocFlags::Blocking).unwrap();
        assert_eq!(allocator.pages_in_use(), 1);
        assert_eq!(allocator.pages_held(), 0);

        allocator.release_page(page);
        assert_eq!(allocator.pages_in_use(), 0);
    }

    #[test]
    fn test_alloc_from_interrupt_context() {
        let allocator = Arc::new(allocator());
        let allocator_clone = Arc::clone(&allocator);
        let handler: irq::IrqHandler = Arc::new(move || {
            let handle = allocator_clone.alloc(16, AllocFlags::Atomic).unwrap();
            allocator_clone.free(handle).unwrap();
        });

        assert!(irq::raise(&handler));
        assert_eq!(allocator.pages_held(), 0);
        assert_eq!(allocator.stats().snapshot().allocations, 1);
    }

    #[test]
    fn test_concurrent_alloc_free() {
        use std::thread;

        let allocator = Arc::new(allocator());
        let mut handles = vec![];

        for t in 0..8 {
            let allocator = Arc::clone(&allocator);
            handles.push(thread::spawn(move || {
                for i in 0..200 {
                    let size = (t * 31 + i * 7) % 300;
                    let handle = allocator.alloc(size, AllocFlags::Blocking).unwrap();
                    allocator
                        .with_region_mut(handle, |bytes| bytes.fill(t as u8))
                        .unwrap();
                    let intact = allocator
                        .with_region(handle, |bytes| bytes.iter().all(|&b| b == t as u8))
                        .unwrap();
                    assert!(intact);
                    allocator.free(handle).unwrap();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(allocator.pages_held(), 0);
        assert_eq!(allocator.stats().snapshot().live_regions(), 0);
    }
}
