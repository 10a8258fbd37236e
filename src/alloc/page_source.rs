//! Where pages come from.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::page::Page;

/// The operating environment's supply of zeroed pages.
///
/// Implementations must be callable from any context and must never block.
pub trait PageSource: Send + Sync {
    /// Hand out a zeroed page, or `None` under memory pressure.
    fn get_zeroed_page(&self) -> Option<Box<Page>>;

    /// Return a page obtained from [`get_zeroed_page`](Self::get_zeroed_page).
    fn free_page(&self, page: Box<Page>);

    /// Number of pages currently handed out.
    fn pages_in_use(&self) -> usize;
}

/// Heap-backed page source with an optional page limit.
///
/// The limit models memory pressure: once `limit` pages are in use,
/// [`get_zeroed_page`](PageSource::get_zeroed_page) returns `None`.
///
/// # Example
/// ```
/// use nibblecap::alloc::{PageSource, SystemPageSource};
///
/// let source = SystemPageSource::with_limit(1);
/// let page = source.get_zeroed_page().unwrap();
/// assert!(source.get_zeroed_page().is_none());
/// source.free_page(page);
/// assert_eq!(source.pages_in_use(), 0);
/// ```
#[derive(Debug, Default)]
pub struct SystemPageSource {
    limit: Option<usize>,
    in_use: AtomicUsize,
}

impl SystemPageSource {
    /// Unlimited source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Source that hands out at most `limit` pages at a time.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            in_use: AtomicUsize::new(0),
        }
    }

    /// Construct from an optional limit.
    pub fn from_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            in_use: AtomicUsize::new(0),
        }
    }
}

impl PageSource for SystemPageSource {
    fn get_zeroed_page(&self) -> Option<Box<Page>> {
        let limit = self.limit.unwrap_or(usize::MAX);
        let reserved = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            });

        match reserved {
            Ok(_) => Some(Page::boxed()),
            Err(n) => {
                log::warn!("page source exhausted ({} of {} pages in use)", n, limit);
                None
            }
        }
    }

    fn free_page(&self, page: Box<Page>) {
        drop(page);
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }

    fn pages_in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }
}
