//! Page-backed memory allocation.
//!
//! # Components
//! - [`Page`] - A 4KB aligned page of memory
//! - [`RegionHeader`] - Bookkeeping embedded in front of each region
//! - [`PageSource`] - Where whole pages come from
//! - [`PageAllocator`] - First-fit regions inside pages
//! - [`Allocation`] - RAII ownership of a region
//! - [`AllocatorStats`] - Counters

mod allocation;
mod page;
mod page_allocator;
mod page_source;
mod region_header;
mod stats;

pub use allocation::Allocation;
pub use page::Page;
pub use page_allocator::{AllocFlags, AllocatedRegion, PageAllocator};
pub use page_source::{PageSource, SystemPageSource};
pub use region_header::{RegionHeader, RegionKind};
pub use stats::{AllocatorSnapshot, AllocatorStats};
