//! Allocator statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics tracked by the page allocator.
///
/// All fields are atomic and updated with `Ordering::Relaxed`: counters are
/// independent and only need atomicity.
#[derive(Debug, Default)]
pub struct AllocatorStats {
    /// Pages obtained from the page source.
    pub pages_acquired: AtomicU64,

    /// Pages returned to the page source.
    pub pages_released: AtomicU64,

    /// Successful region allocations.
    pub allocations: AtomicU64,

    /// Regions freed.
    pub frees: AtomicU64,

    /// Allocation requests that failed.
    pub failed_allocations: AtomicU64,
}

impl AllocatorStats {
    /// Create a new stats tracker with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> AllocatorSnapshot {
        AllocatorSnapshot {
            pages_acquired: self.pages_acquired.load(Ordering::Relaxed),
            pages_released: self.pages_released.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            frees: self.frees.load(Ordering::Relaxed),
            failed_allocations: self.failed_allocations.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.pages_acquired.store(0, Ordering::Relaxed);
        self.pages_released.store(0, Ordering::Relaxed);
        self.allocations.store(0, Ordering::Relaxed);
        self.frees.store(0, Ordering::Relaxed);
        self.failed_allocations.store(0, Ordering::Relaxed);
    }
}

/// A point-in-time snapshot of allocator statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorSnapshot {
    pub pages_acquired: u64,
    pub pages_released: u64,
    pub allocations: u64,
    pub frees: u64,
    pub failed_allocations: u64,
}

impl AllocatorSnapshot {
    /// Pages currently held (acquired and not yet released).
    pub fn pages_outstanding(&self) -> u64 {
        self.pages_acquired - self.pages_released
    }

    /// Regions currently live.
    pub fn live_regions(&self) -> u64 {
        self.allocations - self.frees
    }
}

impl fmt::Display for AllocatorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Alloc {{ pages: {}, live: {}, allocs: {}, frees: {}, failed: {} }}",
            self.pages_outstanding(),
            self.live_regions(),
            self.allocations,
            self.frees,
            self.failed_allocations
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = AllocatorStats::new();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.allocations, 0);
        assert_eq!(snapshot.pages_outstanding(), 0);
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = AllocatorStats::new();
        stats.pages_acquired.fetch_add(3, Ordering::Relaxed);
        stats.pages_released.fetch_add(1, Ordering::Relaxed);
        stats.allocations.fetch_add(7, Ordering::Relaxed);
        stats.frees.fetch_add(4, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.pages_outstanding(), 2);
        assert_eq!(snapshot.live_regions(), 3);
    }

    #[test]
    fn test_stats_reset() {
        let stats = AllocatorStats::new();
        stats.allocations.fetch_add(100, Ordering::Relaxed);
        stats.reset();
        assert_eq!(stats.snapshot().allocations, 0);
    }

    #[test]
    fn test_stats_display() {
        let stats = AllocatorStats::new();
        stats.pages_acquired.fetch_add(2, Ordering::Relaxed);
        stats.allocations.fetch_add(5, Ordering::Relaxed);
        stats.frees.fetch_add(1, Ordering::Relaxed);
        stats.failed_allocations.fetch_add(1, Ordering::Relaxed);

        let display = format!("{}", stats.snapshot());
        assert!(display.contains("pages: 2"));
        assert!(display.contains("live: 4"));
        assert!(display.contains("failed: 1"));
    }
}
