//! Capture pipeline counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated from interrupt, deferred and process context.
///
/// Relaxed atomics: each counter is independent.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub interrupts: AtomicU64,
    pub bytes_captured: AtomicU64,
    pub ring_dropped: AtomicU64,
    pub framer_dropped: AtomicU64,
    pub migrations: AtomicU64,
    pub bytes_migrated: AtomicU64,
    pub bytes_delivered: AtomicU64,
}

impl CaptureStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            interrupts: self.interrupts.load(Ordering::Relaxed),
            bytes_captured: self.bytes_captured.load(Ordering::Relaxed),
            ring_dropped: self.ring_dropped.load(Ordering::Relaxed),
            framer_dropped: self.framer_dropped.load(Ordering::Relaxed),
            migrations: self.migrations.load(Ordering::Relaxed),
            bytes_migrated: self.bytes_migrated.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`CaptureStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSnapshot {
    /// Interrupts serviced by the sample assembler.
    pub interrupts: u64,
    /// Bytes assembled from sample pairs.
    pub bytes_captured: u64,
    /// Bytes lost because the ring buffer was full.
    pub ring_dropped: u64,
    /// Bytes lost because the framer could not take them.
    pub framer_dropped: u64,
    /// Migration batches that moved at least one byte.
    pub migrations: u64,
    /// Bytes moved from the ring into the framer.
    pub bytes_migrated: u64,
    /// Bytes handed to consumers.
    pub bytes_delivered: u64,
}

impl CaptureSnapshot {
    /// Fraction of captured bytes lost anywhere in the pipeline (0.0 to 1.0).
    pub fn loss_rate(&self) -> f64 {
        if self.bytes_captured == 0 {
            0.0
        } else {
            (self.ring_dropped + self.framer_dropped) as f64 / self.bytes_captured as f64
        }
    }
}

impl fmt::Display for CaptureSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Capture {{ irqs: {}, captured: {}, migrated: {} in {} batches, delivered: {}, loss: {:.1}% }}",
            self.interrupts,
            self.bytes_captured,
            self.bytes_migrated,
            self.migrations,
            self.bytes_delivered,
            self.loss_rate() * 100.0
        )
    }
}
