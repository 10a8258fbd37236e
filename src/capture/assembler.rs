//! Interrupt-side byte assembly.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::buffer::RingBuffer;
use crate::capture::{CaptureStats, DeferredWork, SampleSource};
use crate::sync::{irq, IrqLock};

/// The ring buffer plus the migration-scheduled flag it guards.
#[derive(Debug)]
pub struct RingState {
    pub ring: RingBuffer,
    /// Set by the assembler when it schedules a migration, cleared by the
    /// migration once it has drained the ring.
    pub migration_scheduled: bool,
}

impl RingState {
    pub fn new(ring: RingBuffer) -> Self {
        Self {
            ring,
            migration_scheduled: false,
        }
    }
}

/// Ring state shared between interrupt and deferred context.
pub type SharedRing = Arc<IrqLock<RingState>>;

/// Turns pairs of 4-bit samples into bytes, in interrupt context.
///
/// Even-numbered interrupts latch the high nibble; odd-numbered ones
/// combine it with the low nibble and push the byte into the ring. A
/// migration is scheduled when the ring rises above the high-water mark or
/// the byte is the delimiter, unless one is already scheduled.
pub struct SampleAssembler {
    source: Arc<dyn SampleSource>,
    ring: SharedRing,
    migration: Arc<DeferredWork>,
    stats: Arc<CaptureStats>,
    high_water_mark: usize,
    delimiter: u8,
    counter: AtomicUsize,
    high_nibble: AtomicU8,
}

impl SampleAssembler {
    pub fn new(
        source: Arc<dyn SampleSource>,
        ring: SharedRing,
        migration: Arc<DeferredWork>,
        stats: Arc<CaptureStats>,
        high_water_mark: usize,
        delimiter: u8,
    ) -> Self {
        Self {
            source,
            ring,
            migration,
            stats,
            high_water_mark,
            delimiter,
            counter: AtomicUsize::new(0),
            high_nibble: AtomicU8::new(0),
        }
    }

    /// The interrupt handler body. Never blocks.
    pub fn on_interrupt(&self) {
        debug_assert!(irq::in_hardirq(), "sample handler outside interrupt context");

        let sample = self.source.read_sample() & 0x0F;
        let n = self.counter.fetch_add(1, Ordering::AcqRel);
        CaptureStats::add(&self.stats.interrupts, 1);

        if n % 2 == 0 {
            self.high_nibble.store(sample, Ordering::Release);
            return;
        }

        let byte = (self.high_nibble.load(Ordering::Acquire) << 4) | sample;
        log::trace!("assembled byte {:#04x}", byte);

        let schedule = {
            let mut state = self.ring.lock_irqsave();
            let stored = state.ring.write(&[byte]);
            CaptureStats::add(&self.stats.bytes_captured, 1);
            CaptureStats::add(&self.stats.ring_dropped, 1 - stored);

            let wanted = state.ring.size() > self.high_water_mark || byte == self.delimiter;
            if wanted && !state.migration_scheduled {
                state.migration_scheduled = true;
                true
            } else {
                false
            }
        };

        if schedule {
            log::trace!("scheduling migration");
            self.migration.schedule();
        }
    }

    /// Samples seen so far.
    pub fn samples(&self) -> usize {
        self.counter.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for SampleAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleAssembler")
            .field("samples", &self.samples())
            .field("high_water_mark", &self.high_water_mark)
            .field("delimiter", &self.delimiter)
            .finish()
    }
}
