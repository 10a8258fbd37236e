//! Deferred-context migration from the ring into the record framer.

use std::sync::Arc;

use crate::capture::{CaptureStats, SharedRing};
use crate::device::{AccessGate, SharedFramer};

/// Moves everything buffered in the ring into the framer.
///
/// Runs as the body of the deferred work item. It reads the ring in
/// fixed-size chunks until a chunk comes back short, which also clears the
/// scheduled flag so the next interrupt can schedule it again. If any bytes
/// moved, one blocked reader is woken.
///
/// Lock order: framer, then ring. Both are taken with local interrupts
/// suppressed.
pub struct MigrationWorker {
    ring: SharedRing,
    framer: SharedFramer,
    gate: Arc<AccessGate>,
    stats: Arc<CaptureStats>,
    chunk: usize,
}

impl MigrationWorker {
    pub fn new(
        ring: SharedRing,
        framer: SharedFramer,
        gate: Arc<AccessGate>,
        stats: Arc<CaptureStats>,
        chunk: usize,
    ) -> Self {
        Self {
            ring,
            framer,
            gate,
            stats,
            chunk,
        }
    }

    /// Drain the ring. Returns the number of bytes moved.
    pub fn migrate(&self) -> usize {
        let mut buf = vec![0u8; self.chunk];
        let mut total = 0;

        let mut framer = self.framer.lock_irqsave();
        loop {
            let read = {
                let mut state = self.ring.lock_irqsave();
                let read = state.ring.read(&mut buf);
                if read < self.chunk {
                    state.migration_scheduled = false;
                }
                read
            };

            let written = framer.write(&buf[..read]);
            if written < read {
                log::warn!("framer dropped {} migrated bytes", read - written);
                CaptureStats::add(&self.stats.framer_dropped, read - written);
            }
            total += read;

            if read < self.chunk {
                break;
            }
        }

        if total > 0 {
            self.gate.mark_data_ready();
        }
        drop(framer);

        if total > 0 {
            CaptureStats::add(&self.stats.migrations, 1);
            CaptureStats::add(&self.stats.bytes_migrated, total);
            log::debug!("migrated {} bytes", total);
            self.gate.wake_reader();
        }

        total
    }
}

impl std::fmt::Debug for MigrationWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationWorker")
            .field("chunk", &self.chunk)
            .finish()
    }
}
