//! The assembled capture pipeline.

use std::sync::Arc;

use crate::alloc::{AllocatorSnapshot, PageAllocator};
use crate::buffer::{DataState, RecordFramer, RingBuffer, UserSliceMut};
use crate::capture::{
    CaptureSnapshot, CaptureStats, DeferredWork, MigrationWorker, RingState, SampleAssembler,
    SampleSource, SharedRing, WorkFn,
};
use crate::common::{CaptureConfig, Error, Result};
use crate::device::{AccessGate, GateState, SharedFramer};
use crate::sync::{IrqHandler, IrqLock, Task};

/// Name of the deferred migration worker thread.
const MIGRATION_THREAD: &str = "capture-migrate";

/// One capture device: every piece of the pipeline plus its consumer API.
///
/// # Architecture
/// ```text
///  SampleSource ──irq──► SampleAssembler ──► RingBuffer (IrqLock)
///                              │ schedule          │
///                              ▼                   ▼
///                        DeferredWork ──► MigrationWorker
///                                                  │
///                                                  ▼
///  consumer ◄── AccessGate ◄── RecordFramer / StreamBuffer (IrqLock)
///
///  PageAllocator backs the ring, the stream pages and all bookkeeping.
/// ```
///
/// Start-up builds the allocator first and registers the interrupt handler
/// last. Teardown runs in reverse: the handler is detached, the deferred
/// worker is stopped, then the buffers go. Every buffer holds the allocator
/// through an `Arc`, so it is freed after all of them.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use nibblecap::{CaptureConfig, CaptureDevice, Pid};
/// use nibblecap::capture::ScriptedSource;
/// use nibblecap::sync::Task;
///
/// let source = Arc::new(ScriptedSource::new());
/// let config = CaptureConfig::default().with_migration_thread(false);
/// let device = CaptureDevice::start(config, source.clone()).unwrap();
///
/// source.emit_bytes(b"hi\0");
/// assert!(device.run_deferred());
///
/// let task = Task::new(Pid::new(1));
/// device.open(&task).unwrap();
/// let mut buf = [0u8; 8];
/// assert_eq!(device.read(&task, &mut buf[..], 8).unwrap(), 2);
/// assert_eq!(&buf[..2], b"hi");
/// device.release(&task).unwrap();
/// ```
pub struct CaptureDevice {
    config: CaptureConfig,
    source: Arc<dyn SampleSource>,
    migration: Arc<DeferredWork>,
    assembler: Arc<SampleAssembler>,
    gate: Arc<AccessGate>,
    ring: SharedRing,
    framer: SharedFramer,
    stats: Arc<CaptureStats>,
    allocator: Arc<PageAllocator>,
}

impl CaptureDevice {
    /// Build the pipeline and attach it to `source`.
    ///
    /// # Errors
    /// - `Error::InvalidConfig` if `config` does not validate
    /// - allocation errors if the ring or the first record cannot be allocated
    /// - `Error::Io` if the migration thread cannot be spawned
    /// - `Error::SourceRegistration` if `source` refuses the handler
    pub fn start(config: CaptureConfig, source: Arc<dyn SampleSource>) -> Result<Self> {
        config.validate()?;

        let allocator = Arc::new(PageAllocator::with_system_pages(config.page_limit));

        let ring: SharedRing = Arc::new(IrqLock::new(
            "ring",
            RingState::new(RingBuffer::new(&allocator, config.ring_capacity)?),
        ));
        let framer: SharedFramer = Arc::new(IrqLock::new(
            "framer",
            RecordFramer::new(Arc::clone(&allocator), config.delimiter)?,
        ));
        let gate = Arc::new(AccessGate::new(Arc::clone(&framer)));
        let stats = Arc::new(CaptureStats::new());

        let worker = MigrationWorker::new(
            Arc::clone(&ring),
            Arc::clone(&framer),
            Arc::clone(&gate),
            Arc::clone(&stats),
            config.migration_chunk,
        );
        let work: WorkFn = Arc::new(move || {
            worker.migrate();
        });
        let migration = Arc::new(if config.spawn_migration_thread {
            DeferredWork::spawn(MIGRATION_THREAD, work)?
        } else {
            DeferredWork::manual(MIGRATION_THREAD, work)
        });

        let assembler = Arc::new(SampleAssembler::new(
            Arc::clone(&source),
            Arc::clone(&ring),
            Arc::clone(&migration),
            Arc::clone(&stats),
            config.effective_high_water_mark(),
            config.delimiter,
        ));

        let irq_assembler = Arc::clone(&assembler);
        let handler: IrqHandler = Arc::new(move || irq_assembler.on_interrupt());
        source.register_handler(handler)?;

        log::info!(
            "capture device started (ring {} bytes, high-water mark {}, delimiter {:#04x})",
            config.ring_capacity,
            config.effective_high_water_mark(),
            config.delimiter
        );

        Ok(Self {
            config,
            source,
            migration,
            assembler,
            gate,
            ring,
            framer,
            stats,
            allocator,
        })
    }

    // ========================================================================
    // Consumer API
    // ========================================================================

    /// Take exclusive ownership, blocking while another task holds it.
    ///
    /// # Errors
    /// - `Error::Interrupted` if `task` is signalled while blocked
    pub fn open(&self, task: &Task) -> Result<()> {
        self.gate.open(task)
    }

    /// Give up ownership.
    ///
    /// A record that was read to its end is acknowledged first, so the next
    /// owner starts at the following record.
    ///
    /// # Errors
    /// - `Error::NotOwner` if `task` does not own the device
    pub fn release(&self, task: &Task) -> Result<()> {
        self.gate.check_owner(task)?;
        if self.gate.end_phase() {
            log::debug!("{} finished a record on release", task.pid());
        }
        self.gate.release(task)
    }

    /// Read up to `max` bytes of the current record into `dst`.
    ///
    /// Blocks while no data is buffered for the current record. Returns
    /// `Ok(0)` at the end of a record.
    ///
    /// # Errors
    /// - `Error::NotOwner` if `task` does not own the device
    /// - `Error::Interrupted` if `task` is signalled while blocked
    /// - `Error::BoundaryCopyFault` if `dst` faults part-way
    pub fn read<D>(&self, task: &Task, dst: &mut D, max: usize) -> Result<usize>
    where
        D: UserSliceMut + ?Sized,
    {
        match self.gate.read(task, dst, max) {
            Ok(n) => {
                CaptureStats::add(&self.stats.bytes_delivered, n);
                Ok(n)
            }
            Err(Error::BoundaryCopyFault { transferred }) => {
                CaptureStats::add(&self.stats.bytes_delivered, transferred);
                Err(Error::BoundaryCopyFault { transferred })
            }
            Err(e) => Err(e),
        }
    }

    /// Acknowledge the current record once it has been read to its end.
    ///
    /// Returns whether a record was acknowledged.
    ///
    /// # Errors
    /// - `Error::NotOwner` if `task` does not own the device
    pub fn end_record(&self, task: &Task) -> Result<bool> {
        self.gate.check_owner(task)?;
        Ok(self.gate.end_phase())
    }

    // ========================================================================
    // Introspection and control
    // ========================================================================

    /// Run a pending migration on the calling thread.
    ///
    /// Returns whether one ran. With the migration thread enabled this
    /// instead waits for the worker to go idle and returns `false`.
    pub fn run_deferred(&self) -> bool {
        if self.config.spawn_migration_thread {
            self.migration.flush();
            false
        } else {
            self.migration.run_pending()
        }
    }

    /// Classification of the current record.
    pub fn data_state(&self) -> DataState {
        self.framer.lock().contains_data()
    }

    /// Bytes waiting in the ring buffer.
    pub fn ring_size(&self) -> usize {
        self.ring.lock_irqsave().ring.size()
    }

    /// Current owner state.
    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn allocator(&self) -> &Arc<PageAllocator> {
        &self.allocator
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Samples delivered by the source so far.
    pub fn samples(&self) -> usize {
        self.assembler.samples()
    }

    pub fn stats(&self) -> CaptureSnapshot {
        self.stats.snapshot()
    }

    pub fn allocator_stats(&self) -> AllocatorSnapshot {
        self.allocator.stats().snapshot()
    }

    /// Detach from the source and stop the migration worker.
    ///
    /// Also runs on drop.
    pub fn shutdown(&self) {
        self.source.unregister_handler();
        self.migration.shutdown();
    }
}

impl Drop for CaptureDevice {
    fn drop(&mut self) {
        self.shutdown();
        log::info!("capture device stopped: {}", self.stats.snapshot());
    }
}

impl std::fmt::Debug for CaptureDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureDevice")
            .field("gate", &self.gate)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
