//! Single-owner admission and blocking reads.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::buffer::{DataState, RecordFramer, UserSliceMut};
use crate::common::{Error, Pid, Result};
use crate::sync::{IrqLock, Task, WaitQueue};

/// Record framer shared between deferred and process context.
pub type SharedFramer = Arc<IrqLock<RecordFramer>>;

/// Who holds the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Free,
    Owned(Pid),
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Free => write!(f, "Free"),
            GateState::Owned(pid) => write!(f, "Owned({})", pid),
        }
    }
}

/// Admission control and read coordination for consumers.
///
/// At most one task owns the gate. [`open`](Self::open) blocks until the
/// gate is free; [`release`](Self::release) frees it and wakes exactly one
/// blocked opener. [`read`](Self::read) blocks while the oldest record is
/// open and empty, and is woken by the migration worker once per batch.
///
/// Every wait is unbounded and ends early only on a signal, which yields
/// `Error::Interrupted` with nothing changed.
///
/// # Architecture
/// ```text
///   open ──► openers  (WaitQueue) ◄── release
///   read ──► read slot (WaitQueue) ──► readers (WaitQueue) ◄── migration
///                        │
///                        ▼
///                 RecordFramer (IrqLock)
/// ```
pub struct AccessGate {
    state: IrqLock<GateState>,
    openers: WaitQueue,
    readers: WaitQueue,
    waiting_for_read: AtomicBool,
    read_slot: WaitQueue,
    read_busy: AtomicBool,
    framer: SharedFramer,
}

impl AccessGate {
    /// A free gate in front of `framer`.
    pub fn new(framer: SharedFramer) -> Self {
        Self {
            state: IrqLock::new("gate", GateState::Free),
            openers: WaitQueue::new("openers"),
            readers: WaitQueue::new("readers"),
            waiting_for_read: AtomicBool::new(false),
            read_slot: WaitQueue::new("read_slot"),
            read_busy: AtomicBool::new(false),
            framer,
        }
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Take ownership for `task`, blocking while another task owns the gate.
    ///
    /// # Errors
    /// - `Error::Interrupted` if `task` is signalled while blocked; the gate
    ///   is left as it was
    pub fn open(&self, task: &Task) -> Result<()> {
        let pid = task.pid();
        log::debug!("{} opening the device", pid);

        self.openers.wait_event_interruptible(task, || {
            let mut state = self.state.lock();
            match *state {
                GateState::Free => {
                    *state = GateState::Owned(pid);
                    true
                }
                GateState::Owned(_) => false,
            }
        })?;

        log::debug!("{} owns the device", pid);
        Ok(())
    }

    /// Give up ownership and wake one blocked opener.
    ///
    /// # Errors
    /// - `Error::NotOwner` if `task` does not own the gate
    pub fn release(&self, task: &Task) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != GateState::Owned(task.pid()) {
                return Err(Error::NotOwner { pid: task.pid() });
            }
            *state = GateState::Free;
        }

        log::debug!("{} released the device", task.pid());
        self.openers.wake_one();
        Ok(())
    }

    /// Current owner state.
    pub fn state(&self) -> GateState {
        *self.state.lock()
    }

    /// Fail with `Error::NotOwner` unless `task` owns the gate.
    pub fn check_owner(&self, task: &Task) -> Result<()> {
        match *self.state.lock() {
            GateState::Owned(pid) if pid == task.pid() => Ok(()),
            _ => Err(Error::NotOwner { pid: task.pid() }),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read up to `max` bytes of the oldest record into `dst`.
    ///
    /// Blocks while the oldest record is open and nothing of it is buffered.
    /// Returns `Ok(0)` once the record is terminated and fully read; the
    /// consumer then acknowledges it with [`RecordFramer::end_phase`].
    /// Concurrent readers are served one at a time.
    ///
    /// # Errors
    /// - `Error::NotOwner` if `task` does not own the gate
    /// - `Error::Interrupted` if `task` is signalled while blocked; nothing
    ///   was transferred
    /// - `Error::BoundaryCopyFault` if `dst` faults part-way
    pub fn read<D>(&self, task: &Task, dst: &mut D, max: usize) -> Result<usize>
    where
        D: UserSliceMut + ?Sized,
    {
        self.check_owner(task)?;

        let _slot = self.acquire_read_slot(task)?;

        let max = max.min(dst.len());
        if max == 0 {
            return Ok(0);
        }

        loop {
            let mut framer = self.framer.lock();
            match framer.contains_data() {
                DataState::NoMoreData => return Ok(0),
                DataState::Available(n) => {
                    log::debug!("{} reading up to {} of {} bytes", task.pid(), max, n);
                    return framer.read_to_user(dst, max);
                }
                DataState::Empty => {
                    self.waiting_for_read.store(true, Ordering::SeqCst);
                    drop(framer);

                    self.readers.wait_event_interruptible(task, || {
                        !self.waiting_for_read.load(Ordering::SeqCst)
                    })?;
                }
            }
        }
    }

    /// Acknowledge the oldest record if it is terminated and fully read.
    pub fn end_phase(&self) -> bool {
        self.framer.lock().end_phase()
    }

    /// Clear the reader-waiting flag. Call with the framer lock held, after
    /// new data went in.
    pub(crate) fn mark_data_ready(&self) {
        self.waiting_for_read.store(false, Ordering::SeqCst);
    }

    /// Wake one blocked reader. Call after dropping the framer lock.
    pub(crate) fn wake_reader(&self) {
        self.readers.wake_one();
    }

    /// Whether a reader found nothing and is (or is about to be) blocked.
    pub fn reader_waiting(&self) -> bool {
        self.waiting_for_read.load(Ordering::SeqCst)
    }

    /// The queue of blocked openers.
    pub fn openers(&self) -> &WaitQueue {
        &self.openers
    }

    /// The queue of blocked readers.
    pub fn readers(&self) -> &WaitQueue {
        &self.readers
    }

    fn acquire_read_slot(&self, task: &Task) -> Result<ReadSlot<'_>> {
        self.read_slot.wait_event_interruptible(task, || {
            self.read_busy
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        })?;
        Ok(ReadSlot { gate: self })
    }
}

impl fmt::Debug for AccessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGate")
            .field("state", &self.state())
            .field("openers", &self.openers.waiters())
            .field("readers", &self.readers.waiters())
            .finish()
    }
}

/// Holds the single read slot; frees it and wakes the next reader on drop.
struct ReadSlot<'a> {
    gate: &'a AccessGate,
}

impl Drop for ReadSlot<'_> {
    fn drop(&mut self) {
        self.gate.read_busy.store(false, Ordering::Release);
        self.gate.read_slot.wake_one();
    }
}
