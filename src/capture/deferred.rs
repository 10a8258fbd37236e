//! Single-slot deferred work.
//!
//! Work scheduled from interrupt context runs later in
//! [`ExecContext::Deferred`], either on a dedicated worker thread or when
//! the owner calls [`DeferredWork::run_pending`]. The slot holds at most one
//! activation: scheduling while one is pending is a no-op, and an
//! activation never overlaps with itself.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};

use crate::common::Result;
use crate::sync::{irq, ExecContext};

/// The work body.
pub type WorkFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Default)]
struct SlotState {
    pending: bool,
    running: bool,
    shutdown: bool,
}

struct Slot {
    state: Mutex<SlotState>,
    cond: Condvar,
    runs: AtomicU64,
}

impl Slot {
    /// Block until there is work or the slot is shut down.
    ///
    /// Returns `false` on shutdown with nothing pending.
    fn wait_for_work(&self) -> bool {
        let mut state = self.state.lock();
        while !state.pending && !state.shutdown {
            self.cond.wait(&mut state);
        }
        if !state.pending {
            return false;
        }
        state.pending = false;
        state.running = true;
        true
    }

    fn try_take(&self) -> bool {
        let mut state = self.state.lock();
        if !state.pending || state.running {
            return false;
        }
        state.pending = false;
        state.running = true;
        true
    }

    fn run(&self, work: &WorkFn) {
        {
            let _ctx = irq::enter(ExecContext::Deferred);
            work();
        }
        self.runs.fetch_add(1, Ordering::Relaxed);

        let mut state = self.state.lock();
        state.running = false;
        self.cond.notify_all();
    }
}

/// A deferred work item with an idempotent schedule.
pub struct DeferredWork {
    name: &'static str,
    slot: Arc<Slot>,
    work: WorkFn,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeferredWork {
    /// Work that only runs through [`run_pending`](Self::run_pending).
    pub fn manual(name: &'static str, work: WorkFn) -> Self {
        Self {
            name,
            slot: Arc::new(Slot {
                state: Mutex::new(SlotState::default()),
                cond: Condvar::new(),
                runs: AtomicU64::new(0),
            }),
            work,
            worker: Mutex::new(None),
        }
    }

    /// Work drained by a dedicated thread named `name`.
    ///
    /// # Errors
    /// - `Error::Io` if the thread cannot be spawned
    pub fn spawn(name: &'static str, work: WorkFn) -> Result<Self> {
        let deferred = Self::manual(name, work);

        let slot = Arc::clone(&deferred.slot);
        let work = Arc::clone(&deferred.work);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while slot.wait_for_work() {
                    slot.run(&work);
                }
                log::debug!("deferred worker exiting");
            })?;

        *deferred.worker.lock() = Some(handle);
        log::debug!("deferred worker {} started", name);
        Ok(deferred)
    }

    /// Mark the work pending. Returns `false` if it already was.
    ///
    /// Never blocks beyond the slot's short critical section, so it is safe
    /// from interrupt context.
    pub fn schedule(&self) -> bool {
        let mut state = self.slot.state.lock();
        if state.shutdown {
            log::warn!("{} scheduled after shutdown", self.name);
            return false;
        }
        if state.pending {
            return false;
        }
        state.pending = true;
        self.slot.cond.notify_all();
        true
    }

    /// Run the pending activation on the calling thread, if any.
    ///
    /// Returns `false` if nothing was pending or an activation is already
    /// running elsewhere.
    pub fn run_pending(&self) -> bool {
        if !self.slot.try_take() {
            return false;
        }
        self.slot.run(&self.work);
        true
    }

    /// Whether an activation is pending.
    pub fn is_pending(&self) -> bool {
        self.slot.state.lock().pending
    }

    /// Block until nothing is pending or running.
    pub fn flush(&self) {
        if self.worker.lock().is_none() {
            self.run_pending();
            return;
        }

        let mut state = self.slot.state.lock();
        while state.pending || state.running {
            self.slot.cond.wait(&mut state);
        }
    }

    /// Completed activations.
    pub fn runs(&self) -> u64 {
        self.slot.runs.load(Ordering::Relaxed)
    }

    /// Refuse further scheduling and join the worker thread.
    ///
    /// A pending activation still runs before the worker exits.
    pub fn shutdown(&self) {
        {
            let mut state = self.slot.state.lock();
            state.shutdown = true;
            self.slot.cond.notify_all();
        }

        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => {
                if handle.join().is_err() {
                    log::error!("{} worker panicked", self.name);
                }
            }
            None => {
                self.run_pending();
            }
        }
    }
}

impl Drop for DeferredWork {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DeferredWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredWork")
            .field("name", &self.name)
            .field("state", &*self.slot.state.lock())
            .field("runs", &self.runs())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting() -> (Arc<AtomicUsize>, WorkFn) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let work: WorkFn = Arc::new(move || {
            assert_eq!(irq::current(), ExecContext::Deferred);
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (count, work)
    }

    #[test]
    fn test_schedule_is_idempotent() {
        let (count, work) = counting();
        let deferred = DeferredWork::manual("test", work);

        assert!(deferred.schedule());
        assert!(!deferred.schedule());
        assert!(deferred.is_pending());

        assert!(deferred.run_pending());
        assert!(!deferred.run_pending());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(deferred.runs(), 1);
    }

    #[test]
    fn test_worker_thread_runs_work() {
        let (count, work) = counting();
        let deferred = DeferredWork::spawn("test-worker", work).unwrap();

        deferred.schedule();
        deferred.flush();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        deferred.schedule();
        deferred.flush();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shutdown_runs_pending_then_refuses() {
        let (count, work) = counting();
        let deferred = DeferredWork::manual("test", work);

        deferred.schedule();
        deferred.shutdown();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!deferred.schedule());
    }

    #[test]
    fn test_context_restored_after_run() {
        let (_count, work) = counting();
        let deferred = DeferredWork::manual("test", work);
        deferred.schedule();
        deferred.run_pending();
        assert_eq!(irq::current(), ExecContext::Process);
    }
}
