//! Blocking waits for process context.
//!
//! A [`WaitQueue`] parks tasks until a condition becomes true. Waits are
//! exclusive: [`WaitQueue::wake_one`] wakes a single waiter, which re-checks
//! its condition and goes back to sleep if it lost the race. Waits have no
//! timeout and are cancelled only by a signal delivered to the task.
//!
//! Interrupt and deferred context never wait; they only wake.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::common::{Error, Result};

use super::irq;
use super::task::Task;

/// Shared state behind a queue, also referenced by parked tasks.
pub(crate) struct WaitShared {
    waiters: Mutex<usize>,
    cond: Condvar,
}

impl WaitShared {
    pub(crate) fn notify_all(&self) {
        let _waiters = self.waiters.lock();
        self.cond.notify_all();
    }
}

/// A queue of tasks waiting for a condition.
pub struct WaitQueue {
    name: &'static str,
    shared: Arc<WaitShared>,
    wakeups: AtomicU64,
}

impl WaitQueue {
    /// Create an empty queue.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            shared: Arc::new(WaitShared {
                waiters: Mutex::new(0),
                cond: Condvar::new(),
            }),
            wakeups: AtomicU64::new(0),
        }
    }

    /// Block `task` until `condition` returns true.
    ///
    /// The condition is evaluated with the queue lock held, so a waker that
    /// changes the state before calling [`wake_one`](Self::wake_one) can
    /// never be missed.
    ///
    /// # Errors
    /// - `Error::Interrupted` if a signal is pending for `task`. The condition
    ///   is not evaluated again and any wakeup is passed on to another waiter.
    ///
    /// # Panics
    /// Panics in debug builds if called from interrupt or deferred context.
    pub fn wait_event_interruptible<F>(&self, task: &Task, mut condition: F) -> Result<()>
    where
        F: FnMut() -> bool,
    {
        debug_assert!(!irq::in_interrupt(), "sleeping in atomic context");

        let mut waiters = self.shared.waiters.lock();
        if condition() {
            return Ok(());
        }

        let _park = task.park_on(&self.shared);
        *waiters += 1;
        log::debug!("{} waiting on {}", task.pid(), self.name);

        let outcome = loop {
            if condition() {
                break Ok(());
            }
            if task.signal_pending() {
                break Err(Error::Interrupted);
            }
            self.shared.cond.wait(&mut waiters);
        };

        *waiters -= 1;

        if outcome.is_err() {
            log::debug!("{} interrupted while waiting on {}", task.pid(), self.name);
            // a wakeup meant for us may have been consumed
            self.shared.cond.notify_one();
        }

        outcome
    }

    /// Wake exactly one waiter.
    pub fn wake_one(&self) {
        let _waiters = self.shared.waiters.lock();
        self.wakeups.fetch_add(1, Ordering::Relaxed);
        self.shared.cond.notify_one();
    }

    /// Number of tasks currently parked.
    pub fn waiters(&self) -> usize {
        *self.shared.waiters.lock()
    }

    /// Number of `wake_one` calls so far.
    pub fn wakeups(&self) -> u64 {
        self.wakeups.load(Ordering::Relaxed)
    }

    /// Name used in log output.
    pub fn name(&self) -> &'static str {
        self.name
    }
}
