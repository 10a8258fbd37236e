//! Consumer tasks and signal delivery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::Pid;

use super::wait_queue::WaitShared;

/// A consumer task: a pid plus a pending-signal flag.
///
/// A task blocked in a [`WaitQueue`](super::WaitQueue) records which queue
/// it is parked on, so that [`Task::send_signal`] can wake it.
///
/// # Example
/// ```
/// use nibblecap::{Pid, sync::Task};
///
/// let task = Task::new(Pid::new(7));
/// task.send_signal();
/// assert!(task.signal_pending());
/// assert!(task.clear_signal());
/// assert!(!task.signal_pending());
/// ```
pub struct Task {
    pid: Pid,
    signal: AtomicBool,
    parked: Mutex<Option<Arc<WaitShared>>>,
}

impl Task {
    /// Create a task with no pending signal.
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            signal: AtomicBool::new(false),
            parked: Mutex::new(None),
        }
    }

    /// The task's pid.
    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Mark a signal pending and kick the task out of any wait.
    pub fn send_signal(&self) {
        self.signal.store(true, Ordering::SeqCst);

        // clone out so the parked lock is never held while taking a queue lock
        let queue = self.parked.lock().clone();
        if let Some(queue) = queue {
            log::debug!("{} signalled while parked, waking its queue", self.pid);
            queue.notify_all();
        }
    }

    /// Whether a signal is pending.
    #[inline]
    pub fn signal_pending(&self) -> bool {
        self.signal.load(Ordering::SeqCst)
    }

    /// Consume the pending signal. Returns whether one was pending.
    pub fn clear_signal(&self) -> bool {
        self.signal.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn park_on(&self, queue: &Arc<WaitShared>) -> ParkGuard<'_> {
        *self.parked.lock() = Some(Arc::clone(queue));
        ParkGuard { task: self }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("pid", &self.pid)
            .field("signal_pending", &self.signal_pending())
            .finish()
    }
}

/// Clears the task's parked queue on drop.
pub(crate) struct ParkGuard<'a> {
    task: &'a Task,
}

impl Drop for ParkGuard<'_> {
    fn drop(&mut self) {
        *self.task.parked.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_new() {
        let task = Task::new(Pid::new(1));
        assert_eq!(task.pid(), Pid::new(1));
        assert!(!task.signal_pending());
        assert!(!task.clear_signal());
    }

    #[test]
    fn test_signal_without_wait() {
        let task = Task::new(Pid::new(2));
        task.send_signal();
        assert!(task.signal_pending());
        assert!(task.clear_signal());
        assert!(!task.signal_pending());
    }
}
