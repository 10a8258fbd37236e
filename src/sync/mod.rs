//! Synchronization primitives for the three execution contexts.
//!
//! # Components
//! - [`irq`] - Per-thread execution context and local interrupt suppression
//! - [`IrqLock`] - Mutual exclusion with plain and interrupt-suppressing modes
//! - [`WaitQueue`] - Interruptible, exclusive blocking waits
//! - [`Task`] - A consumer with signal delivery

pub mod irq;
mod irq_lock;
mod task;
mod wait_queue;

pub use irq::{ExecContext, IrqHandler};
pub use irq_lock::{IrqLock, IrqLockGuard};
pub use task::Task;
pub use wait_queue::WaitQueue;
