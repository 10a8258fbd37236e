//! Mutual exclusion usable from interrupt context.

use std::ops::{Deref, DerefMut};

use parking_lot::{Mutex, MutexGuard};

use super::irq::{self, IrqFlags};

/// A lock with two acquire modes.
///
/// - [`IrqLock::lock`] - plain acquisition
/// - [`IrqLock::lock_irqsave`] - also suppress local interrupt delivery for
///   the critical section
///
/// Any lock that an interrupt handler takes must be acquired with
/// `lock_irqsave` from other contexts, otherwise the handler could fire on
/// the holder's own thread and spin on a lock that thread already owns.
///
/// # Example
/// ```
/// use nibblecap::sync::IrqLock;
///
/// let lock = IrqLock::new("counter", 0u32);
/// *lock.lock_irqsave() += 1;
/// assert_eq!(*lock.lock(), 1);
/// ```
pub struct IrqLock<T> {
    name: &'static str,
    inner: Mutex<T>,
}

impl<T> IrqLock<T> {
    /// Create a new lock.
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            inner: Mutex::new(value),
        }
    }

    /// Name used in log output.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire without touching local interrupt delivery.
    #[inline]
    pub fn lock(&self) -> IrqLockGuard<'_, T> {
        IrqLockGuard {
            guard: self.inner.lock(),
            _flags: None,
        }
    }

    /// Suppress local interrupts, then acquire.
    #[inline]
    pub fn lock_irqsave(&self) -> IrqLockGuard<'_, T> {
        let flags = irq::local_irq_save();
        IrqLockGuard {
            guard: self.inner.lock(),
            _flags: Some(flags),
        }
    }

    /// Pick the acquire mode from the calling context.
    ///
    /// Interrupt and deferred context use `lock_irqsave`, process context
    /// uses the plain mode.
    #[inline]
    pub fn lock_auto(&self) -> IrqLockGuard<'_, T> {
        if irq::in_interrupt() {
            self.lock_irqsave()
        } else {
            self.lock()
        }
    }

    /// Mutable access without locking; requires exclusive ownership.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }
}

/// RAII guard for [`IrqLock`].
///
/// The mutex is released before local interrupts are restored.
pub struct IrqLockGuard<'a, T> {
    // field order matters: the mutex guard drops first
    guard: MutexGuard<'a, T>,
    _flags: Option<IrqFlags>,
}

impl<T> Deref for IrqLockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqLockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
