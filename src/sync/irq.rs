//! Execution-context tracking and local interrupt suppression.
//!
//! The pipeline runs code in three contexts:
//! - [`ExecContext::Interrupt`] - the sample handler; must never block
//! - [`ExecContext::Deferred`] - the migration worker; never blocks on consumers
//! - [`ExecContext::Process`] - consumer calls; may block indefinitely
//!
//! Contexts are tracked per thread. A thread that holds an [`IrqFlags`]
//! guard has local interrupts suppressed: an interrupt raised on that thread
//! is latched and delivered once the outermost guard is dropped.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::Arc;

/// Handler invoked when the interrupt line fires.
pub type IrqHandler = Arc<dyn Fn() + Send + Sync>;

/// The context the current thread is executing in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecContext {
    /// Ordinary consumer context; blocking is allowed.
    Process,
    /// Deferred work scheduled from an interrupt.
    Deferred,
    /// Hardware interrupt handler.
    Interrupt,
}

thread_local! {
    static CONTEXT: Cell<ExecContext> = const { Cell::new(ExecContext::Process) };
    static IRQ_DISABLE_DEPTH: Cell<usize> = const { Cell::new(0) };
    static LATCHED: RefCell<Vec<IrqHandler>> = const { RefCell::new(Vec::new()) };
}

/// Context of the calling thread.
#[inline]
pub fn current() -> ExecContext {
    CONTEXT.with(Cell::get)
}

/// True in interrupt and deferred context, where sleeping is forbidden.
#[inline]
pub fn in_interrupt() -> bool {
    current() != ExecContext::Process
}

/// True only inside a hardware interrupt handler.
#[inline]
pub fn in_hardirq() -> bool {
    current() == ExecContext::Interrupt
}

/// Whether local interrupt delivery is currently suppressed on this thread.
#[inline]
pub fn irqs_disabled() -> bool {
    IRQ_DISABLE_DEPTH.with(Cell::get) > 0
}

/// Restores the previous execution context when dropped.
#[must_use = "the context is left as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: ExecContext,
    _not_send: PhantomData<*const ()>,
}

/// Switch the calling thread into `ctx` until the guard drops.
pub fn enter(ctx: ExecContext) -> ContextGuard {
    let previous = CONTEXT.with(|c| c.replace(ctx));
    ContextGuard {
        previous,
        _not_send: PhantomData,
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CONTEXT.with(|c| c.set(self.previous));
    }
}

/// Local interrupt suppression, released on drop.
///
/// Guards nest; delivery resumes when the outermost one drops, at which
/// point latched interrupts run in arrival order.
#[must_use = "interrupts are re-enabled as soon as the guard is dropped"]
pub struct IrqFlags {
    _not_send: PhantomData<*const ()>,
}

/// Suppress local interrupt delivery on the calling thread.
pub fn local_irq_save() -> IrqFlags {
    IRQ_DISABLE_DEPTH.with(|d| d.set(d.get() + 1));
    IrqFlags {
        _not_send: PhantomData,
    }
}

impl Drop for IrqFlags {
    fn drop(&mut self) {
        let depth = IRQ_DISABLE_DEPTH.with(|d| {
            let depth = d.get() - 1;
            d.set(depth);
            depth
        });

        if depth == 0 {
            let latched = LATCHED.with(|l| std::mem::take(&mut *l.borrow_mut()));
            for handler in latched {
                raise(&handler);
            }
        }
    }
}

/// Deliver an interrupt to `handler` on the calling thread.
///
/// Returns `true` if the handler ran now, `false` if it was latched because
/// local interrupts are suppressed. The handler runs in
/// [`ExecContext::Interrupt`] with local interrupts suppressed.
pub fn raise(handler: &IrqHandler) -> bool {
    if irqs_disabled() {
        log::trace!("interrupt latched while local delivery is suppressed");
        LATCHED.with(|l| l.borrow_mut().push(Arc::clone(handler)));
        return false;
    }

    let _ctx = enter(ExecContext::Interrupt);
    let _flags = local_irq_save();
    handler();
    true
}
