//! Boundary with the hardware that delivers samples.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{Error, Result};
use crate::sync::{irq, IrqHandler};

/// A source of 4-bit samples that signals each one with an interrupt.
///
/// The handler registered here is invoked in interrupt context for every
/// sample and calls [`read_sample`](Self::read_sample) to fetch it. For
/// each byte the high nibble arrives first.
pub trait SampleSource: Send + Sync {
    /// Attach the interrupt handler.
    ///
    /// # Errors
    /// - `Error::SourceRegistration` if the hardware refuses
    fn register_handler(&self, handler: IrqHandler) -> Result<()>;

    /// Detach the interrupt handler. No interrupt fires afterwards.
    fn unregister_handler(&self);

    /// The sample latched for the current interrupt, in the low 4 bits.
    fn read_sample(&self) -> u8;
}

/// A sample source driven by the caller.
///
/// [`emit`](Self::emit) latches a nibble and raises the interrupt on the
/// calling thread, so a test can play a sample sequence deterministically.
/// Each raised interrupt carries its own nibble, so samples emitted while
/// delivery is suppressed are read back in order once it resumes.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU8, Ordering};
/// use nibblecap::capture::{SampleSource, ScriptedSource};
///
/// let source = Arc::new(ScriptedSource::new());
/// let seen = Arc::new(AtomicU8::new(0));
///
/// let (src, out) = (Arc::clone(&source), Arc::clone(&seen));
/// source
///     .register_handler(Arc::new(move || out.store(src.read_sample(), Ordering::SeqCst)))
///     .unwrap();
///
/// assert!(source.emit(0xB));
/// assert_eq!(seen.load(Ordering::SeqCst), 0xB);
/// source.unregister_handler();
/// ```
#[derive(Default)]
pub struct ScriptedSource {
    handler: Mutex<Option<IrqHandler>>,
    latched: Arc<AtomicU8>,
    refuse: AtomicBool,
}

impl ScriptedSource {
    /// A source with no handler attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// A source whose handler registration always fails.
    pub fn refusing() -> Self {
        let source = Self::default();
        source.refuse.store(true, Ordering::SeqCst);
        source
    }

    /// Latch `nibble` and raise the interrupt.
    ///
    /// Returns `true` if a handler was attached and ran immediately. If the
    /// calling thread has local interrupts suppressed the interrupt is
    /// latched with its nibble and runs when they are restored.
    pub fn emit(&self, nibble: u8) -> bool {
        let nibble = nibble & 0x0F;
        self.latched.store(nibble, Ordering::SeqCst);

        // clone out so a handler may re-enter the source
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => {
                let latched = Arc::clone(&self.latched);
                let delivery: IrqHandler = Arc::new(move || {
                    latched.store(nibble, Ordering::SeqCst);
                    handler();
                });
                irq::raise(&delivery)
            }
            None => {
                log::trace!("sample {:#x} dropped, no handler attached", nibble);
                false
            }
        }
    }

    /// Emit `byte` as two samples, high nibble first.
    pub fn emit_byte(&self, byte: u8) {
        self.emit(byte >> 4);
        self.emit(byte & 0x0F);
    }

    /// Emit every byte of `bytes`.
    pub fn emit_bytes(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.emit_byte(byte);
        }
    }

    /// Whether a handler is attached.
    pub fn is_registered(&self) -> bool {
        self.handler.lock().is_some()
    }
}

impl SampleSource for ScriptedSource {
    fn register_handler(&self, handler: IrqHandler) -> Result<()> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::SourceRegistration(
                "interrupt line unavailable".to_string(),
            ));
        }

        let mut slot = self.handler.lock();
        if slot.is_some() {
            return Err(Error::SourceRegistration(
                "a handler is already attached".to_string(),
            ));
        }
        *slot = Some(handler);
        Ok(())
    }

    fn unregister_handler(&self) {
        self.handler.lock().take();
    }

    fn read_sample(&self) -> u8 {
        self.latched.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ScriptedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedSource")
            .field("registered", &self.is_registered())
            .field("latched", &self.latched.load(Ordering::SeqCst))
            .finish()
    }
}
