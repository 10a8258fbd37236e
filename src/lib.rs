//! nibblecap - Interrupt-driven capture of 4-bit samples into framed records.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          nibblecap                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Device Layer (device/)                      │   │
//! │  │      CaptureDevice + AccessGate (open/read/release)      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↑                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Capture Layer (capture/)                    │   │
//! │  │   SampleSource → SampleAssembler  [interrupt context]    │   │
//! │  │   DeferredWork → MigrationWorker  [deferred context]     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↕                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Buffer Layer (buffer/)                      │   │
//! │  │     RingBuffer → RecordFramer → StreamBuffer             │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Allocation Layer (alloc/)                   │   │
//! │  │     PageAllocator + PageSource + Page + RegionHeader     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                                                                 │
//! │  sync/: execution contexts, IrqLock, WaitQueue, Task            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageSlot, RegionHandle, Pid, Error, config)
//! - [`sync`] - Execution contexts and locking for interrupt/deferred/process code
//! - [`alloc`] - Page allocator usable from every context
//! - [`buffer`] - Ring buffer, stream buffer and record framing
//! - [`capture`] - Sample assembly and deferred migration
//! - [`device`] - Consumer-facing open/read/release
//!
//! # Quick Start
//! ```
//! use std::sync::Arc;
//! use nibblecap::{CaptureConfig, CaptureDevice, Pid};
//! use nibblecap::capture::ScriptedSource;
//! use nibblecap::sync::Task;
//!
//! let source = Arc::new(ScriptedSource::new());
//! let device = CaptureDevice::start(CaptureConfig::default(), source.clone()).unwrap();
//!
//! // nibbles 0xA, 0x1, 0x0, 0x0 form the record [0xA1]
//! for nibble in [0xA, 0x1, 0x0, 0x0] {
//!     source.emit(nibble);
//! }
//! device.run_deferred();
//!
//! let task = Task::new(Pid::new(1));
//! device.open(&task).unwrap();
//! let mut buf = [0u8; 4];
//! assert_eq!(device.read(&task, &mut buf[..], 4).unwrap(), 1);
//! assert_eq!(buf[0], 0xA1);
//! device.release(&task).unwrap();
//! ```

pub mod alloc;
pub mod buffer;
pub mod capture;
pub mod common;
pub mod device;
pub mod sync;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{CaptureConfig, Error, PageSlot, Pid, RegionHandle, Result};

pub use crate::alloc::{AllocFlags, PageAllocator};
pub use buffer::{DataState, RecordFramer, RingBuffer, StreamBuffer};
pub use capture::{CaptureSnapshot, SampleSource};
pub use device::{AccessGate, CaptureDevice, GateState};
