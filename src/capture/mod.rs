//! The interrupt-to-buffer half of the pipeline.
//!
//! # Components
//! - [`SampleSource`] - Hardware boundary delivering 4-bit samples
//! - [`SampleAssembler`] - Builds bytes in interrupt context
//! - [`DeferredWork`] - Single-slot deferred execution
//! - [`MigrationWorker`] - Moves bytes from the ring into the framer
//! - [`CaptureStats`] - Pipeline counters

mod assembler;
mod deferred;
mod migration;
mod source;
mod stats;

pub use assembler::{RingState, SampleAssembler, SharedRing};
pub use deferred::{DeferredWork, WorkFn};
pub use migration::MigrationWorker;
pub use source::{SampleSource, ScriptedSource};
pub use stats::{CaptureSnapshot, CaptureStats};
