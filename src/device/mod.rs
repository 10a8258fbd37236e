//! Consumer-facing device layer.
//!
//! # Components
//! - [`AccessGate`] - Single-owner admission and blocking reads
//! - [`CaptureDevice`] - The whole pipeline behind one context object

mod access_gate;
mod capture_device;

pub use access_gate::{AccessGate, GateState, SharedFramer};
pub use capture_device::CaptureDevice;
