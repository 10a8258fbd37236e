//! Common types and utilities shared across the pipeline.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`CaptureConfig`]
//! - Error types
//! - Identifiers (PageSlot, RegionHandle, Pid)

pub mod config;
pub mod error;
mod page_slot;
mod pid;
mod region_handle;

pub use config::CaptureConfig;
pub use error::{Error, Result};
pub use page_slot::PageSlot;
pub use pid::Pid;
pub use region_handle::RegionHandle;
