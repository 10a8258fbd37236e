//! Configuration constants and runtime knobs for the capture pipeline.

use crate::common::error::{Error, Result};

/// Size of a page in bytes (4KB).
///
/// Every page handed out by the page source has this size. It is both the
/// allocator's unit of growth and the capacity of a single stream-buffer node.
pub const PAGE_SIZE: usize = 4096;

/// Bytes of bookkeeping embedded in a page in front of every region.
///
/// The two sentinel regions of a page each occupy one header as well.
pub const REGION_HEADER_SIZE: usize = 16;

/// Largest payload a single allocation can request.
///
/// A fresh page holds a head sentinel, a tail sentinel and one region
/// header, which leaves this much room for the payload.
pub const MAX_REGION_SIZE: usize = PAGE_SIZE - 3 * REGION_HEADER_SIZE;

/// Default capacity of the interrupt-side ring buffer.
pub const DEFAULT_RING_CAPACITY: usize = 10;

/// Default number of bytes moved per ring-buffer read during migration.
pub const DEFAULT_MIGRATION_CHUNK: usize = 10;

/// Byte value separating records in the captured stream.
pub const RECORD_DELIMITER: u8 = 0x00;

/// Runtime configuration for a [`CaptureDevice`](crate::device::CaptureDevice).
///
/// # Example
/// ```
/// use nibblecap::CaptureConfig;
///
/// let config = CaptureConfig::default()
///     .with_ring_capacity(64)
///     .with_migration_chunk(16);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.effective_high_water_mark(), 32);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Capacity of the ring buffer bridging interrupt and deferred context.
    pub ring_capacity: usize,
    /// Ring fill level above which migration is scheduled.
    ///
    /// `None` means half of `ring_capacity`.
    pub high_water_mark: Option<usize>,
    /// Chunk size used by the migration worker.
    pub migration_chunk: usize,
    /// Record delimiter byte.
    pub delimiter: u8,
    /// Maximum number of pages the page source may hand out.
    pub page_limit: Option<usize>,
    /// Whether migration runs on a dedicated thread.
    ///
    /// When disabled, scheduled migrations only run through
    /// [`CaptureDevice::run_deferred`](crate::device::CaptureDevice::run_deferred).
    pub spawn_migration_thread: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            high_water_mark: None,
            migration_chunk: DEFAULT_MIGRATION_CHUNK,
            delimiter: RECORD_DELIMITER,
            page_limit: None,
            spawn_migration_thread: true,
        }
    }
}

impl CaptureConfig {
    /// Set the ring buffer capacity.
    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity;
        self
    }

    /// Set an explicit high-water mark.
    pub fn with_high_water_mark(mut self, mark: usize) -> Self {
        self.high_water_mark = Some(mark);
        self
    }

    /// Set the migration chunk size.
    pub fn with_migration_chunk(mut self, chunk: usize) -> Self {
        self.migration_chunk = chunk;
        self
    }

    /// Set the record delimiter.
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Limit the number of pages the allocator may obtain.
    pub fn with_page_limit(mut self, pages: usize) -> Self {
        self.page_limit = Some(pages);
        self
    }

    /// Enable or disable the dedicated migration thread.
    pub fn with_migration_thread(mut self, spawn: bool) -> Self {
        self.spawn_migration_thread = spawn;
        self
    }

    /// The high-water mark actually used by the sample assembler.
    pub fn effective_high_water_mark(&self) -> usize {
        self.high_water_mark.unwrap_or(self.ring_capacity / 2)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.ring_capacity == 0 {
            return Err(Error::invalid_config(
                "ring_capacity",
                "ring capacity cannot be zero",
            ));
        }

        if self.ring_capacity > MAX_REGION_SIZE {
            return Err(Error::invalid_config(
                "ring_capacity",
                format!("ring storage must fit in one region ({} bytes)", MAX_REGION_SIZE),
            ));
        }

        if self.effective_high_water_mark() >= self.ring_capacity {
            return Err(Error::invalid_config(
                "high_water_mark",
                "high-water mark must be below the ring capacity",
            ));
        }

        if self.migration_chunk == 0 {
            return Err(Error::invalid_config(
                "migration_chunk",
                "migration chunk cannot be zero",
            ));
        }

        if self.page_limit == Some(0) {
            return Err(Error::invalid_config(
                "page_limit",
                "at least one page is needed for the ring buffer",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_power_of_two() {
        assert!(PAGE_SIZE.is_power_of_two());
        assert_eq!(PAGE_SIZE, 4096);
    }

    #[test]
    fn test_max_region_fits_fresh_page() {
        // head sentinel + region header + payload + tail sentinel
        assert_eq!(
            REGION_HEADER_SIZE + REGION_HEADER_SIZE + MAX_REGION_SIZE + REGION_HEADER_SIZE,
            PAGE_SIZE
        );
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_high_water_mark(), 5);
        assert_eq!(config.delimiter, 0x00);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(CaptureConfig::default().with_ring_capacity(0).validate().is_err());
        assert!(CaptureConfig::default()
            .with_ring_capacity(MAX_REGION_SIZE + 1)
            .validate()
            .is_err());
        assert!(CaptureConfig::default().with_migration_chunk(0).validate().is_err());
        assert!(CaptureConfig::default().with_high_water_mark(10).validate().is_err());
        assert!(CaptureConfig::default().with_page_limit(0).validate().is_err());
    }
}
