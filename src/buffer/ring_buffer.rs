//! Fixed-capacity FIFO bridging interrupt and deferred context.

use std::sync::Arc;

use crate::alloc::{AllocFlags, Allocation, PageAllocator};
use crate::common::Result;

/// A byte ring whose storage is a single allocator region.
///
/// Positions are monotonically increasing counters with
/// `read_pos <= write_pos` and `write_pos - read_pos <= capacity`. Once both
/// exceed the capacity they are reduced by it, which keeps them bounded
/// without disturbing `pos % capacity`.
///
/// Writes never block and never fail: whatever does not fit is dropped.
/// The ring does no locking of its own; the owner wraps it in an
/// [`IrqLock`](crate::sync::IrqLock).
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use nibblecap::alloc::PageAllocator;
/// use nibblecap::buffer::RingBuffer;
///
/// let allocator = Arc::new(PageAllocator::with_system_pages(None));
/// let mut ring = RingBuffer::new(&allocator, 4).unwrap();
/// assert_eq!(ring.write(b"abcdef"), 4);
///
/// let mut out = [0u8; 8];
/// assert_eq!(ring.read(&mut out), 4);
/// assert_eq!(&out[..4], b"abcd");
/// ```
#[derive(Debug)]
pub struct RingBuffer {
    storage: Allocation,
    capacity: usize,
    read_pos: usize,
    write_pos: usize,
}

impl RingBuffer {
    /// Create a ring of `capacity` bytes backed by `allocator`.
    ///
    /// # Errors
    /// Fails if the allocator cannot host `capacity` bytes.
    pub fn new(allocator: &Arc<PageAllocator>, capacity: usize) -> Result<Self> {
        let storage = allocator.lease(capacity, AllocFlags::Blocking)?;
        Ok(Self {
            storage,
            capacity,
            read_pos: 0,
            write_pos: 0,
        })
    }

    /// Total capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes buffered.
    #[inline]
    pub fn size(&self) -> usize {
        self.write_pos - self.read_pos
    }

    /// Free space in bytes.
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity - self.size()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Append as much of `data` as fits. Returns the number of bytes stored.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.available());
        if n < data.len() {
            log::warn!(
                "ring buffer full, dropping {} of {} bytes",
                data.len() - n,
                data.len()
            );
        }
        if n == 0 {
            return 0;
        }

        let capacity = self.capacity;
        let at = self.write_pos % capacity;
        let first = n.min(capacity - at);

        let copied = self.storage.with_bytes_mut(|bytes| {
            bytes[at..at + first].copy_from_slice(&data[..first]);
            bytes[..n - first].copy_from_slice(&data[first..n]);
        });
        if let Err(e) = copied {
            log::error!("ring buffer storage lost: {}", e);
            return 0;
        }

        self.write_pos += n;
        self.normalize();
        n
    }

    /// Move up to `out.len()` bytes into `out`. Returns the number moved.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.size());
        if n == 0 {
            return 0;
        }

        let capacity = self.capacity;
        let at = self.read_pos % capacity;
        let first = n.min(capacity - at);

        let copied = self.storage.with_bytes(|bytes| {
            out[..first].copy_from_slice(&bytes[at..at + first]);
            out[first..n].copy_from_slice(&bytes[..n - first]);
        });
        if let Err(e) = copied {
            log::error!("ring buffer storage lost: {}", e);
            return 0;
        }

        self.read_pos += n;
        self.normalize();
        n
    }

    /// Raw counters, for inspection.
    pub fn positions(&self) -> (usize, usize) {
        (self.read_pos, self.write_pos)
    }

    fn normalize(&mut self) {
        while self.read_pos > self.capacity && self.write_pos > self.capacity {
            self.read_pos -= self.capacity;
            self.write_pos -= self.capacity;
        }
    }
}
