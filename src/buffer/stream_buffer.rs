//! Unbounded byte queue built from whole pages.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::alloc::{AllocFlags, Allocation, Page, PageAllocator};
use crate::buffer::{UserSlice, UserSliceMut};
use crate::common::config::PAGE_SIZE;
use crate::common::{Error, Result};

/// Bookkeeping bytes leased per page node (its two cursors).
const NODE_RECORD_SIZE: usize = 2 * std::mem::size_of::<usize>();

/// One page of the stream plus its cursors.
///
/// Bytes `[start_pos, end_pos)` are buffered. A node is full once
/// `end_pos == PAGE_SIZE` and is dropped once it is also fully drained.
struct PageNode {
    page: Box<Page>,
    start_pos: usize,
    end_pos: usize,
    _record: Allocation,
}

impl PageNode {
    #[inline]
    fn len(&self) -> usize {
        self.end_pos - self.start_pos
    }

    #[inline]
    fn room(&self) -> usize {
        PAGE_SIZE - self.end_pos
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.end_pos == PAGE_SIZE
    }

    #[inline]
    fn is_spent(&self) -> bool {
        self.is_full() && self.start_pos == self.end_pos
    }

    #[inline]
    fn data(&self) -> &[u8] {
        &self.page.as_slice()[self.start_pos..self.end_pos]
    }
}

/// A FIFO byte stream that grows one page at a time.
///
/// Writes append to the last page while it has room and then take a fresh
/// page from the [`PageAllocator`]. Reads consume from the first page,
/// which is handed back once it is full and drained.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use nibblecap::alloc::PageAllocator;
/// use nibblecap::buffer::StreamBuffer;
///
/// let allocator = Arc::new(PageAllocator::with_system_pages(None));
/// let mut stream = StreamBuffer::new(allocator);
/// stream.write(b"hello\0world");
/// assert_eq!(stream.find(0, 11), Some(5));
///
/// let mut out = [0u8; 5];
/// assert_eq!(stream.read(&mut out), 5);
/// assert_eq!(&out, b"hello");
/// ```
pub struct StreamBuffer {
    allocator: Arc<PageAllocator>,
    nodes: VecDeque<PageNode>,
    size: usize,
}

impl StreamBuffer {
    /// Create an empty stream. No page is taken until the first write.
    pub fn new(allocator: Arc<PageAllocator>) -> Self {
        Self {
            allocator,
            nodes: VecDeque::new(),
            size: 0,
        }
    }

    /// Bytes buffered.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of pages currently held.
    pub fn page_count(&self) -> usize {
        self.nodes.len()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Append `data`. Returns the number of bytes stored.
    ///
    /// A short count means a page could not be obtained; the bytes that were
    /// stored are intact.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let (written, _) = self.write_with(data.len(), |offset, dst| {
            dst.copy_from_slice(&data[offset..offset + dst.len()]);
            dst.len()
        });
        written
    }

    /// Append the contents of an external buffer.
    ///
    /// # Errors
    /// - `Error::BoundaryCopyFault` if the copy faults; exactly
    ///   `transferred` bytes were appended
    pub fn write_from_user<S>(&mut self, src: &S) -> Result<usize>
    where
        S: UserSlice + ?Sized,
    {
        let (written, faulted) = self.write_with(src.len(), |offset, dst| src.copy_out(offset, dst));
        if faulted {
            return Err(Error::BoundaryCopyFault {
                transferred: written,
            });
        }
        Ok(written)
    }

    /// Core write loop. `copy(offset, dst)` fills `dst` with source bytes
    /// starting at `offset` and returns how many it managed.
    fn write_with<F>(&mut self, len: usize, mut copy: F) -> (usize, bool)
    where
        F: FnMut(usize, &mut [u8]) -> usize,
    {
        let mut written = 0;

        while written < len {
            if self.nodes.back().map_or(true, PageNode::is_full) {
                match self.grow() {
                    Ok(()) => {}
                    Err(e) => {
                        log::warn!("stream write cut short at {} of {} bytes: {}", written, len, e);
                        break;
                    }
                }
            }

            let Some(node) = self.nodes.back_mut() else {
                break;
            };

            let want = (len - written).min(node.room());
            let at = node.end_pos;
            let got = copy(written, &mut node.page.as_mut_slice()[at..at + want]);

            node.end_pos += got;
            written += got;
            self.size += got;

            if got < want {
                return (written, true);
            }
        }

        (written, false)
    }

    fn grow(&mut self) -> Result<()> {
        let flags = AllocFlags::for_current_context();
        let record = self.allocator.lease(NODE_RECORD_SIZE, flags)?;
        let page = self.allocator.acquire_page(flags)?;

        self.nodes.push_back(PageNode {
            page,
            start_pos: 0,
            end_pos: 0,
            _record: record,
        });
        log::debug!("stream buffer grew to {} pages", self.nodes.len());
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Move up to `out.len()` bytes into `out`. Returns the number moved.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let (read, _) = self.read_with(out.len(), |offset, src| {
            out[offset..offset + src.len()].copy_from_slice(src);
            src.len()
        });
        read
    }

    /// Move up to `max` bytes into an external buffer.
    ///
    /// # Errors
    /// - `Error::BoundaryCopyFault` if the copy faults; exactly
    ///   `transferred` bytes left the stream
    pub fn read_to_user<D>(&mut self, dst: &mut D, max: usize) -> Result<usize>
    where
        D: UserSliceMut + ?Sized,
    {
        let max = max.min(dst.len());
        let (read, faulted) = self.read_with(max, |offset, src| dst.copy_in(offset, src));
        if faulted {
            return Err(Error::BoundaryCopyFault { transferred: read });
        }
        Ok(read)
    }

    /// Core read loop. `copy(offset, src)` moves `src` to the destination at
    /// `offset` and returns how many bytes it managed.
    fn read_with<F>(&mut self, max: usize, mut copy: F) -> (usize, bool)
    where
        F: FnMut(usize, &[u8]) -> usize,
    {
        let mut read = 0;
        let mut faulted = false;

        while read < max {
            let Some(node) = self.nodes.front_mut() else {
                break;
            };
            if node.len() == 0 {
                break;
            }

            let want = (max - read).min(node.len());
            let at = node.start_pos;
            let got = copy(read, &node.page.as_slice()[at..at + want]);

            node.start_pos += got;
            read += got;
            self.size -= got;

            if node.is_spent() {
                self.pop_front();
            }

            if got < want {
                faulted = true;
                break;
            }
        }

        (read, faulted)
    }

    /// Copy up to `out.len()` bytes from the front without consuming them.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let mut copied = 0;
        for node in &self.nodes {
            if copied == out.len() {
                break;
            }
            let data = node.data();
            let n = data.len().min(out.len() - copied);
            out[copied..copied + n].copy_from_slice(&data[..n]);
            copied += n;
        }
        copied
    }

    fn pop_front(&mut self) {
        if let Some(node) = self.nodes.pop_front() {
            self.allocator.release_page(node.page);
            log::debug!("stream buffer released a drained page, {} left", self.nodes.len());
        }
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Position of the first `byte` within the first `window` buffered bytes.
    pub fn find(&self, byte: u8, window: usize) -> Option<usize> {
        let mut base = 0;
        for node in &self.nodes {
            if base >= window {
                break;
            }
            let data = node.data();
            let range = data.len().min(window - base);
            if let Some(i) = data[..range].iter().position(|&b| b == byte) {
                return Some(base + i);
            }
            base += data.len();
        }
        None
    }

    /// Position of the first `byte` at or after logical offset `start`.
    pub fn find_from(&self, byte: u8, start: usize) -> Option<usize> {
        let mut base = 0;
        for node in &self.nodes {
            let data = node.data();
            if base + data.len() > start {
                let skip = start.saturating_sub(base);
                if let Some(i) = data[skip..].iter().position(|&b| b == byte) {
                    return Some(base + skip + i);
                }
            }
            base += data.len();
        }
        None
    }
}

impl Drop for StreamBuffer {
    fn drop(&mut self) {
        while let Some(node) = self.nodes.pop_front() {
            self.allocator.release_page(node.page);
        }
    }
}

impl std::fmt::Debug for StreamBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("size", &self.size)
            .field("pages", &self.nodes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FaultingBuffer;

    fn stream() -> (Arc<PageAllocator>, StreamBuffer) {
        let allocator = Arc::new(PageAllocator::with_system_pages(None));
        (Arc::clone(&allocator), StreamBuffer::new(allocator))
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let (_allocator, mut stream) = stream();
        assert_eq!(stream.write(b"abc"), 3);
        assert_eq!(stream.size(), 3);

        let mut out = [0u8; 10];
        assert_eq!(stream.read(&mut out), 3);
        assert_eq!(&out[..3], b"abc");
        assert!(stream.is_empty());
    }

    #[test]
    fn test_spans_pages() {
        let (allocator, mut stream) = stream();
        let data = pattern(PAGE_SIZE * 2 + 100);

        assert_eq!(stream.write(&data), data.len());
        assert_eq!(stream.page_count(), 3);
        assert_eq!(allocator.pages_in_use(), 4); // 3 stream pages + 1 for node records

        let mut out = vec![0u8; data.len()];
        assert_eq!(stream.read(&mut out), data.len());
        assert_eq!(out, data);

        // the last page is not full, so it stays
        assert_eq!(stream.page_count(), 1);
    }

    #[test]
    fn test_drained_full_page_is_released() {
        let (allocator, mut stream) = stream();
        stream.write(&pattern(PAGE_SIZE));

        let mut out = vec![0u8; PAGE_SIZE];
        assert_eq!(stream.read(&mut out), PAGE_SIZE);
        assert_eq!(stream.page_count(), 0);
        assert_eq!(allocator.pages_in_use(), 0);
    }

    #[test]
    fn test_read_more_than_buffered() {
        let (_allocator, mut stream) = stream();
        stream.write(b"xy");
        let mut out = [0u8; 8];
        assert_eq!(stream.read(&mut out), 2);
        assert_eq!(stream.read(&mut out), 0);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let (_allocator, mut stream) = stream();
        stream.write(b"peekaboo");

        let mut out = [0u8; 4];
        assert_eq!(stream.peek(&mut out), 4);
        assert_eq!(&out, b"peek");
        assert_eq!(stream.size(), 8);
    }

    #[test]
    fn test_find_across_page_boundary() {
        let (_allocator, mut stream) = stream();
        let mut data = vec![1u8; PAGE_SIZE + 10];
        data[PAGE_SIZE + 3] = 0;
        stream.write(&data);

        assert_eq!(stream.find(0, data.len()), Some(PAGE_SIZE + 3));
        assert_eq!(stream.find(0, PAGE_SIZE), None);
        assert_eq!(stream.find_from(0, PAGE_SIZE + 3), Some(PAGE_SIZE + 3));
        assert_eq!(stream.find_from(0, PAGE_SIZE + 4), None);
    }

    #[test]
    fn test_find_from_inside_front_page() {
        let (_allocator, mut stream) = stream();
        stream.write(b"a\0b\0c");
        assert_eq!(stream.find_from(0, 0), Some(1));
        assert_eq!(stream.find_from(0, 2), Some(3));
        assert_eq!(stream.find_from(b'c', 1), Some(4));
    }

    #[test]
    fn test_read_to_user_fault_reports_exact_count() {
        let (_allocator, mut stream) = stream();
        stream.write(b"0123456789");

        let mut dst = FaultingBuffer::new(10, 4);
        let result = stream.read_to_user(&mut dst, 10);
        assert!(matches!(result, Err(Error::BoundaryCopyFault { transferred: 4 })));
        assert_eq!(&dst.as_slice()[..4], b"0123");

        // the rest is still buffered
        assert_eq!(stream.size(), 6);
        let mut out = [0u8; 6];
        stream.read(&mut out);
        assert_eq!(&out, b"456789");
    }

    #[test]
    fn test_write_from_user_fault_reports_exact_count() {
        let (_allocator, mut stream) = stream();
        let src = FaultingBuffer::from_bytes(b"abcdef".to_vec(), 3);

        let result = stream.write_from_user(&src);
        assert!(matches!(result, Err(Error::BoundaryCopyFault { transferred: 3 })));
        assert_eq!(stream.size(), 3);

        assert_eq!(stream.write_from_user(&b"gh"[..]).unwrap(), 2);
        assert_eq!(stream.size(), 5);
    }

    #[test]
    fn test_short_write_on_page_exhaustion() {
        // one page for node records, one for data
        let allocator = Arc::new(PageAllocator::with_system_pages(Some(2)));
        let mut stream = StreamBuffer::new(Arc::clone(&allocator));

        let data = pattern(PAGE_SIZE + 50);
        assert_eq!(stream.write(&data), PAGE_SIZE);

        let mut out = vec![0u8; PAGE_SIZE];
        assert_eq!(stream.read(&mut out), PAGE_SIZE);
        assert_eq!(out, data[..PAGE_SIZE]);
    }

    #[test]
    fn test_drop_returns_pages() {
        let (allocator, mut stream) = stream();
        stream.write(&pattern(PAGE_SIZE * 3));
        assert!(allocator.pages_in_use() > 0);

        drop(stream);
        assert_eq!(allocator.pages_in_use(), 0);
    }
}
