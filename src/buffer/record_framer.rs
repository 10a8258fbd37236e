//! Delimiter-aware record framing on top of a [`StreamBuffer`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::alloc::{AllocFlags, Allocation, PageAllocator};
use crate::buffer::{StreamBuffer, UserSliceMut};
use crate::common::{Error, Result};

/// Bookkeeping bytes leased per record (its flag and counter).
const RECORD_SIZE: usize = 2 * std::mem::size_of::<usize>();

/// What a reader would find at the front of the framer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataState {
    /// The oldest record is terminated and fully read. It must be
    /// acknowledged with [`RecordFramer::end_phase`] before the next record
    /// becomes visible.
    NoMoreData,
    /// The oldest record is still open and nothing of it is readable yet.
    Empty,
    /// This many bytes of the oldest record can be read.
    Available(usize),
}

impl fmt::Display for DataState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataState::NoMoreData => write!(f, "NoMoreData"),
            DataState::Empty => write!(f, "Empty"),
            DataState::Available(n) => write!(f, "Available({})", n),
        }
    }
}

/// One logical message in the stream.
///
/// `held` counts bytes that arrived behind a delimiter in the same write.
/// They are buffered but stay invisible to readers until the record's own
/// delimiter arrives.
struct Record {
    has_delimiter: bool,
    remaining_size: usize,
    held: usize,
    lease: Allocation,
}

impl Record {
    fn new(lease: Allocation) -> Self {
        Self {
            has_delimiter: false,
            remaining_size: 0,
            held: 0,
            lease,
        }
    }
}

/// A byte stream split into records by a delimiter byte.
///
/// Each record tracks how many of its bytes are still buffered and whether
/// its delimiter has arrived. The delimiter byte itself stays in the stream
/// until the reader acknowledges the record with [`end_phase`](Self::end_phase),
/// so a read can never run from one record into the next.
///
/// The record queue is never empty: its last entry is the open record that
/// receives bytes after the most recent delimiter.
///
/// Bytes that follow a delimiter within the same write are held back: the
/// open record reports [`DataState::Empty`] until its own delimiter arrives,
/// at which point they become readable. A write without any delimiter is
/// readable right away unless the open record is already holding bytes.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use nibblecap::alloc::PageAllocator;
/// use nibblecap::buffer::{DataState, RecordFramer};
///
/// let allocator = Arc::new(PageAllocator::with_system_pages(None));
/// let mut framer = RecordFramer::new(allocator, 0).unwrap();
/// framer.write(b"AAA\0BBB\0");
///
/// let mut out = [0u8; 16];
/// assert_eq!(framer.read(&mut out), 3);
/// assert_eq!(framer.contains_data(), DataState::NoMoreData);
/// assert!(framer.end_phase());
/// assert_eq!(framer.contains_data(), DataState::Available(3));
/// ```
pub struct RecordFramer {
    allocator: Arc<PageAllocator>,
    stream: StreamBuffer,
    records: VecDeque<Record>,
    delimiter: u8,
}

impl RecordFramer {
    /// Create an empty framer splitting on `delimiter`.
    ///
    /// # Errors
    /// Fails if the first record's bookkeeping cannot be allocated.
    pub fn new(allocator: Arc<PageAllocator>, delimiter: u8) -> Result<Self> {
        let first = allocator.lease(RECORD_SIZE, AllocFlags::Blocking)?;
        let mut records = VecDeque::new();
        records.push_back(Record::new(first));

        Ok(Self {
            stream: StreamBuffer::new(Arc::clone(&allocator)),
            allocator,
            records,
            delimiter,
        })
    }

    /// The delimiter byte.
    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Bytes buffered, delimiters included.
    pub fn size(&self) -> usize {
        self.stream.size()
    }

    /// Number of records in the queue, the open one included.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Append `data`, opening a new record after every delimiter.
    ///
    /// Bytes after the last delimiter are held by the new open record until
    /// its delimiter arrives.
    ///
    /// Returns the number of bytes accepted. If bookkeeping for a new
    /// record cannot be allocated, only the bytes before that delimiter are
    /// accepted; if a page cannot be obtained, only what fit is accepted.
    /// Bytes already buffered are never affected.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let flags = AllocFlags::for_current_context();

        // Reserve a record for each delimiter before touching the stream
        let mut pending = Vec::new();
        let mut accept = data.len();
        for (pos, _) in data.iter().enumerate().filter(|&(_, &b)| b == self.delimiter) {
            match self.allocator.lease(RECORD_SIZE, flags) {
                Ok(lease) => pending.push((pos, lease)),
                Err(e) => {
                    log::warn!("no room for a new record, accepting {} of {} bytes: {}", pos, data.len(), e);
                    accept = pos;
                    break;
                }
            }
        }

        let written = self.stream.write(&data[..accept]);
        if written < data.len() {
            log::warn!("record framer accepted {} of {} bytes", written, data.len());
        }

        let mut cursor = 0;
        let mut closed = false;
        for (pos, lease) in pending {
            if pos >= written {
                break;
            }
            self.close_current(pos - cursor, lease);
            cursor = pos + 1;
            closed = true;
        }
        self.extend_current(written - cursor, closed);

        written
    }

    fn close_current(&mut self, len: usize, lease: Allocation) {
        if let Some(current) = self.records.back_mut() {
            current.remaining_size += current.held + len;
            current.held = 0;
            current.has_delimiter = true;
            log::debug!("record closed with {} bytes unread", current.remaining_size);
        }
        self.records.push_back(Record::new(lease));
    }

    fn extend_current(&mut self, len: usize, after_delimiter: bool) {
        if let Some(current) = self.records.back_mut() {
            if after_delimiter || current.held > 0 {
                current.held += len;
            } else {
                current.remaining_size += len;
            }
        }
    }

    /// Classify the oldest record.
    pub fn contains_data(&self) -> DataState {
        match self.records.front() {
            Some(r) if r.remaining_size > 0 => DataState::Available(r.remaining_size),
            Some(r) if r.has_delimiter => DataState::NoMoreData,
            _ => DataState::Empty,
        }
    }

    /// Read up to `out.len()` bytes of the oldest record.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let Some(front) = self.records.front_mut() else {
            return 0;
        };

        let n = out.len().min(front.remaining_size);
        if n == 0 {
            return 0;
        }

        let read = self.stream.read(&mut out[..n]);
        front.remaining_size -= read;
        read
    }

    /// Read up to `max` bytes of the oldest record into an external buffer.
    ///
    /// # Errors
    /// - `Error::BoundaryCopyFault` if the copy faults; the record is
    ///   charged exactly the bytes transferred
    pub fn read_to_user<D>(&mut self, dst: &mut D, max: usize) -> Result<usize>
    where
        D: UserSliceMut + ?Sized,
    {
        let Some(front) = self.records.front_mut() else {
            return Ok(0);
        };

        let n = max.min(front.remaining_size);
        if n == 0 {
            return Ok(0);
        }

        match self.stream.read_to_user(dst, n) {
            Ok(read) => {
                front.remaining_size -= read;
                Ok(read)
            }
            Err(Error::BoundaryCopyFault { transferred }) => {
                front.remaining_size -= transferred;
                Err(Error::BoundaryCopyFault { transferred })
            }
            Err(e) => Err(e),
        }
    }

    /// Acknowledge the oldest record once it is terminated and fully read.
    ///
    /// Removes it, drains its delimiter byte from the stream and returns
    /// `true`. Does nothing and returns `false` otherwise.
    pub fn end_phase(&mut self) -> bool {
        match self.records.front() {
            Some(r) if r.has_delimiter && r.remaining_size == 0 => {}
            _ => return false,
        }

        if self.records.len() == 1 {
            // keep the queue non-empty by reusing the record
            if let Some(front) = self.records.front_mut() {
                front.has_delimiter = false;
                front.held = 0;
            }
        } else {
            self.records.pop_front();
        }

        let mut delimiter = [0u8; 1];
        if self.stream.read(&mut delimiter) != 1 {
            log::error!("record acknowledged but its delimiter was not buffered");
        }
        true
    }
}

impl fmt::Debug for RecordFramer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordFramer")
            .field("state", &self.contains_data())
            .field("records", &self.records.len())
            .field("stream", &self.stream)
            .finish()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("has_delimiter", &self.has_delimiter)
            .field("remaining_size", &self.remaining_size)
            .field("held", &self.held)
            .field("lease", &self.lease.handle())
            .finish()
    }
}
