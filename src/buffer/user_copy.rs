//! Copies across the external boundary.
//!
//! Memory on the other side of the boundary belongs to a consumer and a copy
//! into or out of it may fault part-way. Both traits report how many bytes
//! were actually copied; a count short of the request means a fault and the
//! caller must stop the transfer there.

/// External memory that bytes are copied out of.
pub trait UserSlice {
    /// Length of the external buffer.
    fn len(&self) -> usize;

    /// Whether the external buffer is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// Returns the number of bytes copied before a fault.
    fn copy_out(&self, offset: usize, dst: &mut [u8]) -> usize;
}

/// External memory that bytes are copied into.
pub trait UserSliceMut {
    /// Length of the external buffer.
    fn len(&self) -> usize;

    /// Whether the external buffer is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy `src` into the buffer starting at `offset`.
    ///
    /// Returns the number of bytes copied before a fault.
    fn copy_in(&mut self, offset: usize, src: &[u8]) -> usize;
}

impl UserSlice for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_out(&self, offset: usize, dst: &mut [u8]) -> usize {
        if offset >= <[u8]>::len(self) {
            return 0;
        }
        let n = dst.len().min(<[u8]>::len(self) - offset);
        dst[..n].copy_from_slice(&self[offset..offset + n]);
        n
    }
}

impl UserSliceMut for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn copy_in(&mut self, offset: usize, src: &[u8]) -> usize {
        if offset >= <[u8]>::len(self) {
            return 0;
        }
        let n = src.len().min(<[u8]>::len(self) - offset);
        self[offset..offset + n].copy_from_slice(&src[..n]);
        n
    }
}

impl UserSliceMut for Vec<u8> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn copy_in(&mut self, offset: usize, src: &[u8]) -> usize {
        self.as_mut_slice().copy_in(offset, src)
    }
}

/// A buffer whose bytes at and beyond `fault_at` are unmapped.
///
/// Any copy touching the unmapped part stops at the boundary, like a
/// consumer passing a buffer that is only partly valid.
///
/// # Example
/// ```
/// use nibblecap::buffer::{FaultingBuffer, UserSliceMut};
///
/// let mut buf = FaultingBuffer::new(8, 3);
/// assert_eq!(buf.copy_in(0, b"hello"), 3);
/// assert_eq!(&buf.as_slice()[..3], b"hel");
/// ```
#[derive(Debug, Clone)]
pub struct FaultingBuffer {
    data: Vec<u8>,
    fault_at: usize,
}

impl FaultingBuffer {
    /// A zeroed buffer of `len` bytes, valid up to `fault_at`.
    pub fn new(len: usize, fault_at: usize) -> Self {
        Self {
            data: vec![0; len],
            fault_at: fault_at.min(len),
        }
    }

    /// A buffer holding `data`, valid up to `fault_at`.
    pub fn from_bytes(data: Vec<u8>, fault_at: usize) -> Self {
        let fault_at = fault_at.min(data.len());
        Self { data, fault_at }
    }

    /// Full contents, including the unmapped tail.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn reachable(&self, offset: usize, wanted: usize) -> usize {
        wanted.min(self.fault_at.saturating_sub(offset))
    }
}

impl UserSlice for FaultingBuffer {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn copy_out(&self, offset: usize, dst: &mut [u8]) -> usize {
        let n = self.reachable(offset, dst.len());
        if n == 0 {
            return 0;
        }
        dst[..n].copy_from_slice(&self.data[offset..offset + n]);
        n
    }
}

impl UserSliceMut for FaultingBuffer {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn copy_in(&mut self, offset: usize, src: &[u8]) -> usize {
        let n = self.reachable(offset, src.len());
        if n == 0 {
            return 0;
        }
        self.data[offset..offset + n].copy_from_slice(&src[..n]);
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_copy_in_bounded_by_len() {
        let mut buf = [0u8; 4];
        assert_eq!(UserSliceMut::copy_in(&mut buf[..], 2, b"xyz"), 2);
        assert_eq!(buf, [0, 0, b'x', b'y']);
    }

    #[test]
    fn test_slice_copy_out() {
        let src = b"abcdef";
        let mut dst = [0u8; 3];
        assert_eq!(src[..].copy_out(4, &mut dst), 2);
        assert_eq!(&dst[..2], b"ef");
    }

    #[test]
    fn test_faulting_buffer_stops_at_fault() {
        let mut buf = FaultingBuffer::new(10, 4);
        assert_eq!(buf.copy_in(0, b"ab"), 2);
        assert_eq!(buf.copy_in(2, b"cdef"), 2);
        assert_eq!(buf.copy_in(4, b"g"), 0);
        assert_eq!(&buf.as_slice()[..5], b"abcd\0");

        let src = FaultingBuffer::from_bytes(b"0123456".to_vec(), 5);
        let mut dst = [0u8; 7];
        assert_eq!(src.copy_out(0, &mut dst), 5);
    }

    #[test]
    fn test_offset_past_end_copies_nothing() {
        let mut buf = [7u8; 4];
        assert_eq!(UserSliceMut::copy_in(&mut buf[..], 4, b"x"), 0);
        assert_eq!(UserSliceMut::copy_in(&mut buf[..], 9, b"x"), 0);
        assert_eq!(buf, [7u8; 4]);

        let mut dst = [0u8; 2];
        assert_eq!(buf[..].copy_out(9, &mut dst), 0);
        assert_eq!(dst, [0, 0]);

        let mut vec = vec![1u8, 2];
        assert_eq!(vec.copy_in(5, b"abc"), 0);
        assert_eq!(vec, vec![1, 2]);

        let mut faulting = FaultingBuffer::new(4, 2);
        assert_eq!(faulting.copy_in(9, b"abc"), 0);
        assert_eq!(faulting.copy_out(9, &mut dst), 0);
    }
}
