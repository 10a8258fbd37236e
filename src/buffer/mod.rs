//! Byte buffers backed by the page allocator.
//!
//! # Components
//! - [`RingBuffer`] - Fixed-capacity FIFO between interrupt and deferred context
//! - [`StreamBuffer`] - Unbounded FIFO built from whole pages
//! - [`RecordFramer`] - Delimiter-separated records on top of a stream
//! - [`UserSlice`] / [`UserSliceMut`] - Copies across the external boundary

mod record_framer;
mod ring_buffer;
mod stream_buffer;
mod user_copy;

pub use record_framer::{DataState, RecordFramer};
pub use ring_buffer::RingBuffer;
pub use stream_buffer::StreamBuffer;
pub use user_copy::{FaultingBuffer, UserSlice, UserSliceMut};
