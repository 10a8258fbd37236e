//! Integration tests for record framing on top of the stream buffer.

use nibblecap::buffer::FaultingBuffer;
use nibblecap::{DataState, Error, PageAllocator, RecordFramer, PAGE_SIZE};
use std::sync::Arc;

fn framer() -> (RecordFramer, Arc<PageAllocator>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let allocator = Arc::new(PageAllocator::with_system_pages(None));
    let framer = RecordFramer::new(Arc::clone(&allocator), 0).unwrap();
    (framer, allocator)
}

fn read_record(framer: &mut RecordFramer) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 3];
    loop {
        let n = framer.read(&mut buf);
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

#[test]
fn test_records_are_read_in_order() {
    let (mut framer, _allocator) = framer();
    assert_eq!(framer.write(b"AAA\0BBB\0C"), 9);

    assert_eq!(framer.contains_data(), DataState::Available(3));
    assert_eq!(read_record(&mut framer), b"AAA");
    assert_eq!(framer.contains_data(), DataState::NoMoreData);
    assert!(framer.end_phase());

    assert_eq!(read_record(&mut framer), b"BBB");
    assert!(framer.end_phase());

    // the unterminated tail is buffered but not readable
    assert_eq!(framer.contains_data(), DataState::Empty);
    assert!(read_record(&mut framer).is_empty());
    assert!(!framer.end_phase());
    assert_eq!(framer.size(), 1);

    framer.write(b"DD\0");
    assert_eq!(read_record(&mut framer), b"CDD");
    assert!(framer.end_phase());
    assert_eq!(framer.size(), 0);
    assert_eq!(framer.contains_data(), DataState::Empty);
}

#[test]
fn test_delimiter_free_write_is_readable_at_once() {
    let (mut framer, _allocator) = framer();
    framer.write(b"partial");
    assert_eq!(framer.contains_data(), DataState::Available(7));
    assert_eq!(read_record(&mut framer), b"partial");
    assert_eq!(framer.contains_data(), DataState::Empty);
}

#[test]
fn test_record_spanning_pages() {
    let (mut framer, _allocator) = framer();
    let mut data: Vec<u8> = (0..3 * PAGE_SIZE).map(|i| (i % 250) as u8 + 1).collect();
    data.push(0);

    assert_eq!(framer.write(&data), data.len());
    assert_eq!(framer.contains_data(), DataState::Available(3 * PAGE_SIZE));

    let record = read_record(&mut framer);
    assert_eq!(record, &data[..3 * PAGE_SIZE]);
    assert!(framer.end_phase());
    assert_eq!(framer.contains_data(), DataState::Empty);
}

#[test]
fn test_back_to_back_delimiters_make_empty_records() {
    let (mut framer, _allocator) = framer();
    framer.write(b"\0\0x\0");

    assert_eq!(framer.contains_data(), DataState::NoMoreData);
    assert!(framer.end_phase());
    assert_eq!(framer.contains_data(), DataState::NoMoreData);
    assert!(framer.end_phase());
    assert_eq!(read_record(&mut framer), b"x");
    assert!(framer.end_phase());
    assert_eq!(framer.record_count(), 1);
}

#[test]
fn test_unread_record_is_not_acknowledged() {
    let (mut framer, _allocator) = framer();
    framer.write(b"abc\0");

    let mut buf = [0u8; 2];
    assert_eq!(framer.read(&mut buf), 2);
    assert!(!framer.end_phase());
    assert_eq!(framer.contains_data(), DataState::Available(1));
}

#[test]
fn test_fault_charges_only_transferred_bytes() {
    let (mut framer, _allocator) = framer();
    framer.write(b"12345\0");

    let mut dst = FaultingBuffer::new(5, 3);
    let err = framer.read_to_user(&mut dst, 5).unwrap_err();
    assert!(matches!(err, Error::BoundaryCopyFault { transferred: 3 }));
    assert_eq!(&dst.as_slice()[..3], b"123");
    assert_eq!(framer.contains_data(), DataState::Available(2));
}

#[test]
fn test_dropping_framer_returns_every_page() {
    let (mut framer, allocator) = framer();
    framer.write(&vec![7u8; 2 * PAGE_SIZE]);
    framer.write(b"\0\0\0");
    assert!(allocator.pages_held() > 0);

    drop(framer);
    assert_eq!(allocator.pages_held(), 0);
    assert_eq!(allocator.stats().snapshot().pages_outstanding(), 0);
}
