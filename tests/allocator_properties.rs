//! Property tests for the allocator and the byte buffers built on it.

use nibblecap::common::config::MAX_REGION_SIZE;
use nibblecap::{AllocFlags, PageAllocator, RegionHandle, RingBuffer, StreamBuffer, PAGE_SIZE};
use proptest::prelude::*;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1..=MAX_REGION_SIZE / 4).prop_map(Op::Alloc),
        1 => (1..=MAX_REGION_SIZE).prop_map(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Free),
    ]
}

fn assert_layout_sound(allocator: &PageAllocator) {
    for (slot, regions) in allocator.layout() {
        assert!(regions.len() >= 2, "{} lost its sentinels", slot);
        for pair in regions.windows(2) {
            assert!(
                pair[0].end() <= pair[1].start,
                "{}: {:?} overlaps {:?}",
                slot,
                pair[0],
                pair[1]
            );
        }
        if let Some(last) = regions.last() {
            assert_eq!(last.end(), PAGE_SIZE);
        }
    }
}

proptest! {
    #[test]
    fn prop_regions_never_overlap(ops in prop::collection::vec(op(), 1..64)) {
        let allocator = PageAllocator::with_system_pages(None);
        let mut live: Vec<(RegionHandle, usize, u8)> = Vec::new();

        for (i, op) in ops.into_iter().enumerate() {
            match op {
                Op::Alloc(size) => {
                    let handle = allocator.alloc(size, AllocFlags::Blocking).unwrap();
                    let tag = (i % 251) as u8 + 1;
                    allocator.with_region_mut(handle, |bytes| bytes.fill(tag)).unwrap();
                    live.push((handle, size, tag));
                }
                Op::Free(pick) if !live.is_empty() => {
                    let (handle, _, _) = live.swap_remove(pick % live.len());
                    allocator.free(handle).unwrap();
                }
                Op::Free(_) => {}
            }
            assert_layout_sound(&allocator);
        }

        // no live region was clobbered by its neighbours
        for &(handle, size, tag) in &live {
            let intact = allocator
                .with_region(handle, |bytes| bytes.len() == size && bytes.iter().all(|&b| b == tag))
                .unwrap();
            prop_assert!(intact);
        }

        for (handle, _, _) in live {
            allocator.free(handle).unwrap();
        }
        prop_assert_eq!(allocator.pages_held(), 0);
        prop_assert_eq!(allocator.stats().snapshot().live_regions(), 0);
    }

    #[test]
    fn prop_alloc_free_restores_page_count(sizes in prop::collection::vec(1..=MAX_REGION_SIZE, 1..16)) {
        let allocator = PageAllocator::with_system_pages(None);
        let anchor = allocator.alloc(8, AllocFlags::Blocking).unwrap();
        let before = allocator.pages_held();

        let handles: Vec<_> = sizes
            .iter()
            .map(|&size| allocator.alloc(size, AllocFlags::Atomic).unwrap())
            .collect();
        for handle in handles.into_iter().rev() {
            allocator.free(handle).unwrap();
        }

        prop_assert_eq!(allocator.pages_held(), before);
        allocator.free(anchor).unwrap();
        prop_assert_eq!(allocator.pages_in_use(), 0);
    }

    #[test]
    fn prop_ring_is_fifo(capacity in 1usize..64, chunks in prop::collection::vec((0usize..80, 0usize..80), 1..32)) {
        let allocator = Arc::new(PageAllocator::with_system_pages(None));
        let mut ring = RingBuffer::new(&allocator, capacity).unwrap();
        let mut model: VecDeque<u8> = VecDeque::new();
        let mut next = 0u8;

        for (write_len, read_len) in chunks {
            let data: Vec<u8> = (0..write_len).map(|_| { next = next.wrapping_add(1); next }).collect();
            let written = ring.write(&data);
            prop_assert_eq!(written, write_len.min(capacity - model.len()));
            model.extend(&data[..written]);

            let mut out = vec![0u8; read_len];
            let read = ring.read(&mut out);
            prop_assert_eq!(read, read_len.min(model.len()));
            let expected: Vec<u8> = model.drain(..read).collect();
            prop_assert_eq!(&out[..read], &expected[..]);

            prop_assert_eq!(ring.size(), model.len());
            prop_assert_eq!(ring.available(), capacity - model.len());
        }
    }

    #[test]
    fn prop_stream_returns_what_was_written(
        writes in prop::collection::vec(0usize..(2 * PAGE_SIZE), 1..6),
        read_chunk in 1usize..(PAGE_SIZE + 7),
    ) {
        let allocator = Arc::new(PageAllocator::with_system_pages(None));
        let mut stream = StreamBuffer::new(Arc::clone(&allocator));
        let mut expected = Vec::new();

        for (i, len) in writes.into_iter().enumerate() {
            let data: Vec<u8> = (0..len).map(|j| (i * 31 + j) as u8).collect();
            prop_assert_eq!(stream.write(&data), len);
            expected.extend_from_slice(&data);
        }
        prop_assert_eq!(stream.size(), expected.len());

        let mut got = Vec::new();
        let mut buf = vec![0u8; read_chunk];
        loop {
            let n = stream.read(&mut buf);
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }

        prop_assert_eq!(got, expected);
        prop_assert!(stream.is_empty());
        drop(stream);
        prop_assert_eq!(allocator.pages_in_use(), 0);
    }
}
