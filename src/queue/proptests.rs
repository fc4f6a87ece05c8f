//! Property-based tests for the queue families
//!
//! These verify the order, conservation and bound invariants under arbitrary
//! operation sequences and drop-tracking element types.

use crate::queue::{
    BoundedFastFifoQueue, BoundedFifoQueue, FastFifoQueue, FifoQueue, SingleReaderAndWriter,
};
use crate::queueable::{Link, Queueable};
use core::mem::offset_of;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Tracked {
    link: Link,
    value: i32,
    drops: Option<Arc<AtomicUsize>>,
}

unsafe impl Queueable for Tracked {
    const LINK_OFFSET: usize = offset_of!(Tracked, link);
}

impl Drop for Tracked {
    fn drop(&mut self) {
        if let Some(drops) = &self.drops {
            drops.fetch_add(1, Ordering::Relaxed);
        }
    }
}

fn plain(value: i32) -> Box<Tracked> {
    Box::new(Tracked {
        link: Link::new(),
        value,
        drops: None,
    })
}

proptest! {
    /// FIFO order holds for any single-threaded sequence of batched pushes.
    #[test]
    fn fifo_ordering_single_thread(
        batches in prop::collection::vec(prop::collection::vec(any::<i32>(), 1..10), 1..5)
    ) {
        let queue: FifoQueue<Tracked, SingleReaderAndWriter> = FifoQueue::new();
        let mut expected = Vec::new();
        for batch in &batches {
            for &value in batch {
                queue.enqueue(plain(value));
                expected.push(value);
            }
        }
        for value in expected {
            prop_assert_eq!(queue.dequeue().unwrap().value, value);
        }
        prop_assert!(queue.dequeue().is_none());
    }

    /// The fast queue yields everything except the newest element, in order.
    #[test]
    fn fast_fifo_withholds_exactly_one(
        values in prop::collection::vec(any::<i32>(), 1..50)
    ) {
        let queue: FastFifoQueue<Tracked, SingleReaderAndWriter> = FastFifoQueue::new();
        for &value in &values {
            queue.enqueue(plain(value));
        }
        for &value in &values[..values.len() - 1] {
            prop_assert_eq!(queue.dequeue().unwrap().value, value);
        }
        prop_assert!(queue.dequeue().is_none());
    }

    /// Mixed pushes and pops never reorder the survivors.
    #[test]
    fn interleaved_operations_stay_fifo(
        ops in prop::collection::vec(prop::bool::weighted(0.7), 1..100)
    ) {
        let queue: FifoQueue<Tracked, SingleReaderAndWriter> = FifoQueue::new();
        let mut model = std::collections::VecDeque::new();
        let mut counter = 0;
        for &push in &ops {
            if push {
                queue.enqueue(plain(counter));
                model.push_back(counter);
                counter += 1;
            } else {
                prop_assert_eq!(queue.dequeue().map(|e| e.value), model.pop_front());
            }
        }
        while let Some(expected) = model.pop_front() {
            prop_assert_eq!(queue.dequeue().unwrap().value, expected);
        }
    }

    /// No element is ever leaked or double-freed, wherever it ends up.
    #[test]
    fn conservation_with_bounds(
        max_length in 1u32..20,
        count in 1usize..200
    ) {
        let drops = Arc::new(AtomicUsize::new(0));
        let queue: BoundedFifoQueue<Tracked, SingleReaderAndWriter> =
            BoundedFifoQueue::new(max_length);
        for value in 0..count {
            queue.enqueue(Box::new(Tracked {
                link: Link::new(),
                value: value as i32,
                drops: Some(Arc::clone(&drops)),
            }));
        }
        let mut dequeued = 0u64;
        while queue.dequeue().is_some() {
            dequeued += 1;
        }
        let metrics = crate::metrics::MetricsCollector::metrics(&queue);
        prop_assert_eq!(metrics.enqueued, count as u64);
        prop_assert_eq!(metrics.dequeued, dequeued);
        prop_assert_eq!(metrics.dequeued + metrics.dropped, count as u64);
        drop(queue);
        prop_assert_eq!(drops.load(Ordering::Relaxed), count);
    }

    /// A single producer trims on every enqueue, so the window never strays
    /// further than one past the bound.
    #[test]
    fn single_producer_respects_the_bound(
        max_length in 1u32..50,
        count in 1usize..300
    ) {
        let queue: BoundedFastFifoQueue<Tracked, SingleReaderAndWriter> =
            BoundedFastFifoQueue::new(max_length);
        for value in 0..count {
            queue.enqueue(plain(value as i32));
            prop_assert!(queue.len() <= max_length + 1);
        }
    }

    /// Elements dropped by the bound are always the oldest at that moment.
    #[test]
    fn survivors_are_the_newest(
        max_length in 1u32..10,
        count in 20usize..100
    ) {
        let queue: BoundedFifoQueue<Tracked, SingleReaderAndWriter> =
            BoundedFifoQueue::new(max_length);
        for value in 0..count {
            queue.enqueue(plain(value as i32));
        }
        let mut survivors = Vec::new();
        while let Some(e) = queue.dequeue() {
            survivors.push(e.value);
        }
        prop_assert!(survivors.windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(*survivors.last().unwrap(), count as i32 - 1);
    }
}
