//! Drain-all (fragment-based) queues
//!
//! These queues give up single-element dequeue in exchange for the cheapest
//! possible concurrent protocol: producers link new elements in LIFO order
//! with one CAS, and the consumer takes the entire chain with one atomic
//! exchange. The chain is handed to a [`QueueFragment`] that lazily flips it
//! to FIFO when the caller asks for the oldest end.
//!
//! The bounded variant cannot walk the chain to count elements, so it tracks
//! *chunks* instead: every element's [`ChunkLink`](crate::queueable::ChunkLink)
//! records which element started its chunk and how long the chunk has grown.
//! When a chunk reaches the guiding maximum, the next enqueue starts a fresh
//! chunk and releases the chunk before the previous one in a single walk.
//! At most two chunks are ever alive, so a drain returns at most
//! `2 × max_length` elements and the fragment trims presentation to
//! `max_length`.

use core::fmt;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};
use core::sync::atomic::{AtomicPtr, AtomicU32};

use crossbeam_utils::CachePadded;

use crate::fragment::QueueFragment;
use crate::metrics::{AtomicMetrics, MetricsCollector, QueueMetrics};
use crate::queue::{Concurrency, MAX_LENGTH_CEILING};
use crate::queueable::{chunk_link_of, element_of, link_of, FullQueueable, Link, Queueable};
use crate::tagged::{bump_stamp, AtomicTaggedPtr, TaggedPtr};

/// Unbounded drain-all queue.
///
/// Producers push with a CAS loop; `dequeue_all` exchanges the whole chain
/// out in one step.
pub struct DrainQueue<T: Queueable, C: Concurrency> {
    /// Most recently enqueued element; the chain runs newest to oldest.
    last: CachePadded<AtomicPtr<Link>>,
    metrics: AtomicMetrics,
    _marker: PhantomData<(Box<T>, C)>,
}

unsafe impl<T: Queueable + Send, C: Concurrency> Send for DrainQueue<T, C> {}
unsafe impl<T: Queueable + Send, C: Concurrency> Sync for DrainQueue<T, C> {}

impl<T: Queueable, C: Concurrency> DrainQueue<T, C> {
    pub const MIN_ELEMENTS_IN_QUEUE: usize = 0;

    pub fn new() -> Self {
        Self {
            last: CachePadded::new(AtomicPtr::new(ptr::null_mut())),
            metrics: AtomicMetrics::new(),
            _marker: PhantomData,
        }
    }

    /// Links `element` in front of the current chain.
    pub fn enqueue(&self, element: Box<T>) {
        let raw = Box::into_raw(element);
        let link = unsafe { link_of(raw) };
        let mut current = self.last.load(Relaxed);
        loop {
            debug_assert_ne!(current, link);
            unsafe { (*link).store_next(current, Relaxed) };
            match self
                .last
                .compare_exchange(current, link, AcqRel, Relaxed)
            {
                Ok(_) => break,
                Err(observed) => {
                    self.metrics.record_contention();
                    current = observed;
                }
            }
        }
        self.metrics.record_enqueue();
    }

    /// Takes the entire chain, leaving the queue empty.
    ///
    /// The fragment arrives newest-first; `pop_front` flips it once.
    pub fn dequeue_all(&self) -> QueueFragment<T> {
        let chain = self.last.swap(ptr::null_mut(), AcqRel);
        let fragment = QueueFragment::from_lifo_chain(chain, -1);
        if !chain.is_null() {
            let mut n = 0u64;
            let mut current = chain;
            while !current.is_null() {
                n += 1;
                current = unsafe { (*current).load_next(Relaxed) };
            }
            self.metrics.record_dequeues(n);
        }
        fragment
    }
}

impl<T: Queueable, C: Concurrency> Default for DrainQueue<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Queueable, C: Concurrency> fmt::Debug for DrainQueue<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrainQueue")
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl<T: Queueable, C: Concurrency> MetricsCollector for DrainQueue<T, C> {
    fn metrics(&self) -> QueueMetrics {
        self.metrics.snapshot()
    }

    fn reset_metrics(&self) {
        self.metrics.reset();
    }
}

impl<T: Queueable, C: Concurrency> Drop for DrainQueue<T, C> {
    fn drop(&mut self) {
        let mut current = self.last.load(Relaxed);
        while !current.is_null() {
            unsafe {
                let next = (*current).load_next(Relaxed);
                (*current).store_next(ptr::null_mut(), Relaxed);
                drop(Box::from_raw(element_of::<T>(current)));
                current = next;
            }
        }
    }
}

/// Bounded drain-all queue. Requires the "full" element flavour.
///
/// The tail stamp counts enqueue operations (16 bits, ABA defence); chunk
/// accounting lives in the elements' `ChunkLink`s (19-bit length stamp).
pub struct BoundedDrainQueue<T: FullQueueable, C: Concurrency> {
    last: CachePadded<AtomicTaggedPtr<16>>,
    max_length: AtomicU32,
    metrics: AtomicMetrics,
    _marker: PhantomData<(Box<T>, C)>,
}

unsafe impl<T: FullQueueable + Send, C: Concurrency> Send for BoundedDrainQueue<T, C> {}
unsafe impl<T: FullQueueable + Send, C: Concurrency> Sync for BoundedDrainQueue<T, C> {}

impl<T: FullQueueable, C: Concurrency> BoundedDrainQueue<T, C> {
    pub const MIN_ELEMENTS_IN_QUEUE: usize = 0;

    /// Creates a queue whose drained fragments present at most `max_length`
    /// elements. Values outside `1..=500_000` are clamped into that range.
    pub fn new(max_length: u32) -> Self {
        Self {
            last: CachePadded::new(AtomicTaggedPtr::new(TaggedPtr::new(ptr::null_mut(), 0))),
            max_length: AtomicU32::new(max_length.clamp(1, MAX_LENGTH_CEILING)),
            metrics: AtomicMetrics::new(),
            _marker: PhantomData,
        }
    }

    /// Reads the chunk word of the element owning `link`.
    #[inline]
    unsafe fn chunk_of(link: *mut Link) -> TaggedPtr<19> {
        (*chunk_link_of(element_of::<T>(link))).load(Acquire)
    }

    /// Links `element`, extending the current chunk or starting a new one.
    /// Starting a new chunk makes this writer responsible for releasing the
    /// chunk before the previous one.
    pub fn enqueue(&self, element: Box<T>) {
        let max_length = self.max_length.load(Relaxed);
        let raw = Box::into_raw(element);
        let link = unsafe { link_of(raw) };
        let chunk_link = unsafe { chunk_link_of(raw) };

        let mut current = self.last.load(Acquire);
        loop {
            let current_ptr = current.ptr();
            debug_assert_ne!(current_ptr, link);

            let (chunk_head, chunk_len) = if current_ptr.is_null() {
                (ptr::null_mut(), 0)
            } else {
                let chunk = unsafe { Self::chunk_of(current_ptr) };
                (chunk.ptr(), chunk.stamp())
            };

            let mut chunk_to_delete = ptr::null_mut();
            unsafe {
                (*link).store_next(current_ptr, Relaxed);
                if chunk_len >= max_length {
                    // This element opens a new chunk; the chunk preceding the
                    // one that just filled up becomes garbage once our CAS
                    // lands.
                    (*chunk_link).store(TaggedPtr::new(link, 1), Relaxed);
                    chunk_to_delete = (*chunk_head).load_next(Acquire);
                } else {
                    let head = if chunk_head.is_null() { link } else { chunk_head };
                    (*chunk_link).store(TaggedPtr::new(head, chunk_len + 1), Relaxed);
                }
            }

            let new_last = TaggedPtr::new(link, bump_stamp::<16>(current.stamp()));
            match self.last.compare_exchange(current, new_last, AcqRel, Acquire) {
                Ok(()) => {
                    if !chunk_to_delete.is_null() {
                        unsafe { self.release_chunk(chunk_to_delete) };
                    }
                    break;
                }
                Err(observed) => {
                    self.metrics.record_contention();
                    current = observed;
                }
            }
        }
        self.metrics.record_enqueue();
    }

    /// Releases a whole chunk, given its newest element. The walk ends at
    /// the element that started the chunk.
    unsafe fn release_chunk(&self, newest: *mut Link) {
        let oldest = Self::chunk_of(newest).ptr();
        let mut current = newest;
        while current != oldest {
            let next = (*current).load_next(Relaxed);
            (*current).store_next(ptr::null_mut(), Relaxed);
            drop(Box::from_raw(element_of::<T>(current)));
            self.metrics.record_drop();
            current = next;
        }
        (*current).store_next(ptr::null_mut(), Relaxed);
        drop(Box::from_raw(element_of::<T>(current)));
        self.metrics.record_drop();
    }

    /// Takes everything, leaving the queue empty but keeping the enqueue
    /// stamp.
    ///
    /// The chain holds at most the current chunk and the one before it. The
    /// link between the older chunk and anything before it is cut here, and
    /// the fragment presents at most `max_length` elements; the rest is
    /// released when the fragment goes away.
    pub fn dequeue_all(&self) -> QueueFragment<T> {
        let mut current = self.last.load(Acquire);
        while !current.ptr().is_null() {
            let cleared = TaggedPtr::new(ptr::null_mut(), current.stamp());
            match self.last.compare_exchange(current, cleared, AcqRel, Acquire) {
                Ok(()) => break,
                Err(observed) => {
                    self.metrics.record_contention();
                    current = observed;
                }
            }
        }
        let chain = current.ptr();
        if chain.is_null() {
            return QueueFragment::new();
        }

        unsafe {
            // Sever the chain after the previous chunk: its oldest element's
            // next either dangles at an already-released chunk or still
            // links one, and the fragment must see neither.
            let newest_chunk_oldest = Self::chunk_of(chain).ptr();
            let previous_newest = (*newest_chunk_oldest).load_next(Acquire);
            if !previous_newest.is_null() {
                let previous_oldest = Self::chunk_of(previous_newest).ptr();
                (*previous_oldest).store_next(ptr::null_mut(), Relaxed);
            }

            let mut n = 0u64;
            let mut walk = chain;
            while !walk.is_null() {
                n += 1;
                walk = (*walk).load_next(Relaxed);
            }
            self.metrics.record_dequeues(n);
        }

        QueueFragment::from_lifo_chain(chain, self.max_length.load(Relaxed) as isize)
    }

    /// Changes the guiding maximum. Values outside `1..=500_000` are logged
    /// and ignored. The new bound takes effect from the next enqueue;
    /// already-built chunks keep their geometry.
    pub fn set_max_length(&self, max_length: u32) {
        if max_length == 0 || max_length > MAX_LENGTH_CEILING {
            log::error!(
                "invalid queue length {max_length}; keeping {}",
                self.max_length.load(Relaxed)
            );
            return;
        }
        self.max_length.store(max_length, Relaxed);
    }

    pub fn max_length(&self) -> u32 {
        self.max_length.load(Relaxed)
    }
}

impl<T: FullQueueable, C: Concurrency> fmt::Debug for BoundedDrainQueue<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedDrainQueue")
            .field("max_length", &self.max_length())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl<T: FullQueueable, C: Concurrency> MetricsCollector for BoundedDrainQueue<T, C> {
    fn metrics(&self) -> QueueMetrics {
        self.metrics.snapshot()
    }

    fn reset_metrics(&self) {
        self.metrics.reset();
    }
}

impl<T: FullQueueable, C: Concurrency> Drop for BoundedDrainQueue<T, C> {
    fn drop(&mut self) {
        // Same cut as dequeue_all, then release what remains.
        let chain = self.last.load(Relaxed).ptr();
        if chain.is_null() {
            return;
        }
        unsafe {
            let newest_chunk_oldest = Self::chunk_of(chain).ptr();
            let previous_newest = (*newest_chunk_oldest).load_next(Relaxed);
            if !previous_newest.is_null() {
                let previous_oldest = Self::chunk_of(previous_newest).ptr();
                (*previous_oldest).store_next(ptr::null_mut(), Relaxed);
            }
            let mut current = chain;
            while !current.is_null() {
                let next = (*current).load_next(Relaxed);
                (*current).store_next(ptr::null_mut(), Relaxed);
                drop(Box::from_raw(element_of::<T>(current)));
                current = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{Full, MultipleWriters};
    use crate::queueable::ChunkLink;
    use core::mem::offset_of;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    struct Item {
        link: Link,
        chunk: ChunkLink,
        value: usize,
        drops: Option<Arc<AtomicUsize>>,
    }

    unsafe impl Queueable for Item {
        const LINK_OFFSET: usize = offset_of!(Item, link);
    }
    unsafe impl FullQueueable for Item {
        const CHUNK_LINK_OFFSET: usize = offset_of!(Item, chunk);
    }

    impl Drop for Item {
        fn drop(&mut self) {
            if let Some(drops) = &self.drops {
                drops.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn item(value: usize) -> Box<Item> {
        Box::new(Item {
            link: Link::new(),
            chunk: ChunkLink::new(),
            value,
            drops: None,
        })
    }

    fn tracked(value: usize, drops: &Arc<AtomicUsize>) -> Box<Item> {
        Box::new(Item {
            link: Link::new(),
            chunk: ChunkLink::new(),
            value,
            drops: Some(Arc::clone(drops)),
        })
    }

    #[test]
    fn drain_empty_queue_yields_empty_fragment() {
        let q: DrainQueue<Item, Full> = DrainQueue::new();
        let mut fragment = q.dequeue_all();
        assert!(fragment.is_empty());
        assert!(fragment.pop_any().is_none());
    }

    #[test]
    fn drain_returns_everything_in_both_orders() {
        let q: DrainQueue<Item, Full> = DrainQueue::new();
        for v in 1..=5 {
            q.enqueue(item(v));
        }
        let mut fragment = q.dequeue_all();
        assert_eq!(fragment.pop_back().unwrap().value, 5);
        assert_eq!(fragment.pop_front().unwrap().value, 1);
        assert_eq!(fragment.pop_front().unwrap().value, 2);
        drop(fragment);

        // Queue usable again after the drain.
        q.enqueue(item(6));
        let mut fragment = q.dequeue_all();
        assert_eq!(fragment.pop_front().unwrap().value, 6);
        assert!(fragment.is_empty());
    }

    #[test]
    fn bounded_reclaims_whole_chunks() {
        let drops = Arc::new(AtomicUsize::new(0));
        let q: BoundedDrainQueue<Item, Full> = BoundedDrainQueue::new(10);
        // 35 elements with max 10: chunks of 10 fill up and older chunks are
        // reclaimed one enqueue after the next chunk opens.
        for v in 0..35 {
            q.enqueue(tracked(v, &drops));
        }
        let m = q.metrics();
        assert_eq!(m.enqueued, 35);
        // Chunks [0..10) and [10..20) are gone; [20..30) and the 5 newest
        // remain.
        assert_eq!(m.dropped, 20);
        assert_eq!(drops.load(Ordering::Relaxed), 20);

        let mut fragment = q.dequeue_all();
        // Presentation is capped at max_length: the 10 newest.
        let mut seen = Vec::new();
        while let Some(e) = fragment.pop_back() {
            seen.push(e.value);
        }
        assert_eq!(seen, (25..35).rev().collect::<Vec<_>>());
        drop(fragment);
        assert_eq!(drops.load(Ordering::Relaxed), 35);
    }

    #[test]
    fn bounded_drain_conserves_elements() {
        let drops = Arc::new(AtomicUsize::new(0));
        let q: BoundedDrainQueue<Item, Full> = BoundedDrainQueue::new(4);
        for v in 0..17 {
            q.enqueue(tracked(v, &drops));
        }
        let fragment = q.dequeue_all();
        drop(fragment);
        drop(q);
        assert_eq!(drops.load(Ordering::Relaxed), 17);
    }

    #[test]
    fn bounded_drop_releases_live_chunks() {
        let drops = Arc::new(AtomicUsize::new(0));
        let q: BoundedDrainQueue<Item, Full> = BoundedDrainQueue::new(8);
        for v in 0..20 {
            q.enqueue(tracked(v, &drops));
        }
        drop(q);
        assert_eq!(drops.load(Ordering::Relaxed), 20);
    }

    #[test]
    fn set_max_length_validates() {
        let q: BoundedDrainQueue<Item, Full> = BoundedDrainQueue::new(100);
        q.set_max_length(0);
        assert_eq!(q.max_length(), 100);
        q.set_max_length(MAX_LENGTH_CEILING + 1);
        assert_eq!(q.max_length(), 100);
        q.set_max_length(50);
        assert_eq!(q.max_length(), 50);
    }

    #[test]
    fn concurrent_producers_and_drainer() {
        const PRODUCERS: usize = 3;
        const PER_PRODUCER: usize = 30_000;

        let q = Arc::new(DrainQueue::<Item, MultipleWriters>::new());
        let mut handles = Vec::new();
        for p in 0..PRODUCERS {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    q.enqueue(item(p * PER_PRODUCER + i));
                }
            }));
        }

        let drained = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut next = [0usize; PRODUCERS];
                let mut count = 0;
                while count < PRODUCERS * PER_PRODUCER {
                    let mut fragment = q.dequeue_all();
                    while let Some(e) = fragment.pop_front() {
                        let p = e.value / PER_PRODUCER;
                        let i = e.value % PER_PRODUCER;
                        assert!(i >= next[p], "producer {p} went backwards");
                        next[p] = i + 1;
                        count += 1;
                    }
                    thread::yield_now();
                }
                count
            })
        };

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(drained.join().unwrap(), PRODUCERS * PER_PRODUCER);
    }
}
