//! Unbounded concurrent FIFO queues
//!
//! Both queues here share the same enqueue protocol: exchange the `last`
//! pointer, then write the predecessor's next-field. The exchange makes the
//! writer's claim; the link write makes the element visible. A reader that
//! catches a writer between the two phases sees a null next on a non-tail
//! element and reports empty rather than spin.
//!
//! They differ on the dequeue side. [`FastFifoQueue`] refuses to hand out an
//! element whose next-field is still the end marker, which keeps the most
//! recently enqueued element in the queue permanently (floor of one) but
//! needs no extra machinery. [`FifoQueue`] can drain completely: when the
//! reader sees a single element left it enqueues an internal filler link
//! behind it, which makes the real element a non-tail and therefore
//! dequeueable; the filler is skipped and recycled on its way out.

use core::fmt;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use core::sync::atomic::{AtomicBool, AtomicPtr};

use crossbeam_utils::CachePadded;

use crate::metrics::{AtomicMetrics, MetricsCollector, QueueMetrics};
use crate::queue::Concurrency;
use crate::queueable::{element_of, is_end, link_of, terminator, Link, Queueable};
use crate::tagged::{bump_stamp, AtomicTaggedPtr, TaggedPtr};

/// Unbounded FIFO queue that can drain to empty.
///
/// `MIN_ELEMENTS_IN_QUEUE` is 0: every enqueued element is eventually
/// dequeueable. The price is the internal filler protocol on the reader
/// side.
pub struct FifoQueue<T: Queueable, C: Concurrency> {
    /// Tail claim word. Always an atomic exchange, whatever `C` says: the
    /// reader's filler insertion competes with producers.
    last: CachePadded<AtomicPtr<Link>>,
    /// Head word; the stamp counts dequeued links and defeats ABA.
    first: CachePadded<AtomicTaggedPtr<19>>,
    /// Queue-owned dummy element; enqueued by readers so the true tail
    /// becomes dequeueable.
    filler: Box<Link>,
    /// True while the filler is somewhere in the chain.
    filler_enqueued: AtomicBool,
    metrics: AtomicMetrics,
    _marker: PhantomData<(Box<T>, C)>,
}

unsafe impl<T: Queueable + Send, C: Concurrency> Send for FifoQueue<T, C> {}
unsafe impl<T: Queueable + Send, C: Concurrency> Sync for FifoQueue<T, C> {}

impl<T: Queueable, C: Concurrency> FifoQueue<T, C> {
    /// Elements a dequeue can never reach: none for this queue.
    pub const MIN_ELEMENTS_IN_QUEUE: usize = 0;

    pub fn new() -> Self {
        let filler = Box::new(Link::new());
        let filler_ptr = &*filler as *const Link as *mut Link;
        Self {
            last: CachePadded::new(AtomicPtr::new(filler_ptr)),
            first: CachePadded::new(AtomicTaggedPtr::new(TaggedPtr::new(filler_ptr, 0))),
            filler,
            filler_enqueued: AtomicBool::new(true),
            metrics: AtomicMetrics::new(),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn filler_ptr(&self) -> *mut Link {
        &*self.filler as *const Link as *mut Link
    }

    /// Adds `element` to the end of the queue, taking ownership.
    ///
    /// Callable concurrently with other producers only if `C` permits.
    pub fn enqueue(&self, element: Box<T>) {
        let raw = Box::into_raw(element);
        let link = unsafe { link_of(raw) };
        debug_assert!(unsafe { !(*link).is_linked() });
        self.enqueue_raw(link);
        self.metrics.record_enqueue();
    }

    fn enqueue_raw(&self, link: *mut Link) {
        let prev = self.last.swap(link, AcqRel);
        debug_assert_ne!(prev, link);
        unsafe { (*prev).store_next(link, Release) };
    }

    /// Removes and returns the first element.
    ///
    /// Returns `None` when the queue is empty *or* when a producer has
    /// claimed the tail but not yet linked its element (the visibility gap);
    /// callers retry at their own rhythm.
    pub fn dequeue(&self) -> Option<Box<T>> {
        let filler = self.filler_ptr();
        let mut current = self.first.load(Acquire);
        loop {
            let link = current.ptr();
            let mut next = unsafe { (*link).load_next(Acquire) };
            if next.is_null() {
                // Last element in the chain. Enqueue the filler behind it so
                // it stops being the tail, unless the filler is already out.
                if link != filler && !self.filler_enqueued.swap(true, AcqRel) {
                    self.enqueue_raw(filler);
                    next = unsafe { (*link).load_next(Acquire) };
                }
                if next.is_null() {
                    return None;
                }
            }
            let new_first = TaggedPtr::new(next, bump_stamp::<19>(current.stamp()));
            if link == filler {
                match self.first.compare_exchange(current, new_first, AcqRel, Acquire) {
                    Ok(()) => {
                        unsafe { (*link).store_next(ptr::null_mut(), Relaxed) };
                        self.filler_enqueued.store(false, Release);
                        current = new_first;
                    }
                    Err(observed) => {
                        self.metrics.record_contention();
                        current = observed;
                    }
                }
            } else {
                match self.first.compare_exchange(current, new_first, AcqRel, Acquire) {
                    Ok(()) => {
                        unsafe { (*link).store_next(ptr::null_mut(), Relaxed) };
                        self.metrics.record_dequeue();
                        return Some(unsafe { Box::from_raw(element_of::<T>(link)) });
                    }
                    Err(observed) => {
                        self.metrics.record_contention();
                        current = observed;
                    }
                }
            }
        }
    }
}

impl<T: Queueable, C: Concurrency> Default for FifoQueue<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Queueable, C: Concurrency> fmt::Debug for FifoQueue<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoQueue")
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl<T: Queueable, C: Concurrency> MetricsCollector for FifoQueue<T, C> {
    fn metrics(&self) -> QueueMetrics {
        self.metrics.snapshot()
    }

    fn reset_metrics(&self) {
        self.metrics.reset();
    }
}

impl<T: Queueable, C: Concurrency> Drop for FifoQueue<T, C> {
    fn drop(&mut self) {
        let filler = self.filler_ptr();
        let mut current = self.first.load(Relaxed).ptr();
        while !current.is_null() {
            unsafe {
                let next = (*current).load_next(Relaxed);
                (*current).store_next(ptr::null_mut(), Relaxed);
                if current != filler {
                    drop(Box::from_raw(element_of::<T>(current)));
                }
                current = next;
            }
        }
    }
}

/// Unbounded FIFO queue with a permanent one-element floor.
///
/// `MIN_ELEMENTS_IN_QUEUE` is 1: once anything has been enqueued, the most
/// recent element stays in the queue until a newer one arrives. In exchange,
/// dequeue is a single CAS with no filler traffic.
pub struct FastFifoQueue<T: Queueable, C: Concurrency> {
    last: CachePadded<AtomicPtr<Link>>,
    /// Head word, null until the first successful dequeue; the stamp defeats
    /// ABA between competing readers.
    first: CachePadded<AtomicTaggedPtr<16>>,
    /// Queue-owned entry link; its next-field starts at the terminator and
    /// is overwritten by the first enqueue.
    initial: Box<Link>,
    metrics: AtomicMetrics,
    _marker: PhantomData<(Box<T>, C)>,
}

unsafe impl<T: Queueable + Send, C: Concurrency> Send for FastFifoQueue<T, C> {}
unsafe impl<T: Queueable + Send, C: Concurrency> Sync for FastFifoQueue<T, C> {}

impl<T: Queueable, C: Concurrency> FastFifoQueue<T, C> {
    /// The most recently enqueued element is not dequeueable.
    pub const MIN_ELEMENTS_IN_QUEUE: usize = 1;

    pub fn new() -> Self {
        let initial = Box::new(Link::new());
        initial.store_next(terminator(), Relaxed);
        let initial_ptr = &*initial as *const Link as *mut Link;
        Self {
            last: CachePadded::new(AtomicPtr::new(initial_ptr)),
            first: CachePadded::new(AtomicTaggedPtr::new(TaggedPtr::new(ptr::null_mut(), 0))),
            initial,
            metrics: AtomicMetrics::new(),
            _marker: PhantomData,
        }
    }

    /// Adds `element` to the end of the queue, taking ownership.
    pub fn enqueue(&self, element: Box<T>) {
        let raw = Box::into_raw(element);
        let link = unsafe { link_of(raw) };
        debug_assert!(unsafe { (*link).load_next(Relaxed).is_null() });
        let prev = if C::CONCURRENT_ENQUEUE {
            self.last.swap(link, AcqRel)
        } else {
            let prev = self.last.load(Relaxed);
            self.last.store(link, Relaxed);
            prev
        };
        debug_assert_ne!(prev, link);
        unsafe { (*prev).store_next(link, Release) };
        self.metrics.record_enqueue();
    }

    /// Removes and returns the first element.
    ///
    /// Returns `None` when no element is dequeueable, including when only
    /// the floor element remains.
    pub fn dequeue(&self) -> Option<Box<T>> {
        let mut current = self.first.load(Acquire);
        let mut link = if current.ptr().is_null() {
            self.initial.load_next(Acquire)
        } else {
            current.ptr()
        };
        loop {
            if is_end(link) {
                return None;
            }
            let next = unsafe { (*link).load_next(Acquire) };
            if is_end(next) {
                return None;
            }
            let new_first = TaggedPtr::new(next, bump_stamp::<16>(current.stamp()));
            match self.first.compare_exchange(current, new_first, AcqRel, Acquire) {
                Ok(()) => {
                    unsafe { (*link).store_next(ptr::null_mut(), Relaxed) };
                    self.metrics.record_dequeue();
                    return Some(unsafe { Box::from_raw(element_of::<T>(link)) });
                }
                Err(observed) => {
                    self.metrics.record_contention();
                    current = observed;
                    link = current.ptr();
                }
            }
        }
    }
}

impl<T: Queueable, C: Concurrency> Default for FastFifoQueue<T, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Queueable, C: Concurrency> fmt::Debug for FastFifoQueue<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FastFifoQueue")
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl<T: Queueable, C: Concurrency> MetricsCollector for FastFifoQueue<T, C> {
    fn metrics(&self) -> QueueMetrics {
        self.metrics.snapshot()
    }

    fn reset_metrics(&self) {
        self.metrics.reset();
    }
}

impl<T: Queueable, C: Concurrency> Drop for FastFifoQueue<T, C> {
    fn drop(&mut self) {
        let head = self.first.load(Relaxed).ptr();
        let mut current = if head.is_null() {
            self.initial.load_next(Relaxed)
        } else {
            head
        };
        while !is_end(current) {
            unsafe {
                let next = (*current).load_next(Relaxed);
                (*current).store_next(ptr::null_mut(), Relaxed);
                drop(Box::from_raw(element_of::<T>(current)));
                current = next;
            }
        }
    }
}
