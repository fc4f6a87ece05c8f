//! Single-threaded queues
//!
//! The cheapest rendition of the queue family: plain pointers, no atomics,
//! `&mut self` everywhere. Elements use the single-threaded link flavour.

use core::fmt;
use core::marker::PhantomData;
use core::ptr;

use crate::fragment::StQueueFragment;
use crate::queue::MAX_LENGTH_CEILING;
use crate::queueable::{st_element_of, st_link_of, SingleThreadedQueueable, StLink};

/// An unbounded FIFO queue for one thread.
pub struct SingleThreadedQueue<T: SingleThreadedQueueable> {
    /// First element, null when empty.
    first: *mut StLink,
    /// Last element, null when empty.
    last: *mut StLink,
    _marker: PhantomData<Box<T>>,
}

unsafe impl<T: SingleThreadedQueueable + Send> Send for SingleThreadedQueue<T> {}

impl<T: SingleThreadedQueueable> SingleThreadedQueue<T> {
    /// Elements a dequeue can never reach: none for this queue.
    pub const MIN_ELEMENTS_IN_QUEUE: usize = 0;

    pub fn new() -> Self {
        Self {
            first: ptr::null_mut(),
            last: ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    /// Adds `element` to the end of the queue, taking ownership.
    pub fn enqueue(&mut self, element: Box<T>) {
        let raw = Box::into_raw(element);
        let link = unsafe { st_link_of(raw) };
        debug_assert!(unsafe { (*link).get_next().is_null() });
        if self.last.is_null() {
            self.first = link;
        } else {
            unsafe { (*self.last).set_next(link) };
        }
        self.last = link;
    }

    /// Removes and returns the first element, if any.
    pub fn dequeue(&mut self) -> Option<Box<T>> {
        if self.first.is_null() {
            return None;
        }
        let result = self.first;
        unsafe {
            let next = (*result).get_next();
            if next.is_null() {
                self.last = ptr::null_mut();
            }
            self.first = next;
            (*result).set_next(ptr::null_mut());
            Some(Box::from_raw(st_element_of::<T>(result)))
        }
    }

    /// Hands the entire current chain to a fragment, leaving the queue
    /// empty. The fragment is already oldest-first.
    pub fn dequeue_all(&mut self) -> StQueueFragment<T> {
        let fragment = StQueueFragment::from_chain(self.first, true);
        self.first = ptr::null_mut();
        self.last = ptr::null_mut();
        fragment
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_null()
    }
}

impl<T: SingleThreadedQueueable> Default for SingleThreadedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SingleThreadedQueueable> fmt::Debug for SingleThreadedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleThreadedQueue")
            .field("empty", &self.is_empty())
            .finish()
    }
}

impl<T: SingleThreadedQueueable> Drop for SingleThreadedQueue<T> {
    fn drop(&mut self) {
        while self.dequeue().is_some() {}
    }
}

/// A [`SingleThreadedQueue`] with a maximum length.
///
/// The wrapper counts elements; an enqueue that would exceed the maximum
/// first dequeues and drops the head. Unlike the concurrent bounded queues
/// the bound here is exact.
pub struct BoundedSingleThreadedQueue<T: SingleThreadedQueueable> {
    inner: SingleThreadedQueue<T>,
    element_count: u32,
    max_length: u32,
}

impl<T: SingleThreadedQueueable> BoundedSingleThreadedQueue<T> {
    pub const MIN_ELEMENTS_IN_QUEUE: usize = 0;

    /// Creates a queue bounded to `max_length` elements.
    /// Values outside `1..=500_000` are clamped into that range.
    pub fn new(max_length: u32) -> Self {
        Self {
            inner: SingleThreadedQueue::new(),
            element_count: 0,
            max_length: max_length.clamp(1, MAX_LENGTH_CEILING),
        }
    }

    /// Adds `element`, dropping the head first if the queue is full.
    pub fn enqueue(&mut self, element: Box<T>) {
        self.inner.enqueue(element);
        self.element_count += 1;
        if self.element_count > self.max_length {
            drop(self.dequeue());
        }
    }

    pub fn dequeue(&mut self) -> Option<Box<T>> {
        let element = self.inner.dequeue();
        if element.is_some() {
            self.element_count -= 1;
        }
        element
    }

    /// Drains everything into a fragment; the count resets to zero.
    pub fn dequeue_all(&mut self) -> StQueueFragment<T> {
        self.element_count = 0;
        self.inner.dequeue_all()
    }

    /// Changes the guiding maximum. Values outside `1..=500_000` are logged
    /// and ignored; shrinking drops head elements immediately.
    pub fn set_max_length(&mut self, max_length: u32) {
        if max_length == 0 || max_length > MAX_LENGTH_CEILING {
            log::error!(
                "invalid queue length {max_length}; keeping {}",
                self.max_length
            );
            return;
        }
        self.max_length = max_length;
        while self.element_count > self.max_length {
            drop(self.dequeue());
        }
    }

    pub fn max_length(&self) -> u32 {
        self.max_length
    }

    pub fn len(&self) -> u32 {
        self.element_count
    }

    pub fn is_empty(&self) -> bool {
        self.element_count == 0
    }
}

impl<T: SingleThreadedQueueable> fmt::Debug for BoundedSingleThreadedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedSingleThreadedQueue")
            .field("len", &self.element_count)
            .field("max_length", &self.max_length)
            .finish()
    }
}
