//! Queue fragments
//!
//! A [`QueueFragment`] is the result of a drain-all dequeue: the entire chain
//! a queue held at one instant, handed to a single consumer. The chain
//! arrives in the order the producing queue built it (LIFO for the
//! concurrent drain queues) and is reversed in place the first time the
//! caller asks for the opposite end.
//!
//! Fragments own their elements. Whatever is not popped, including elements
//! beyond a bounded queue's `trim_to_size` cap, is released on drop, so no
//! element ever leaks.

use core::fmt;
use core::marker::PhantomData;
use core::ptr;
use core::sync::atomic::Ordering::{Acquire, Relaxed};

use crate::queueable::{
    element_of, st_element_of, st_link_of, Link, Queueable, SingleThreadedQueueable, StLink,
};

/// A single-consumer container over a chain of drained elements.
///
/// Obtained from [`DrainQueue::dequeue_all`](crate::queue::DrainQueue::dequeue_all)
/// and [`BoundedDrainQueue::dequeue_all`](crate::queue::BoundedDrainQueue::dequeue_all).
/// Move-only; dropping it releases every element still inside.
pub struct QueueFragment<T: Queueable> {
    /// Head of the chain in the current polarity.
    head: *mut Link,
    /// True if the chain currently runs oldest-first.
    fifo_order: bool,
    /// If >= 0, at most this many elements are reachable through the pop
    /// API; the rest are released on destruction. Negative disables the cap.
    trim_to_size: isize,
    /// Side-chain of elements beyond the cap, discovered during reversal.
    to_delete: *mut Link,
    _marker: PhantomData<Box<T>>,
}

unsafe impl<T: Queueable + Send> Send for QueueFragment<T> {}

impl<T: Queueable> QueueFragment<T> {
    /// An empty fragment.
    pub fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            fifo_order: true,
            trim_to_size: -1,
            to_delete: ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    /// Wraps a chain whose head is the most recently enqueued element.
    /// `trim_to_size < 0` disables trimming.
    pub(crate) fn from_lifo_chain(last: *mut Link, trim_to_size: isize) -> Self {
        debug_assert_ne!(trim_to_size, 0);
        Self {
            head: last,
            fifo_order: false,
            trim_to_size,
            to_delete: ptr::null_mut(),
            _marker: PhantomData,
        }
    }

    /// True if no element is reachable through the pop API.
    pub fn is_empty(&self) -> bool {
        self.head.is_null() || self.trim_to_size == 0
    }

    /// True if the chain currently runs oldest-first.
    pub fn is_fifo(&self) -> bool {
        self.fifo_order
    }

    /// Unlinks and returns the head element in the current polarity.
    fn pop_link(&mut self) -> *mut Link {
        if self.is_empty() {
            return ptr::null_mut();
        }
        let result = self.head;
        unsafe {
            self.head = (*result).load_next(Acquire);
            (*result).store_next(ptr::null_mut(), Relaxed);
        }
        self.trim_to_size -= 1;
        result
    }

    /// Removes an element in whatever order is currently cheapest.
    pub fn pop_any(&mut self) -> Option<Box<T>> {
        let link = self.pop_link();
        if link.is_null() {
            None
        } else {
            Some(unsafe { Box::from_raw(element_of::<T>(link)) })
        }
    }

    /// Removes the element that was enqueued first.
    ///
    /// The first call may reverse the chain in place; afterwards the
    /// fragment stays oldest-first.
    pub fn pop_front(&mut self) -> Option<Box<T>> {
        if !self.fifo_order {
            self.turn();
        }
        self.pop_any()
    }

    /// Removes the element that was enqueued last.
    ///
    /// The first call may reverse the chain in place; afterwards the
    /// fragment stays newest-first.
    pub fn pop_back(&mut self) -> Option<Box<T>> {
        if self.fifo_order {
            self.turn();
        }
        self.pop_any()
    }

    /// Reverses the chain in place and flips the polarity.
    ///
    /// Elements beyond `trim_to_size` fall off the reachable chain here;
    /// they are appended to the `to_delete` side-chain and released when the
    /// fragment is dropped.
    fn turn(&mut self) {
        debug_assert!(
            !self.fifo_order || self.trim_to_size < 0,
            "a trimmed fragment can only be reversed out of its build order"
        );
        if self.head.is_null() {
            self.fifo_order = !self.fifo_order;
            return;
        }

        // Pop the whole reachable chain, re-linking each element to its
        // predecessor. The first element popped keeps its null next and
        // becomes the tail of the reversed chain.
        let first = self.pop_link();
        let mut current = first;
        let mut next = self.pop_link();
        while !next.is_null() {
            let prev = current;
            current = next;
            next = self.pop_link();
            unsafe { (*current).store_next(prev, Relaxed) };
        }

        // Whatever the trim cap cut off is still hanging from `head`.
        let remainder = self.head;
        if !remainder.is_null() {
            unsafe { self.stash_for_deletion(remainder) };
        }
        self.head = current;
        self.fifo_order = !self.fifo_order;
        self.trim_to_size = -1;
    }

    /// Prepends `chain` onto the `to_delete` side-chain.
    unsafe fn stash_for_deletion(&mut self, chain: *mut Link) {
        let mut tail = chain;
        while !(*tail).load_next(Relaxed).is_null() {
            tail = (*tail).load_next(Relaxed);
        }
        (*tail).store_next(self.to_delete, Relaxed);
        self.to_delete = chain;
    }

    /// Converts this fragment into one traversed through the elements'
    /// non-atomic links.
    ///
    /// This is the payoff of the "optimised" flavours: one pass over the
    /// atomic chain builds the single-threaded chain, and every subsequent
    /// pop is atomics-free. The polarity and the trim cap are preserved
    /// (trimmed-off elements are released immediately).
    pub fn into_unsynchronized(mut self) -> StQueueFragment<T>
    where
        T: SingleThreadedQueueable,
    {
        let fifo_order = self.fifo_order;
        let mut head: *mut StLink = ptr::null_mut();
        let mut tail: *mut StLink = ptr::null_mut();
        loop {
            let link = self.pop_link();
            if link.is_null() {
                break;
            }
            unsafe {
                let st = st_link_of(element_of::<T>(link));
                (*st).set_next(ptr::null_mut());
                if tail.is_null() {
                    head = st;
                } else {
                    (*tail).set_next(st);
                }
                tail = st;
            }
        }
        // Dropping `self` releases the to_delete side-chain.
        StQueueFragment {
            head,
            fifo_order,
            _marker: PhantomData,
        }
    }
}

impl<T: Queueable> Default for QueueFragment<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Queueable> fmt::Debug for QueueFragment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFragment")
            .field("empty", &self.is_empty())
            .field("fifo_order", &self.fifo_order)
            .field("trim_to_size", &self.trim_to_size)
            .finish()
    }
}

impl<T: Queueable> Drop for QueueFragment<T> {
    fn drop(&mut self) {
        unsafe {
            let mut current = self.to_delete;
            while !current.is_null() {
                let next = (*current).load_next(Relaxed);
                (*current).store_next(ptr::null_mut(), Relaxed);
                drop(Box::from_raw(element_of::<T>(current)));
                current = next;
            }
            self.to_delete = ptr::null_mut();
        }
        // Release even the elements beyond the trim cap.
        self.trim_to_size = -1;
        while self.pop_any().is_some() {}
    }
}

/// A fragment traversed through non-atomic links.
///
/// Produced by [`SingleThreadedQueue::dequeue_all`](crate::queue::SingleThreadedQueue::dequeue_all)
/// and by [`QueueFragment::into_unsynchronized`].
pub struct StQueueFragment<T: SingleThreadedQueueable> {
    head: *mut StLink,
    fifo_order: bool,
    _marker: PhantomData<Box<T>>,
}

unsafe impl<T: SingleThreadedQueueable + Send> Send for StQueueFragment<T> {}

impl<T: SingleThreadedQueueable> StQueueFragment<T> {
    /// An empty fragment.
    pub fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            fifo_order: true,
            _marker: PhantomData,
        }
    }

    pub(crate) fn from_chain(head: *mut StLink, fifo_order: bool) -> Self {
        Self {
            head,
            fifo_order,
            _marker: PhantomData,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// True if the chain currently runs oldest-first.
    pub fn is_fifo(&self) -> bool {
        self.fifo_order
    }

    fn pop_link(&mut self) -> *mut StLink {
        if self.head.is_null() {
            return ptr::null_mut();
        }
        let result = self.head;
        unsafe {
            self.head = (*result).get_next();
            (*result).set_next(ptr::null_mut());
        }
        result
    }

    /// Removes an element in whatever order is currently cheapest.
    pub fn pop_any(&mut self) -> Option<Box<T>> {
        let link = self.pop_link();
        if link.is_null() {
            None
        } else {
            Some(unsafe { Box::from_raw(st_element_of::<T>(link)) })
        }
    }

    /// Removes the element that was enqueued first, reversing once if needed.
    pub fn pop_front(&mut self) -> Option<Box<T>> {
        if !self.fifo_order {
            self.turn();
        }
        self.pop_any()
    }

    /// Removes the element that was enqueued last, reversing once if needed.
    pub fn pop_back(&mut self) -> Option<Box<T>> {
        if self.fifo_order {
            self.turn();
        }
        self.pop_any()
    }

    fn turn(&mut self) {
        if self.head.is_null() {
            self.fifo_order = !self.fifo_order;
            return;
        }
        let first = self.pop_link();
        let mut current = first;
        let mut next = self.pop_link();
        while !next.is_null() {
            let prev = current;
            current = next;
            next = self.pop_link();
            unsafe { (*current).set_next(prev) };
        }
        self.head = current;
        self.fifo_order = !self.fifo_order;
    }
}

impl<T: SingleThreadedQueueable> Default for StQueueFragment<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SingleThreadedQueueable> fmt::Debug for StQueueFragment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StQueueFragment")
            .field("empty", &self.is_empty())
            .field("fifo_order", &self.fifo_order)
            .finish()
    }
}

impl<T: SingleThreadedQueueable> Drop for StQueueFragment<T> {
    fn drop(&mut self) {
        while self.pop_any().is_some() {}
    }
}
