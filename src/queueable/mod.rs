//! Queueable element bases
//!
//! The queues in this crate are *intrusive*: the link fields live inside the
//! element itself, so enqueueing never allocates. An element type opts into
//! a queueability flavour by embedding the matching link records and
//! implementing the offset-carrying traits:
//!
//! | Flavour         | Embedded fields                 | Traits                                      |
//! |-----------------|---------------------------------|---------------------------------------------|
//! | single-threaded | [`StLink`]                      | [`SingleThreadedQueueable`]                 |
//! | most            | [`Link`]                        | [`Queueable`]                               |
//! | most-optimised  | [`Link`] + [`StLink`]           | [`Queueable`] + [`SingleThreadedQueueable`] |
//! | full            | [`Link`] + [`ChunkLink`]        | [`Queueable`] + [`FullQueueable`]           |
//! | full-optimised  | all three                       | all three                                   |
//!
//! The "most" flavour works in every queue except the bounded drain-all
//! queue, which additionally needs the [`ChunkLink`] of the "full" flavour.
//! The single-threaded link doubles the per-element link cost but lets a
//! fragment drained from a concurrent queue be traversed without atomics
//! (see [`QueueFragment::into_unsynchronized`](crate::fragment::QueueFragment::into_unsynchronized)).
//!
//! # Example
//!
//! ```
//! use linkflux::queueable::{Link, Queueable};
//! use std::mem::offset_of;
//!
//! struct Sample {
//!     link: Link,
//!     value: u64,
//! }
//!
//! unsafe impl Queueable for Sample {
//!     const LINK_OFFSET: usize = offset_of!(Sample, link);
//! }
//! ```
//!
//! # Safety contract
//!
//! Implementing the traits is `unsafe` because the queues navigate between
//! element and link through the declared offset. An implementation promises
//! that the offset names a field of the right link type within `Self`, that
//! the element is never placed in two queues at once, and that the link
//! fields are never touched while the element is queued.

use core::cell::UnsafeCell;
use core::fmt;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicU64, Ordering};

use crate::tagged::TaggedPtr;

/// The atomic next-pointer of the "most" flavour.
///
/// Null whenever the element is outside every queue. Written only by the
/// thread currently publishing the element as the new tail, or by the reader
/// consuming it.
#[repr(align(8))]
pub struct Link {
    next: AtomicPtr<Link>,
}

impl Link {
    #[inline]
    pub const fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    #[inline]
    pub(crate) fn load_next(&self, order: Ordering) -> *mut Link {
        self.next.load(order)
    }

    #[inline]
    pub(crate) fn store_next(&self, next: *mut Link, order: Ordering) {
        self.next.store(next, order);
    }

    /// True if this element is currently linked into a queue or fragment.
    #[inline]
    pub fn is_linked(&self) -> bool {
        !self.next.load(Ordering::Relaxed).is_null()
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("linked", &self.is_linked())
            .finish()
    }
}

/// The non-atomic next-pointer of the single-threaded flavour.
pub struct StLink {
    next: UnsafeCell<*mut StLink>,
}

// The raw pointer is only ever dereferenced by the single thread that owns
// the queue or fragment containing the element.
unsafe impl Send for StLink {}

impl StLink {
    #[inline]
    pub const fn new() -> Self {
        Self {
            next: UnsafeCell::new(ptr::null_mut()),
        }
    }

    #[inline]
    pub(crate) fn get_next(&self) -> *mut StLink {
        unsafe { *self.next.get() }
    }

    #[inline]
    pub(crate) fn set_next(&self, next: *mut StLink) {
        unsafe { *self.next.get() = next }
    }
}

impl Default for StLink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StLink")
            .field("linked", &!self.get_next().is_null())
            .finish()
    }
}

/// The auxiliary tagged link of the "full" flavour.
///
/// Inside a bounded drain-all queue it points at the `Link` of the element
/// that started the current chunk, stamped with the chunk length. The stamp
/// wraps modulo `2^19`.
#[repr(align(8))]
pub struct ChunkLink {
    tagged: AtomicU64,
}

impl ChunkLink {
    #[inline]
    pub const fn new() -> Self {
        Self {
            tagged: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn load(&self, order: Ordering) -> TaggedPtr<19> {
        TaggedPtr::from_raw(self.tagged.load(order))
    }

    #[inline]
    pub(crate) fn store(&self, value: TaggedPtr<19>, order: Ordering) {
        self.tagged.store(value.into_raw(), order);
    }
}

impl Default for ChunkLink {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChunkLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.load(Ordering::Relaxed);
        f.debug_struct("ChunkLink")
            .field("chunk_head", &t.ptr())
            .field("chunk_len", &t.stamp())
            .finish()
    }
}

/// Elements that embed a [`Link`] and may enter the concurrent queues.
///
/// # Safety
///
/// `LINK_OFFSET` must be the byte offset of a [`Link`] field within `Self`
/// (use [`core::mem::offset_of!`]). See the module docs for the full
/// contract.
pub unsafe trait Queueable: Sized {
    const LINK_OFFSET: usize;
}

/// Elements that embed an [`StLink`] and may enter single-threaded queues
/// and unsynchronized fragments.
///
/// # Safety
///
/// `ST_LINK_OFFSET` must be the byte offset of an [`StLink`] field within
/// `Self`.
pub unsafe trait SingleThreadedQueueable: Sized {
    const ST_LINK_OFFSET: usize;
}

/// Elements that additionally embed a [`ChunkLink`], required by the
/// bounded drain-all queue.
///
/// # Safety
///
/// `CHUNK_LINK_OFFSET` must be the byte offset of a [`ChunkLink`] field
/// within `Self`.
pub unsafe trait FullQueueable: Queueable {
    const CHUNK_LINK_OFFSET: usize;
}

/// The process-wide past-the-end sentinel for fast queues.
///
/// Fast queues initialise their head's next-field to this link; observing it
/// (or null) as an element's successor means "nothing dequeueable here". The
/// sentinel is compared by identity only and is never dereferenced as an
/// element.
static TERMINATOR: Link = Link::new();

#[inline]
pub(crate) fn terminator() -> *mut Link {
    &TERMINATOR as *const Link as *mut Link
}

#[inline]
pub(crate) fn is_end(link: *mut Link) -> bool {
    link.is_null() || link == terminator()
}

#[inline]
pub(crate) unsafe fn link_of<T: Queueable>(element: *mut T) -> *mut Link {
    element.cast::<u8>().add(T::LINK_OFFSET).cast()
}

#[inline]
pub(crate) unsafe fn element_of<T: Queueable>(link: *mut Link) -> *mut T {
    link.cast::<u8>().sub(T::LINK_OFFSET).cast()
}

#[inline]
pub(crate) unsafe fn st_link_of<T: SingleThreadedQueueable>(element: *mut T) -> *mut StLink {
    element.cast::<u8>().add(T::ST_LINK_OFFSET).cast()
}

#[inline]
pub(crate) unsafe fn st_element_of<T: SingleThreadedQueueable>(link: *mut StLink) -> *mut T {
    link.cast::<u8>().sub(T::ST_LINK_OFFSET).cast()
}

#[inline]
pub(crate) unsafe fn chunk_link_of<T: FullQueueable>(element: *mut T) -> *mut ChunkLink {
    element.cast::<u8>().add(T::CHUNK_LINK_OFFSET).cast()
}
