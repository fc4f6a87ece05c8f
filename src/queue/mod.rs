//! Queue implementations
//!
//! All queues are intrusive, singly-linked and non-blocking. They differ
//! along three axes:
//!
//! - **Concurrency**: who may enqueue/dequeue in parallel, expressed as a
//!   marker type parameter ([`SingleReaderAndWriter`], [`MultipleWriters`],
//!   [`MultipleReaders`], [`Full`]). The single-threaded queues cover the
//!   remaining "none" level with a `&mut self` API.
//! - **Dequeue mode**: single-element FIFO ([`FifoQueue`]), FIFO with a
//!   permanent one-element floor ([`FastFifoQueue`]), or drain-everything
//!   ([`DrainQueue`], returning a [`QueueFragment`](crate::fragment::QueueFragment)).
//! - **Bounded**: bounded variants enforce a *guiding* maximum length by
//!   dropping the oldest elements on enqueue; the bound tolerates transient
//!   overshoot under contention.
//!
//! | Queue                       | Floor | Bounded | Element flavour |
//! |-----------------------------|-------|---------|-----------------|
//! | [`SingleThreadedQueue`]     | 0     | wrapper | single-threaded |
//! | [`FifoQueue`]               | 0     | no      | most            |
//! | [`FastFifoQueue`]           | 1     | no      | most            |
//! | [`BoundedFifoQueue`]        | 0     | yes     | most            |
//! | [`BoundedFastFifoQueue`]    | 1     | yes     | most            |
//! | [`DrainQueue`]              | 0     | no      | most            |
//! | [`BoundedDrainQueue`]       | 0     | yes     | full            |
//!
//! "Floor 1" means the most recently enqueued element is not dequeueable
//! until another element arrives; such queues trade that for cheaper
//! operations. Each queue type exposes the floor as
//! `MIN_ELEMENTS_IN_QUEUE`.
//!
//! Ordering guarantees: enqueue order is preserved per producer; there is no
//! ordering between different producers. Enqueue publishes in two phases
//! (exchange the tail, then link the predecessor), so a reader can observe a
//! logically non-empty queue as empty for the duration of that gap:
//! `dequeue` returns `None` and the caller retries at its own rhythm.

mod bounded;
mod drain;
mod fifo;
mod single_threaded;

#[cfg(test)]
mod proptests;

pub use bounded::{BoundedFastFifoQueue, BoundedFifoQueue};
pub use drain::{BoundedDrainQueue, DrainQueue};
pub use fifo::{FastFifoQueue, FifoQueue};
pub use single_threaded::{BoundedSingleThreadedQueue, SingleThreadedQueue};

/// Upper limit any bounded queue accepts for its guiding maximum length.
pub const MAX_LENGTH_CEILING: u32 = 500_000;

/// Over-bound elements reclaimed per enqueue pass, at most. Caps the work a
/// single enqueue can absorb and leaves the rest to subsequent writers.
pub const TRIM_BATCH_CAP: u32 = 10;

/// Stamp width used by the bounded queues' operation counters.
pub const STAMP_BITS: u32 = 19;

mod sealed {
    pub trait Sealed {}
}

/// Concurrency level of a queue, as a type.
///
/// The constants select the internal strategy: whether the tail is updated
/// with an atomic exchange or a plain store, and whether dequeue must assume
/// competing readers.
pub trait Concurrency: sealed::Sealed + 'static {
    /// Multiple threads may enqueue concurrently.
    const CONCURRENT_ENQUEUE: bool;
    /// Multiple threads may dequeue concurrently.
    const CONCURRENT_DEQUEUE: bool;
}

/// One producer thread, one (other) consumer thread.
pub struct SingleReaderAndWriter;

/// Any number of producers, a single consumer.
pub struct MultipleWriters;

/// A single producer, any number of consumers.
pub struct MultipleReaders;

/// Any number of producers and consumers.
pub struct Full;

impl sealed::Sealed for SingleReaderAndWriter {}
impl sealed::Sealed for MultipleWriters {}
impl sealed::Sealed for MultipleReaders {}
impl sealed::Sealed for Full {}

impl Concurrency for SingleReaderAndWriter {
    const CONCURRENT_ENQUEUE: bool = false;
    const CONCURRENT_DEQUEUE: bool = false;
}

impl Concurrency for MultipleWriters {
    const CONCURRENT_ENQUEUE: bool = true;
    const CONCURRENT_DEQUEUE: bool = false;
}

impl Concurrency for MultipleReaders {
    const CONCURRENT_ENQUEUE: bool = false;
    const CONCURRENT_DEQUEUE: bool = true;
}

impl Concurrency for Full {
    const CONCURRENT_ENQUEUE: bool = true;
    const CONCURRENT_DEQUEUE: bool = true;
}
