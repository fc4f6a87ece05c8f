//! # LinkFlux
//!
//! Intrusive lock-free queues and an array-chunked concurrent set for
//! real-time code paths.
//!
//! ## Features
//!
//! - **Intrusive queues**: link fields live inside your element type, so an
//!   enqueue never allocates; elements move in and out as `Box`es
//! - **Concurrency as a type**: pick who may enqueue and dequeue in parallel
//!   with a marker parameter; the queue compiles down to exactly the CAS
//!   traffic that level needs
//! - **Three dequeue modes**: strict FIFO, FIFO with a one-element floor for
//!   cheaper operations, and drain-everything-at-once fragments
//! - **Guiding bounds**: bounded queues drop the oldest elements past a
//!   runtime-adjustable maximum, with capped reclamation work per enqueue
//! - **Concurrent set**: lock-free iteration over chunked array storage
//!   while other threads add and remove under a mutex
//! - **Operation counters**: every concurrent queue tracks enqueued,
//!   dequeued, dropped and contended operations via the
//!   [`MetricsCollector`] trait
//!
//! ## Quick start
//!
//! ```rust
//! use linkflux::queue::{FastFifoQueue, MultipleWriters};
//! use linkflux::queueable::{Link, Queueable};
//! use std::mem::offset_of;
//!
//! struct Job {
//!     link: Link,
//!     id: u32,
//! }
//!
//! unsafe impl Queueable for Job {
//!     const LINK_OFFSET: usize = offset_of!(Job, link);
//! }
//!
//! let queue: FastFifoQueue<Job, MultipleWriters> = FastFifoQueue::new();
//! queue.enqueue(Box::new(Job { link: Link::new(), id: 1 }));
//! queue.enqueue(Box::new(Job { link: Link::new(), id: 2 }));
//!
//! assert_eq!(queue.dequeue().map(|job| job.id), Some(1));
//! // Fast queues keep the newest element as a floor until more arrive.
//! assert!(queue.dequeue().is_none());
//! ```
//!
//! ## Choosing a queue
//!
//! | Type | Producers | Consumers | Drains empty | Bounded |
//! |------|-----------|-----------|--------------|---------|
//! | [`SingleThreadedQueue`] | one thread total | — | yes | wrapper |
//! | [`FifoQueue`] | per marker | per marker | yes | no |
//! | [`FastFifoQueue`] | per marker | per marker | floor of 1 | no |
//! | [`BoundedFifoQueue`] | per marker | per marker | yes | yes |
//! | [`BoundedFastFifoQueue`] | per marker | per marker | floor of 1 | yes |
//! | [`DrainQueue`] | per marker | fragment | yes | no |
//! | [`BoundedDrainQueue`] | per marker | fragment | yes | yes |
//!
//! ## Non-blocking behavior
//!
//! No operation parks a thread. Producers publish in two phases (exchange
//! the tail, then link the predecessor), so a reader can briefly observe a
//! non-empty queue as empty; it returns `None` instead of spinning and the
//! caller retries at its own pace. Bounded queues may transiently overshoot
//! their maximum under contention; every admitted overflow is reclaimed by a
//! later enqueue.

pub mod fragment;
pub mod metrics;
pub mod queue;
pub mod queueable;
pub mod set;
pub mod tagged;

pub use crate::fragment::{QueueFragment, StQueueFragment};
pub use crate::metrics::{MetricsCollector, QueueMetrics};
pub use crate::queue::{
    BoundedDrainQueue, BoundedFastFifoQueue, BoundedFifoQueue, BoundedSingleThreadedQueue,
    DrainQueue, FastFifoQueue, FifoQueue, SingleThreadedQueue,
};
pub use crate::queue::{Concurrency, Full, MultipleReaders, MultipleWriters, SingleReaderAndWriter};
pub use crate::queueable::{
    ChunkLink, FullQueueable, Link, Queueable, SingleThreadedQueueable, StLink,
};
pub use crate::set::{
    AllowDuplicates, AllowDuplicatesFast, ChunkSet, DuplicatePolicy, NoDuplicates, NullSentinel,
    SingleThreadedMutex,
};
