//! Tagged pointer primitives
//!
//! A [`TaggedPtr`] packs a pointer and an N-bit stamp into a single `u64` so
//! that both can be exchanged with one atomic compare-and-swap. The stamp
//! serves two purposes in this crate:
//!
//! - It defeats the ABA problem in head-CAS loops: a dequeued element may be
//!   re-enqueued at the same address before a reader's CAS lands, but the
//!   stamp will have advanced.
//! - In bounded queues it counts enqueue/dequeue operations, so the distance
//!   between the tail and head stamps is the current queue length.
//!
//! ## Layout
//!
//! Only the 64-bit layout is implemented. The upper 16 bits of a canonical
//! user-space pointer are free and always carry the high bits of the stamp.
//! For stamps wider than 16 bits the remaining bits are stored in the
//! pointer's low alignment bits, which requires the pointee to be aligned to
//! `1 << (BITS - 16)` bytes. With the crate-wide 19-bit stamps this means
//! 8-byte alignment, which [`Link`](crate::queueable::Link) guarantees.

use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::queueable::Link;

#[cfg(not(target_pointer_width = "64"))]
compile_error!("linkflux tagged pointers require a 64-bit target");

/// A `(pointer, stamp)` pair packed into one machine word.
///
/// `BITS` is the stamp width; the stamp wraps modulo `2^BITS`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TaggedPtr<const BITS: u32> {
    raw: u64,
    _marker: PhantomData<*mut Link>,
}

impl<const BITS: u32> TaggedPtr<BITS> {
    /// Mask covering every valid stamp value.
    pub const STAMP_MASK: u32 = (1u32 << BITS) - 1;

    /// Stamp bits carried in the pointer's low alignment bits.
    const LOW_BITS: u32 = if BITS > 16 { BITS - 16 } else { 0 };
    const LOW_MASK: u64 = (1u64 << Self::LOW_BITS) - 1;
    /// Mask extracting the pointer value itself.
    const PTR_MASK: u64 = 0x0000_FFFF_FFFF_FFFF & !Self::LOW_MASK;

    /// Packs `ptr` and `stamp`. `stamp` is truncated to `BITS` bits.
    #[inline]
    pub fn new(ptr: *mut Link, stamp: u32) -> Self {
        debug_assert!(BITS >= 1 && BITS <= 19, "unsupported stamp width");
        debug_assert_eq!(
            ptr as u64 & !Self::PTR_MASK,
            0,
            "pointer not canonical or insufficiently aligned for the stamp width"
        );
        let stamp = (stamp & Self::STAMP_MASK) as u64;
        let raw = ((stamp >> Self::LOW_BITS) << 48) | (ptr as u64) | (stamp & Self::LOW_MASK);
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn into_raw(self) -> u64 {
        self.raw
    }

    /// The pointer half of the word.
    #[inline]
    pub fn ptr(self) -> *mut Link {
        (self.raw & Self::PTR_MASK) as *mut Link
    }

    /// The stamp half of the word.
    #[inline]
    pub fn stamp(self) -> u32 {
        (((self.raw >> 48) << Self::LOW_BITS) | (self.raw & Self::LOW_MASK)) as u32
    }
}

impl<const BITS: u32> fmt::Debug for TaggedPtr<BITS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedPtr")
            .field("ptr", &self.ptr())
            .field("stamp", &self.stamp())
            .finish()
    }
}

/// An atomically updatable [`TaggedPtr`].
///
/// The compare-and-swap exchanges pointer and stamp together; it is the only
/// mutator used on contended paths.
pub struct AtomicTaggedPtr<const BITS: u32> {
    raw: AtomicU64,
}

impl<const BITS: u32> AtomicTaggedPtr<BITS> {
    #[inline]
    pub fn new(value: TaggedPtr<BITS>) -> Self {
        Self {
            raw: AtomicU64::new(value.into_raw()),
        }
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> TaggedPtr<BITS> {
        TaggedPtr::from_raw(self.raw.load(order))
    }

    #[inline]
    pub fn store(&self, value: TaggedPtr<BITS>, order: Ordering) {
        self.raw.store(value.into_raw(), order);
    }

    /// Compare-and-swap of the whole word. On failure the observed value is
    /// returned so callers can retry without reloading.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: TaggedPtr<BITS>,
        new: TaggedPtr<BITS>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<(), TaggedPtr<BITS>> {
        match self
            .raw
            .compare_exchange(current.into_raw(), new.into_raw(), success, failure)
        {
            Ok(_) => Ok(()),
            Err(observed) => Err(TaggedPtr::from_raw(observed)),
        }
    }
}

impl<const BITS: u32> fmt::Debug for AtomicTaggedPtr<BITS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.load(Ordering::Relaxed).fmt(f)
    }
}

/// Advances a stamp by one, wrapping at `2^BITS`.
#[inline]
pub fn bump_stamp<const BITS: u32>(stamp: u32) -> u32 {
    stamp.wrapping_add(1) & TaggedPtr::<BITS>::STAMP_MASK
}

/// Wrap-aware distance from `earlier` to `later`, in `[0, 2^BITS)`.
///
/// This is the sign-corrected modular subtraction the bound checks rely on:
/// the result is how many stamp increments separate the two observations.
#[inline]
pub fn stamp_distance<const BITS: u32>(later: u32, earlier: u32) -> u32 {
    later.wrapping_sub(earlier) & TaggedPtr::<BITS>::STAMP_MASK
}
