//! Torn-read validation for the tagged word
//!
//! The whole design leans on 64-bit atomic loads observing pointer and stamp
//! as one unit. Writers store self-consistent (pointer, stamp) pairs while
//! readers assert the pairing, so a platform with torn 64-bit loads fails
//! here instead of corrupting a queue.

use linkflux::tagged::{AtomicTaggedPtr, TaggedPtr};
use linkflux::Link;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn tagged_word_never_tears() {
    const PATTERNS: usize = 8;
    const WRITES: usize = 200_000;

    // Eight links; the stamp stored with links[i] is always i, so any
    // observed (pointer, stamp) combination from a torn read is detectable.
    let links: Arc<Vec<Box<Link>>> = Arc::new((0..PATTERNS).map(|_| Box::new(Link::new())).collect());
    let ptr_of = |links: &[Box<Link>], i: usize| &*links[i] as *const Link as *mut Link;

    let word = Arc::new(AtomicTaggedPtr::<19>::new(TaggedPtr::new(
        ptr_of(&links, 0),
        0,
    )));
    let stop = Arc::new(AtomicBool::new(false));

    let mut writers = Vec::new();
    for offset in 0..2 {
        let word = Arc::clone(&word);
        let links = Arc::clone(&links);
        writers.push(thread::spawn(move || {
            for n in 0..WRITES {
                let i = (n * 2 + offset) % PATTERNS;
                word.store(
                    TaggedPtr::new(&*links[i] as *const Link as *mut Link, i as u32),
                    Release,
                );
            }
        }));
    }

    let mut readers = Vec::new();
    for _ in 0..2 {
        let word = Arc::clone(&word);
        let links = Arc::clone(&links);
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || {
            let mut observations = 0u64;
            while !stop.load(Ordering::Relaxed) {
                let t = word.load(Acquire);
                let i = t.stamp() as usize;
                assert!(i < PATTERNS, "stamp outside any written pattern");
                let expected = &*links[i] as *const Link as *mut Link;
                assert_eq!(
                    t.ptr(),
                    expected,
                    "pointer and stamp from different writes: torn load"
                );
                observations += 1;
            }
            observations
        }));
    }

    for writer in writers {
        writer.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        let seen = reader.join().unwrap();
        assert!(seen > 0);
    }
}
