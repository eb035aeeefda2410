// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A bounded, lock-free single-producer/single-consumer ring buffer.
//!
//! Exactly one thread may call [`SpscQueue::push`] and exactly one
//! (possibly different) thread may call [`SpscQueue::pop`] over the
//! lifetime of a queue; the type does not enforce this, it is a
//! contract on the caller (see §4.2 / §9 of the design). `head` and
//! `tail` live on separate cache lines to avoid false sharing between
//! the two threads pounding on them independently.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Padding to push the trailing field onto its own cache line on
/// common 64-byte-line architectures.
#[repr(align(64))]
struct CachePadded<T>(T);

struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded SPSC ring buffer of fixed capacity, fixed at construction.
///
/// Overflow policy is drop-newest: a `push` against a full queue
/// returns `false` and the element is dropped. Underflow is
/// report-empty: `pop` against an empty queue returns `None`.
pub struct SpscQueue<T> {
    buffer: Box<[Slot<T>]>,
    capacity: usize,
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: `push` is only ever called by the producer and `pop` only by
// the consumer; the acquire/release pair on head/tail establishes a
// happens-before edge so the slot write in `push` is visible to the
// slot read in `pop`, and vice versa for the slot becoming reusable.
unsafe impl<T: Send> Send for SpscQueue<T> {}
unsafe impl<T: Send> Sync for SpscQueue<T> {}

impl<T> SpscQueue<T> {
    /// Creates a queue with room for `capacity` elements. `capacity`
    /// must be at least 1.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "SpscQueue capacity must be > 0");
        let mut buffer = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            buffer.push(Slot {
                value: UnsafeCell::new(MaybeUninit::uninit()),
            });
        }
        Self {
            buffer: buffer.into_boxed_slice(),
            capacity,
            head: CachePadded(AtomicUsize::new(0)),
            tail: CachePadded(AtomicUsize::new(0)),
        }
    }

    /// Producer-only. Pushes `value`, returning `false` (and dropping
    /// `value`) if the queue is full.
    pub fn push(&self, value: T) -> bool {
        let head = self.head.0.load(Ordering::Acquire);
        let tail = self.tail.0.load(Ordering::Relaxed);

        if tail.wrapping_sub(head) >= self.capacity {
            return false;
        }

        let slot = &self.buffer[tail % self.capacity];
        // SAFETY: only the producer writes this slot, and it is only
        // ever written once the consumer has vacated it (enforced by
        // the capacity check above together with the acquire load of
        // `head`).
        unsafe {
            (*slot.value.get()).write(value);
        }
        self.tail.0.store(tail.wrapping_add(1), Ordering::Release);
        true
    }

    /// Consumer-only. Pops the oldest element, or `None` if empty.
    pub fn pop(&self) -> Option<T> {
        let tail = self.tail.0.load(Ordering::Acquire);
        let head = self.head.0.load(Ordering::Relaxed);

        if head == tail {
            return None;
        }

        let slot = &self.buffer[head % self.capacity];
        // SAFETY: only the consumer reads and retires this slot, and
        // the acquire load of `tail` guarantees the producer's write
        // already happened-before this read.
        let value = unsafe { (*slot.value.get()).assume_init_read() };
        self.head.0.store(head.wrapping_add(1), Ordering::Release);
        Some(value)
    }

    /// Approximate length; may be stale the instant it's read.
    pub fn len(&self) -> usize {
        let tail = self.tail.0.load(Ordering::Acquire);
        let head = self.head.0.load(Ordering::Acquire);
        tail.wrapping_sub(head)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Drop for SpscQueue<T> {
    fn drop(&mut self) {
        let head = *self.head.0.get_mut();
        let tail = *self.tail.0.get_mut();
        let mut i = head;
        while i != tail {
            let slot = &self.buffer[i % self.capacity];
            // SAFETY: single-threaded at this point (we hold `&mut
            // self`); every index in [head, tail) holds an initialized
            // value that was never retired.
            unsafe {
                (*slot.value.get()).assume_init_drop();
            }
            i = i.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let q = SpscQueue::new(8);
        for i in 0..5 {
            assert!(q.push(i));
        }
        for i in 0..5 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn overflow_drops_newest() {
        let q = SpscQueue::new(2);
        assert!(q.push(1));
        assert!(q.push(2));
        assert!(!q.push(3));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn drop_destroys_unpoped_elements() {
        use std::sync::atomic::AtomicUsize as Counter;
        struct Dropper(Arc<Counter>);
        impl Drop for Dropper {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(Counter::new(0));
        let q = SpscQueue::new(4);
        assert!(q.push(Dropper(count.clone())));
        assert!(q.push(Dropper(count.clone())));
        let _ = q.pop();
        drop(q);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn single_producer_single_consumer_is_fifo_under_concurrency() {
        const N: usize = 50_000;
        let q = Arc::new(SpscQueue::<usize>::new(1024));

        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..N {
                    while !q.push(i) {
                        thread::yield_now();
                    }
                }
            })
        };

        let consumer = {
            let q = q.clone();
            thread::spawn(move || {
                let mut popped = Vec::with_capacity(N);
                while popped.len() < N {
                    if let Some(v) = q.pop() {
                        popped.push(v);
                    } else {
                        thread::yield_now();
                    }
                }
                popped
            })
        };

        producer.join().expect("producer thread panicked");
        let popped = consumer.join().expect("consumer thread panicked");
        assert_eq!(popped, (0..N).collect::<Vec<_>>());
    }

    #[test]
    fn overflow_never_exceeds_capacity_without_pops() {
        let capacity = 16;
        let q = SpscQueue::<u32>::new(capacity);
        let mut accepted = 0;
        for i in 0..(capacity * 4) as u32 {
            if q.push(i) {
                accepted += 1;
            }
        }
        assert!(accepted <= capacity);
        assert_eq!(q.len(), capacity);
    }
}
