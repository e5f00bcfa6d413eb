//! Fixed-capacity touch event queue shared between the touch ISR and the
//! main loop.
//!
//! The queue is a ring of `N` slots with a `front` index owned by the consumer
//! (main loop) and a `rear` index owned by the producer (interrupt). There is
//! no lock: each slot carries a `registered` flag written by the producer and
//! a `processed` flag written by the consumer, and ownership of a slot passes
//! back and forth through those two flags.
//!
//! ```text
//!            registered=true (Release)
//!  producer ───────────────────────────▶ consumer
//!           ◀───────────────────────────
//!            processed=true, registered=false (Release)
//! ```
//!
//! A slot is readable once `registered` is set and writable again once the
//! consumer has marked it `processed` and cleared `registered`. The producer
//! never overwrites an unread slot: it reports [`QueueFull`] and the sample is
//! dropped.
//!
//! Payloads are stored in two `AtomicU32` words per slot so the whole queue is
//! `Sync` without `unsafe` and can live in a `static`.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use thiserror_no_std::Error;

use crate::event::TouchEvent;

/// Default number of slots. Expand this if the main loop is slow to drain.
pub const TOUCH_QUEUE_SIZE: usize = 100;

/// The producer found the next slot still unread
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("touch event queue is full")]
pub struct QueueFull;

/// A flush was attempted while the producer was mid-write
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("touch event queue is being written by the interrupt handler")]
pub struct QueueBusy;

struct Slot {
    /// Set by the producer once the payload is written
    registered: AtomicBool,
    /// Set by the consumer once the payload has been read or discarded
    processed: AtomicBool,
    meta: AtomicU32,
    location: AtomicU32,
}

impl Slot {
    const fn new() -> Self {
        Self {
            registered: AtomicBool::new(false),
            processed: AtomicBool::new(true),
            meta: AtomicU32::new(0),
            location: AtomicU32::new(0),
        }
    }

    /// Free for the producer: released by the consumer and not mid-pop.
    fn is_free(&self) -> bool {
        !self.registered.load(Ordering::Acquire) && self.processed.load(Ordering::Relaxed)
    }

    /// Hand the slot back to the producer. `processed` is published before
    /// `registered` is cleared so a free slot always reads as processed.
    fn release(&self) {
        self.processed.store(true, Ordering::Relaxed);
        self.registered.store(false, Ordering::Release);
    }
}

/// Single-producer / single-consumer ring of touch events.
///
/// `push` may only be called from one producer context (the touch ISR) and
/// `pop`/`flush` from one consumer context (the main loop). `len`,
/// `is_empty` and `capacity` are safe from either.
pub struct TouchEventQueue<const N: usize = TOUCH_QUEUE_SIZE> {
    front: AtomicUsize,
    rear: AtomicUsize,
    /// Set while the producer is inside `push`
    isr_active: AtomicBool,
    slots: [Slot; N],
}

impl<const N: usize> Default for TouchEventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> TouchEventQueue<N> {
    /// Create an empty queue. Usable in `static` initialisers.
    pub const fn new() -> Self {
        const { assert!(N > 0, "touch event queue needs at least one slot") };
        Self {
            front: AtomicUsize::new(0),
            rear: AtomicUsize::new(0),
            isr_active: AtomicBool::new(false),
            slots: [const { Slot::new() }; N],
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Append an event. Producer context only; never blocks.
    pub fn push(&self, event: TouchEvent) -> Result<(), QueueFull> {
        self.isr_active.store(true, Ordering::SeqCst);

        let rear = self.rear.load(Ordering::Relaxed);
        let slot = &self.slots[rear];
        let result = if slot.is_free() {
            slot.meta.store(event.pack_meta(), Ordering::Relaxed);
            slot.location.store(event.location.pack(), Ordering::Relaxed);
            slot.processed.store(false, Ordering::Relaxed);
            slot.registered.store(true, Ordering::Release);
            self.rear.store((rear + 1) % N, Ordering::Release);
            Ok(())
        } else {
            Err(QueueFull)
        };

        self.isr_active.store(false, Ordering::SeqCst);
        result
    }

    /// Remove the oldest event. Consumer context only.
    pub fn pop(&self) -> Option<TouchEvent> {
        let front = self.front.load(Ordering::Relaxed);
        let slot = &self.slots[front];
        if !slot.registered.load(Ordering::Acquire) {
            return None;
        }

        let event = TouchEvent::unpack(
            slot.meta.load(Ordering::Relaxed),
            slot.location.load(Ordering::Relaxed),
        );
        slot.release();
        self.front.store((front + 1) % N, Ordering::Release);
        Some(event)
    }

    /// Discard every pending event without reading it.
    ///
    /// Returns the number of events discarded, or [`QueueBusy`] when the
    /// producer is mid-write; the caller retries on a later iteration.
    pub fn flush(&self) -> Result<usize, QueueBusy> {
        if self.is_producer_active() {
            return Err(QueueBusy);
        }

        Ok(self.discard_pending())
    }

    /// Discard every pending event through exclusive access.
    ///
    /// Holding `&mut self` rules out a concurrent `push`, so this never has to
    /// be deferred.
    pub fn clear(&mut self) -> usize {
        self.discard_pending()
    }

    fn discard_pending(&self) -> usize {
        // Bounded so a producer racing on another core cannot keep us here.
        let mut discarded = 0;
        for _ in 0..N {
            let front = self.front.load(Ordering::Relaxed);
            let slot = &self.slots[front];
            if !slot.registered.load(Ordering::Acquire) {
                break;
            }
            slot.release();
            self.front.store((front + 1) % N, Ordering::Release);
            discarded += 1;
        }
        discarded
    }

    /// True while the producer is inside `push`
    pub fn is_producer_active(&self) -> bool {
        self.isr_active.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        let front = self.front.load(Ordering::Acquire);
        !self.slots[front].registered.load(Ordering::Acquire)
    }

    /// Number of pending events. A snapshot when called while the other
    /// context is running.
    pub fn len(&self) -> usize {
        let front = self.front.load(Ordering::Acquire);
        let rear = self.rear.load(Ordering::Acquire);
        if front == rear {
            if self.slots[front].registered.load(Ordering::Acquire) {
                N
            } else {
                0
            }
        } else {
            (rear + N - front) % N
        }
    }
}
