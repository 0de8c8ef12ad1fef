//! Generation reservations
//!
//! A reservation pins the expiry watermark value captured when it was taken:
//! no event at or above that generation is removed while the reservation is
//! outstanding. Reservations for the same generation share one slot in the
//! graph; each caller holds its own [`GenerationReservation`] handle onto it.
//!
//! Releasing only decrements the slot's counter. The slot itself is removed
//! from the graph on a later `expire_below` pass, so release never needs the
//! graph lock.

use shadowgraph_core::Generation;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared counter for all reservations of one generation
#[derive(Debug)]
pub(crate) struct ReservationSlot {
    generation: Generation,
    count: AtomicU64,
}

impl ReservationSlot {
    /// New slot holding a single reservation
    pub(crate) fn new(generation: Generation) -> Self {
        Self {
            generation,
            count: AtomicU64::new(1),
        }
    }

    pub(crate) fn generation(&self) -> Generation {
        self.generation
    }

    pub(crate) fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn acquire(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement, never below zero
    fn release(&self) {
        let previous = self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            });
        debug_assert!(
            previous.is_ok(),
            "generation {} reservation released more times than it was taken",
            self.generation
        );
    }
}

/// A caller's hold on a reserved generation.
///
/// Released exactly once, either explicitly with [`release`](Self::release)
/// or when the handle is dropped.
#[derive(Debug)]
#[must_use = "dropping a reservation releases it immediately"]
pub struct GenerationReservation {
    slot: Arc<ReservationSlot>,
    released: bool,
}

impl GenerationReservation {
    pub(crate) fn new(slot: Arc<ReservationSlot>) -> Self {
        Self {
            slot,
            released: false,
        }
    }

    /// The watermark value this reservation protects
    pub fn generation(&self) -> Generation {
        self.slot.generation()
    }

    /// Outstanding reservations sharing this generation, this one included
    pub fn reservation_count(&self) -> u64 {
        self.slot.count()
    }

    /// Give the reservation back
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.slot.release();
        }
    }
}

impl Drop for GenerationReservation {
    fn drop(&mut self) {
        self.release_once();
    }
}
