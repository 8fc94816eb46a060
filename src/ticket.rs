//! # Tickets and claimants
//!
//! A reservation is a pair: how badly a thread wants the resource ([Ticket]) and who that
//! thread is ([Claimant]).
//!
//! Tickets are drawn from the thread-local [rand::thread_rng], so there's no shared RNG state to
//! fight over. Every blocking call (or multi-lock call) draws exactly one ticket and keeps
//! pushing it until it succeeds.
//!
//! [std::thread::ThreadId] has no ordering, and the tie-break needs one, hence our own
//! [Claimant] numbering.

use std::{
    hint,
    sync::atomic::{AtomicU64, Ordering::Relaxed},
    thread,
};

use rand::Rng;

/// Priority of one acquisition attempt. Higher wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    /// Uniformly random ticket from the current thread's RNG
    pub fn draw() -> Self {
        Self(rand::thread_rng().gen())
    }

    /// A ticket with a fixed priority, mostly useful to drive reservations by hand
    pub const fn new(priority: u64) -> Self {
        Self(priority)
    }

    pub const fn priority(self) -> u64 {
        self.0
    }
}

/// Identity of a thread as seen by the reservation slot.
///
/// Assigned lazily from a global counter, so it's stable for the thread's whole life and
/// totally ordered. The order itself means nothing: it only breaks exact ticket ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Claimant(u64);

impl Claimant {
    pub fn current() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        thread_local! {
            static ID: u64 = NEXT.fetch_add(1, Relaxed);
        }
        ID.with(|id| Self(*id))
    }
}

/// Waiting strategy between two attempts: spin for a short while, then start yielding.
///
/// Same idea as a mutex's contended path: short waits are cheaper to spin through,
/// long ones should give the CPU away.
pub(crate) struct Backoff {
    spins: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 32;

    pub(crate) fn new() -> Self {
        Self { spins: 0 }
    }

    pub(crate) fn snooze(&mut self) {
        if self.spins < Self::SPIN_LIMIT {
            self.spins += 1;
            hint::spin_loop();
        } else {
            thread::yield_now();
        }
    }
}
