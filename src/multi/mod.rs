//! # Locking several resources at once
//!
//! The classic way to avoid deadlocks is to agree on a global lock order. Here nobody agrees on
//! anything, so instead:
//!
//! 1. _optimistic pass_ - `try_lock` every binding in order; if one fails, release the ones
//!    taken so far. If everything went through, that's it - the uncontended fast path.
//! 2. _contended path_ - draw one [Ticket] for the whole call, then loop: reserve every resource
//!    of the set with it, repeat the optimistic pass, back off if it failed.
//!
//! As the same ticket is pushed onto every resource of the set, a thread with a lower ticket is
//! kept out of each of them by the granting rule. The thread holding the highest ticket among
//! the contenders therefore gets everything as soon as the actual holders let go.
//! Nobody waits while holding something, so there's no deadlock; the tickets are random,
//! so nobody loses forever with any meaningful probability.
//!
//! ## Sets
//!
//! Anything implementing [LockSet]:
//! - one binding, see [bind_read] and [bind_write]
//! - tuples of lock sets, possibly mixing modes and value types
//! - arrays, slices, vectors - the dynamically sized flavour
//!
//! They nest, so one call can cover a couple of ranges plus a few single resources.
//! [multi_read_lock] and [multi_write_lock] only accept homogeneous sets, see [ReadSet] and
//! [WriteSet].
//!
//! A set naming the same resource twice for writing can never be acquired.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::{
    error::LockError,
    ticket::{Backoff, Ticket},
};

mod binding;
mod set;

pub use binding::{bind_read, bind_write, ReadBinding, WriteBinding};

/// A group of guard slots that's acquired all-or-nothing.
pub trait LockSet {
    /// One attempt on every slot, in order. Either all slots end up bound, or none of the slots
    /// this call went through stays bound.
    fn try_lock_all(&mut self) -> bool;

    /// Releases every bound slot. Empty slots are skipped.
    fn unlock_all(&mut self);

    /// Pushes the calling thread's claim onto every resource of the set
    fn reserve_all(&self, ticket: Ticket);

    /// Drops the calling thread's claims on the set's resources
    fn withdraw_all(&self);
}

/// Only shared bindings inside
pub trait ReadSet: LockSet {}

/// Only exclusive bindings inside
pub trait WriteSet: LockSet {}

/// Blocks until every slot of `set` is bound
pub fn multi_lock<S: LockSet>(mut set: S) {
    let acquired = acquire(&mut set, None);
    debug_assert!(acquired);
}

pub fn multi_read_lock<S: ReadSet>(set: S) {
    multi_lock(set);
}

pub fn multi_write_lock<S: WriteSet>(set: S) {
    multi_lock(set);
}

/// Like [multi_lock], but gives up at `deadline`. On failure nothing is bound and
/// none of the calling thread's claims are left behind.
pub fn multi_lock_until<S: LockSet>(mut set: S, deadline: Instant) -> Result<(), LockError> {
    if acquire(&mut set, Some(deadline)) {
        Ok(())
    } else {
        Err(LockError::SetTimedOut)
    }
}

pub fn multi_lock_timeout<S: LockSet>(set: S, timeout: Duration) -> Result<(), LockError> {
    match Instant::now().checked_add(timeout) {
        Some(deadline) => multi_lock_until(set, deadline),
        None => {
            multi_lock(set);
            Ok(())
        }
    }
}

fn acquire<S: LockSet + ?Sized>(set: &mut S, deadline: Option<Instant>) -> bool {
    if set.try_lock_all() {
        return true;
    }

    let ticket = Ticket::draw();
    trace!(ticket = ticket.priority(), "multi-lock contended, reserving");

    let mut backoff = Backoff::new();
    let mut attempts: u64 = 1;
    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            set.withdraw_all();
            debug!(attempts, "multi-lock deadline expired");
            return false;
        }
        set.reserve_all(ticket);
        attempts += 1;
        if set.try_lock_all() {
            trace!(attempts, "multi-lock acquired");
            return true;
        }
        backoff.snooze();
    }
}
