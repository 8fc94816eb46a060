//! # Guarded resource
//!
//! A read-write lock that owns its value, like [std::sync::RwLock], with one twist: a single-slot
//! _reservation_ that lets a losing thread stake a claim on the resource.
//!
//! State:
//! - `write_held` - there's a [WriteGuard] alive
//! - `readers` - number of alive [ReadGuard]s, the only thing touched without the mutex
//! - `reservation` - at most one soft claim, see [Reservation]
//!
//! ## Granting rule
//!
//! A lock is granted when both hold:
//! - the structural condition: no writer for a read, no writer and no readers for a write
//! - the resource is unreserved, or reserved by the asking thread
//!
//! The second part is what keeps a thread from being out-raced forever: once it has the highest
//! claim, newcomers without a claim can't pass the structural check before it does.
//!
//! ## Blocking
//!
//! [GuardedResource::write] and [GuardedResource::read] draw one [Ticket] per call and loop:
//! try under the mutex, and if that fails, reserve with the ticket, drop the mutex, back off,
//! try again. The `try_*` flavours do exactly one attempt and never reserve.
//!
//! ## Memory ordering
//!
//! Readers leave with a `Release` decrement and writers look at the counter with `Acquire`,
//! so every read done through a [ReadGuard] happens-before the next writer's access.
//! Everything else is ordered by the mutex.

use std::{
    cell::UnsafeCell,
    fmt,
    mem::ManuallyDrop,
    ptr,
    sync::atomic::{
        AtomicUsize,
        Ordering::{Acquire, Relaxed},
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use strum_macros::{Display, EnumString};
use tracing::{debug, trace};

use crate::{
    error::LockError,
    ticket::{Backoff, Claimant, Ticket},
};

mod guard;

pub use guard::{ReadGuard, WriteGuard};

/// Shared or exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum LockMode {
    Read,
    Write,
}

/// A soft claim on a resource. It never grants anything by itself, it only keeps
/// other threads away while its claimant retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub ticket: Ticket,
    pub claimant: Claimant,
}

/// Everything the mutex protects
#[derive(Debug, Default)]
struct State {
    write_held: bool,
    reservation: Option<Reservation>,
}

impl State {
    fn can_claim(&self, me: Claimant) -> bool {
        self.reservation.map_or(true, |r| r.claimant == me)
    }

    /// Higher ticket replaces the claim. On an exact tie the smaller claimant keeps it,
    /// which is arbitrary, but the same for any given pair of threads.
    fn reserve(&mut self, ticket: Ticket, me: Claimant) {
        match self.reservation {
            Some(current) if ticket < current.ticket => {}
            Some(current) if ticket == current.ticket && current.claimant < me => {}
            _ => self.reservation = Some(Reservation { ticket, claimant: me }),
        }
    }

    fn withdraw(&mut self, me: Claimant) {
        if self.reservation.is_some_and(|r| r.claimant == me) {
            self.reservation = None;
        }
    }
}

pub struct GuardedResource<T> {
    state: Mutex<State>,
    readers: AtomicUsize,
    value: UnsafeCell<T>,
}

/// Many [ReadGuard]s may hand out `&T` to different threads at once => `T: Sync` on top of `Send`
unsafe impl<T> Sync for GuardedResource<T> where T: Send + Sync {}

impl<T> GuardedResource<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(State::default()),
            readers: AtomicUsize::new(0),
            value: UnsafeCell::new(value),
        }
    }

    /// Blocks until the exclusive lock is granted
    pub fn write(&self) -> WriteGuard<'_, T> {
        let granted = self.acquire(LockMode::Write, None);
        debug_assert!(granted);
        WriteGuard::bound(self)
    }

    /// One attempt, no reservation. The guard is empty if the lock wasn't granted.
    pub fn try_write(&self) -> WriteGuard<'_, T> {
        if self.grant(&mut self.state.lock(), LockMode::Write, Claimant::current()) {
            WriteGuard::bound(self)
        } else {
            WriteGuard::empty()
        }
    }

    pub fn write_until(&self, deadline: Instant) -> Result<WriteGuard<'_, T>, LockError> {
        if self.acquire(LockMode::Write, Some(deadline)) {
            Ok(WriteGuard::bound(self))
        } else {
            Err(LockError::TimedOut {
                mode: LockMode::Write,
            })
        }
    }

    pub fn write_timeout(&self, timeout: Duration) -> Result<WriteGuard<'_, T>, LockError> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.write_until(deadline),
            None => Ok(self.write()),
        }
    }

    /// Blocks until a shared lock is granted
    pub fn read(&self) -> ReadGuard<'_, T> {
        let granted = self.acquire(LockMode::Read, None);
        debug_assert!(granted);
        ReadGuard::bound(self)
    }

    pub fn try_read(&self) -> ReadGuard<'_, T> {
        if self.grant(&mut self.state.lock(), LockMode::Read, Claimant::current()) {
            ReadGuard::bound(self)
        } else {
            ReadGuard::empty()
        }
    }

    pub fn read_until(&self, deadline: Instant) -> Result<ReadGuard<'_, T>, LockError> {
        if self.acquire(LockMode::Read, Some(deadline)) {
            Ok(ReadGuard::bound(self))
        } else {
            Err(LockError::TimedOut {
                mode: LockMode::Read,
            })
        }
    }

    pub fn read_timeout(&self, timeout: Duration) -> Result<ReadGuard<'_, T>, LockError> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.read_until(deadline),
            None => Ok(self.read()),
        }
    }

    /// Claims the resource for the calling thread, unless somebody holds a better claim
    pub fn reserve(&self, ticket: Ticket) {
        self.state.lock().reserve(ticket, Claimant::current());
    }

    pub fn reserved(&self) -> bool {
        self.state.lock().reservation.is_some()
    }

    pub fn reservation(&self) -> Option<Reservation> {
        self.state.lock().reservation
    }

    /// Drops the calling thread's claim, if it has one. Claims of other threads stay.
    pub(crate) fn withdraw(&self) {
        self.state.lock().withdraw(Claimant::current());
    }

    /// Number of alive read guards. A snapshot: it may change right after the call.
    pub fn readers(&self) -> usize {
        self.readers.load(Relaxed)
    }

    pub fn is_write_locked(&self) -> bool {
        self.state.lock().write_held
    }

    pub fn is_locked(&self) -> bool {
        self.is_write_locked() || self.readers() > 0
    }

    /// `&mut self` already proves nobody else can look at the value
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    /// Panics if a lock is still recorded, which is only possible with a leaked guard
    pub fn into_inner(self) -> T {
        let mut this = ManuallyDrop::new(self);
        this.assert_unlocked();
        // SAFETY: `this` is never used again and its Drop is suppressed,
        // so both fields are moved out exactly once
        let (state, value) = unsafe { (ptr::read(&this.state), ptr::read(&this.value)) };
        drop(state);
        value.into_inner()
    }

    /// The blocking loop. Returns false only when the deadline passed.
    fn acquire(&self, mode: LockMode, deadline: Option<Instant>) -> bool {
        let me = Claimant::current();
        let ticket = Ticket::draw();
        let mut backoff = Backoff::new();
        let mut contended = false;
        loop {
            {
                let mut state = self.state.lock();
                if self.grant(&mut state, mode, me) {
                    return true;
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    // an abandoned claim would lock everybody else out
                    state.withdraw(me);
                    drop(state);
                    debug!(%mode, "lock deadline expired");
                    return false;
                }
                // only reserve after an attempt failed
                state.reserve(ticket, me);
            }
            if !contended {
                contended = true;
                trace!(%mode, ticket = ticket.priority(), "lock contended, reserved");
            }
            backoff.snooze();
        }
    }

    /// The granting rule. Has to be called with the state mutex held.
    fn grant(&self, state: &mut State, mode: LockMode, me: Claimant) -> bool {
        let free = match mode {
            LockMode::Read => !state.write_held,
            LockMode::Write => !state.write_held && self.readers.load(Acquire) == 0,
        };
        if !free || !state.can_claim(me) {
            return false;
        }
        match mode {
            LockMode::Read => self.add_reader(),
            LockMode::Write => state.write_held = true,
        }
        state.withdraw(me);
        true
    }

    /// One more reader. The caller proves there's no writer, either through the mutex
    /// or through an alive read guard.
    fn add_reader(&self) {
        // the same limit as for reference counters: far away from usize::MAX to have time to abort
        if self.readers.fetch_add(1, Relaxed) > usize::MAX / 2 {
            std::process::abort();
        }
    }

    fn assert_unlocked(&mut self) {
        let writer = self.state.get_mut().write_held;
        let readers = *self.readers.get_mut();
        if writer || readers > 0 {
            panic!("{}", LockError::StillLocked { writer, readers });
        }
    }
}

/// Alive guards borrow the resource, so only a leaked one can get us here locked
impl<T> Drop for GuardedResource<T> {
    fn drop(&mut self) {
        // panicking while unwinding aborts
        if !thread::panicking() {
            self.assert_unlocked();
        }
    }
}

impl<T> From<T> for GuardedResource<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Default> Default for GuardedResource<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for GuardedResource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // a grant would clear our own claim, so a reserved resource isn't read at all
        let reserved = self.reserved();
        let guard = if reserved {
            ReadGuard::empty()
        } else {
            self.try_read()
        };
        let mut d = f.debug_struct("GuardedResource");
        match guard.get() {
            Some(value) => d.field("value", value),
            None => d.field("value", &format_args!("<unavailable>")),
        };
        d.field("write_locked", &self.is_write_locked())
            .field("reserved", &reserved)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod test {
    use std::{
        mem,
        sync::{
            atomic::{AtomicUsize, Ordering::SeqCst},
            Barrier,
        },
        thread::scope,
    };

    use super::*;

    #[test]
    fn try_write_fails_while_read() {
        let r = GuardedResource::new(0);
        let g = r.read();
        assert!(!r.try_write().is_locked());
        drop(g);
        assert!(r.try_write().is_locked());
    }

    #[test]
    fn try_read_fails_while_written() {
        let r = GuardedResource::new(0);
        let g = r.write();
        assert!(!r.try_read().is_locked());
        assert!(!r.try_write().is_locked());
        drop(g);
        assert!(r.try_read().is_locked());
    }

    #[test]
    fn shared_reads() {
        const N: usize = 8;
        let r = GuardedResource::new(String::from("shared"));
        // everybody holds the guard until all the others got theirs too
        let all_in = Barrier::new(N + 1);
        let all_checked = Barrier::new(N + 1);
        scope(|s| {
            for _ in 0..N {
                s.spawn(|| {
                    let g = r.read();
                    assert_eq!(*g, "shared");
                    all_in.wait();
                    all_checked.wait();
                });
            }
            all_in.wait();
            assert_eq!(r.readers(), N);
            assert!(!r.is_write_locked());
            all_checked.wait();
        });
        assert_eq!(r.readers(), 0);
    }

    #[test]
    fn writer_then_reader_never_tears() {
        for _ in 0..100 {
            let r = GuardedResource::new(0);
            scope(|s| {
                s.spawn(|| {
                    let mut g = r.write();
                    *g = 5;
                });
                s.spawn(|| {
                    let seen = *r.read();
                    assert!(seen == 0 || seen == 5, "saw {seen}");
                });
            });
            assert_eq!(r.into_inner(), 5);
        }
    }

    #[test]
    fn writers_exclude_each_other() {
        let r = GuardedResource::new(0u64);
        let inside = AtomicUsize::new(0);
        scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        let mut g = r.write();
                        assert_eq!(inside.fetch_add(1, SeqCst), 0);
                        *g += 1;
                        inside.fetch_sub(1, SeqCst);
                    }
                });
            }
        });
        assert_eq!(r.into_inner(), 4000);
    }

    #[test]
    fn higher_ticket_takes_over_the_reservation() {
        let r = GuardedResource::new(());
        r.reserve(Ticket::new(10));
        let me = Claimant::current();
        assert_eq!(r.reservation().map(|x| x.claimant), Some(me));

        // a lower ticket from another thread doesn't change anything
        scope(|s| s.spawn(|| r.reserve(Ticket::new(3))).join().unwrap());
        assert_eq!(r.reservation().map(|x| x.claimant), Some(me));

        // a higher one does
        let other = scope(|s| {
            s.spawn(|| {
                r.reserve(Ticket::new(11));
                Claimant::current()
            })
            .join()
            .unwrap()
        });
        assert_eq!(
            r.reservation(),
            Some(Reservation {
                ticket: Ticket::new(11),
                claimant: other
            })
        );
    }

    #[test]
    fn ticket_tie_goes_to_the_smaller_claimant() {
        let r = GuardedResource::new(());
        r.reserve(Ticket::new(42));
        let me = Claimant::current();
        let other = scope(|s| {
            s.spawn(|| {
                r.reserve(Ticket::new(42));
                Claimant::current()
            })
            .join()
            .unwrap()
        });
        let winner = r.reservation().map(|x| x.claimant);
        assert_eq!(winner, Some(me.min(other)));
    }

    #[test]
    fn reservation_keeps_others_out() {
        let r = GuardedResource::new(1);
        let reserved = Barrier::new(2);
        let checked = Barrier::new(2);
        scope(|s| {
            let claimant = s.spawn(|| {
                r.reserve(Ticket::new(u64::MAX));
                reserved.wait();
                checked.wait();
                // the claimant itself goes through, and its claim is gone afterwards
                let g = r.try_write();
                assert!(g.is_locked());
                assert!(!r.reserved());
            });

            reserved.wait();
            // the resource is free, but claimed by somebody else
            assert!(r.reserved());
            assert!(!r.try_read().is_locked());
            assert!(!r.try_write().is_locked());
            assert!(r.read_timeout(Duration::from_millis(10)).is_err());
            // our timeout didn't touch the other thread's claim
            assert!(r.reserved());
            checked.wait();
            claimant.join().unwrap();
        });
        assert!(!r.is_locked());
    }

    #[test]
    fn grant_clears_own_reservation() {
        let r = GuardedResource::new(1);
        r.reserve(Ticket::new(5));
        assert!(r.reserved());
        let g = r.try_write();
        assert!(g.is_locked());
        assert!(!r.reserved());
    }

    #[test]
    fn contended_write_eventually_wins() {
        let r = GuardedResource::new(0);
        let g = r.read();
        scope(|s| {
            let jh = s.spawn(|| {
                *r.write() += 1;
            });
            // the writer reserves while it waits, which keeps new readers out
            while !r.reserved() {
                thread::yield_now();
            }
            assert!(!r.try_read().is_locked());
            drop(g);
            jh.join().unwrap();
        });
        assert!(!r.reserved());
        assert_eq!(*r.read(), 1);
    }

    #[test]
    fn deadline_withdraws_the_reservation() {
        let r = GuardedResource::new(0);
        scope(|s| {
            let g = r.write();
            s.spawn(|| {
                let e = r.write_timeout(Duration::from_millis(20)).unwrap_err();
                assert_eq!(
                    e,
                    LockError::TimedOut {
                        mode: LockMode::Write
                    }
                );
                let e = r.read_until(Instant::now()).unwrap_err();
                assert_eq!(e, LockError::TimedOut { mode: LockMode::Read });
            })
            .join()
            .unwrap();
            drop(g);
        });
        assert!(!r.reserved());
        assert!(r.read_timeout(Duration::from_millis(20)).is_ok());
    }

    #[test]
    fn past_deadline_still_tries_once() {
        let r = GuardedResource::new(0);
        let g = r.write_until(Instant::now()).unwrap();
        assert!(g.is_locked());
    }

    #[test]
    fn get_mut_and_into_inner() {
        let mut r = GuardedResource::from(vec![1]);
        r.get_mut().push(2);
        assert_eq!(r.into_inner(), vec![1, 2]);
    }

    #[test]
    #[should_panic(expected = "torn down while locked")]
    fn dropping_a_leaked_lock_panics() {
        let r = GuardedResource::new(0);
        mem::forget(r.write());
        drop(r);
    }

    #[test]
    #[should_panic(expected = "readers: 1")]
    fn into_inner_with_a_leaked_reader_panics() {
        let r = GuardedResource::new(0);
        mem::forget(r.read());
        r.into_inner();
    }

    #[test]
    fn debug_shows_the_value_when_readable() {
        let r = GuardedResource::new(7);
        assert!(format!("{r:?}").contains("value: 7"));
        let g = r.write();
        assert!(format!("{r:?}").contains("<unavailable>"));
        assert!(format!("{r:?}").contains("write_locked: true"));
        drop(g);
        assert_eq!(r.readers(), 0);
    }

    #[test]
    fn debug_leaves_reservations_alone() {
        let r = GuardedResource::new(7);
        scope(|s| s.spawn(|| r.reserve(Ticket::new(5))).join().unwrap());
        let shown = format!("{r:?}");
        assert!(shown.contains("<unavailable>"));
        assert!(shown.contains("write_locked: false"));
        assert!(r.reserved());
        assert!(!r.is_locked());

        r.reserve(Ticket::new(6));
        assert!(format!("{r:?}").contains("reserved: true"));
        assert!(r.reserved());
    }

    #[test]
    fn lock_mode_is_snake_case() {
        assert_eq!(LockMode::Write.to_string(), "write");
        assert_eq!("read".parse::<LockMode>().unwrap(), LockMode::Read);
    }
}
