//! # Ticket locks
//!
//! A read-write [GuardedResource] plus a way to lock any number of them at once without
//! agreeing on a lock order, see [multi_lock].
//!
//! ```
//! use ticket_locks::{bind_read, bind_write, multi_lock, GuardedResource, ReadGuard, WriteGuard};
//!
//! let from = GuardedResource::new(100);
//! let to = GuardedResource::new(0);
//! let rate = GuardedResource::new(2);
//!
//! let (mut f, mut t, mut r) = (WriteGuard::empty(), WriteGuard::empty(), ReadGuard::empty());
//! multi_lock((
//!     bind_write(&mut f, &from),
//!     bind_write(&mut t, &to),
//!     bind_read(&mut r, &rate),
//! ));
//! *f -= 10;
//! *t += 10 * *r;
//! assert_eq!((*f, *t), (90, 20));
//! ```

pub mod error;
pub mod multi;
pub mod resource;
pub mod ticket;

pub use error::LockError;
pub use multi::{
    bind_read, bind_write, multi_lock, multi_lock_timeout, multi_lock_until, multi_read_lock,
    multi_write_lock, LockSet, ReadBinding, ReadSet, WriteBinding, WriteSet,
};
pub use resource::{GuardedResource, LockMode, ReadGuard, Reservation, WriteGuard};
pub use ticket::{Claimant, Ticket};
