//! [LockSet] for the containers: references, boxes, tuples and the ranges (arrays, slices, vectors).

use super::{LockSet, ReadSet, WriteSet};
use crate::Ticket;

impl<S: LockSet + ?Sized> LockSet for &mut S {
    fn try_lock_all(&mut self) -> bool {
        (**self).try_lock_all()
    }

    fn unlock_all(&mut self) {
        (**self).unlock_all();
    }

    fn reserve_all(&self, ticket: Ticket) {
        (**self).reserve_all(ticket);
    }

    fn withdraw_all(&self) {
        (**self).withdraw_all();
    }
}

impl<S: ReadSet + ?Sized> ReadSet for &mut S {}
impl<S: WriteSet + ?Sized> WriteSet for &mut S {}

/// Lets `Vec<Box<dyn LockSet>>` hold whatever mix of bindings
impl<S: LockSet + ?Sized> LockSet for Box<S> {
    fn try_lock_all(&mut self) -> bool {
        (**self).try_lock_all()
    }

    fn unlock_all(&mut self) {
        (**self).unlock_all();
    }

    fn reserve_all(&self, ticket: Ticket) {
        (**self).reserve_all(ticket);
    }

    fn withdraw_all(&self) {
        (**self).withdraw_all();
    }
}

impl<S: ReadSet + ?Sized> ReadSet for Box<S> {}
impl<S: WriteSet + ?Sized> WriteSet for Box<S> {}

/// The range flavour. A failure releases every member, including slots past the failed one
/// that were still bound from before the call.
impl<S: LockSet> LockSet for [S] {
    fn try_lock_all(&mut self) -> bool {
        if self.iter_mut().all(LockSet::try_lock_all) {
            return true;
        }
        self.unlock_all();
        false
    }

    fn unlock_all(&mut self) {
        self.iter_mut().for_each(LockSet::unlock_all);
    }

    fn reserve_all(&self, ticket: Ticket) {
        self.iter().for_each(|s| s.reserve_all(ticket));
    }

    fn withdraw_all(&self) {
        self.iter().for_each(LockSet::withdraw_all);
    }
}

impl<S: ReadSet> ReadSet for [S] {}
impl<S: WriteSet> WriteSet for [S] {}

impl<S: LockSet, const N: usize> LockSet for [S; N] {
    fn try_lock_all(&mut self) -> bool {
        self.as_mut_slice().try_lock_all()
    }

    fn unlock_all(&mut self) {
        self.as_mut_slice().unlock_all();
    }

    fn reserve_all(&self, ticket: Ticket) {
        self.as_slice().reserve_all(ticket);
    }

    fn withdraw_all(&self) {
        self.as_slice().withdraw_all();
    }
}

impl<S: ReadSet, const N: usize> ReadSet for [S; N] {}
impl<S: WriteSet, const N: usize> WriteSet for [S; N] {}

impl<S: LockSet> LockSet for Vec<S> {
    fn try_lock_all(&mut self) -> bool {
        self.as_mut_slice().try_lock_all()
    }

    fn unlock_all(&mut self) {
        self.as_mut_slice().unlock_all();
    }

    fn reserve_all(&self, ticket: Ticket) {
        self.as_slice().reserve_all(ticket);
    }

    fn withdraw_all(&self) {
        self.as_slice().withdraw_all();
    }
}

impl<S: ReadSet> ReadSet for Vec<S> {}
impl<S: WriteSet> WriteSet for Vec<S> {}

/// Tuples mix whatever lock sets. As with ranges, a failure releases every member.
macro_rules! tuple_lock_set {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: LockSet),+> LockSet for ($($name,)+) {
            fn try_lock_all(&mut self) -> bool {
                $(
                    if !self.$idx.try_lock_all() {
                        self.unlock_all();
                        return false;
                    }
                )+
                true
            }

            fn unlock_all(&mut self) {
                $( self.$idx.unlock_all(); )+
            }

            fn reserve_all(&self, ticket: Ticket) {
                $( self.$idx.reserve_all(ticket); )+
            }

            fn withdraw_all(&self) {
                $( self.$idx.withdraw_all(); )+
            }
        }

        impl<$($name: ReadSet),+> ReadSet for ($($name,)+) {}
        impl<$($name: WriteSet),+> WriteSet for ($($name,)+) {}
    };
}

tuple_lock_set!(A 0);
tuple_lock_set!(A 0, B 1);
tuple_lock_set!(A 0, B 1, C 2);
tuple_lock_set!(A 0, B 1, C 2, D 3);
tuple_lock_set!(A 0, B 1, C 2, D 3, E 4);
tuple_lock_set!(A 0, B 1, C 2, D 3, E 4, F 5);
tuple_lock_set!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
tuple_lock_set!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);
