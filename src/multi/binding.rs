//! A binding is a guard slot paired with the resource it should end up bound to.

use super::{LockSet, ReadSet, WriteSet};
use crate::{GuardedResource, ReadGuard, Ticket, WriteGuard};

pub struct ReadBinding<'g, 'a, T> {
    guard: &'g mut ReadGuard<'a, T>,
    resource: &'a GuardedResource<T>,
}

pub struct WriteBinding<'g, 'a, T> {
    guard: &'g mut WriteGuard<'a, T>,
    resource: &'a GuardedResource<T>,
}

/// `guard` gets shared access to `resource` once the set it's part of is locked
pub fn bind_read<'g, 'a, T>(
    guard: &'g mut ReadGuard<'a, T>,
    resource: &'a GuardedResource<T>,
) -> ReadBinding<'g, 'a, T> {
    ReadBinding { guard, resource }
}

/// `guard` gets exclusive access to `resource` once the set it's part of is locked
pub fn bind_write<'g, 'a, T>(
    guard: &'g mut WriteGuard<'a, T>,
    resource: &'a GuardedResource<T>,
) -> WriteBinding<'g, 'a, T> {
    WriteBinding { guard, resource }
}

impl<T> LockSet for ReadBinding<'_, '_, T> {
    fn try_lock_all(&mut self) -> bool {
        self.guard.try_lock(self.resource)
    }

    fn unlock_all(&mut self) {
        if self.guard.is_locked() {
            self.guard.unlock();
        }
    }

    fn reserve_all(&self, ticket: Ticket) {
        self.resource.reserve(ticket);
    }

    fn withdraw_all(&self) {
        self.resource.withdraw();
    }
}

impl<T> ReadSet for ReadBinding<'_, '_, T> {}

impl<T> LockSet for WriteBinding<'_, '_, T> {
    fn try_lock_all(&mut self) -> bool {
        self.guard.try_lock(self.resource)
    }

    fn unlock_all(&mut self) {
        if self.guard.is_locked() {
            self.guard.unlock();
        }
    }

    fn reserve_all(&self, ticket: Ticket) {
        self.resource.reserve(ticket);
    }

    fn withdraw_all(&self) {
        self.resource.withdraw();
    }
}

impl<T> WriteSet for WriteBinding<'_, '_, T> {}
