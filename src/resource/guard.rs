//! # Guards
//!
//! A guard is either _bound_ to a [GuardedResource] (and then it's the proof of a held lock),
//! or _empty_. Empty guards come from [Default], from failed `try_*` calls, from [ReadGuard::take]
//! and [WriteGuard::take] (the moved-from side) and from `unlock`.
//!
//! Guards borrow the resource, so the resource can't be moved or dropped while a guard is alive.
//!
//! Releasing:
//! - a read guard just decrements the counter, no mutex involved
//! - a write guard clears the flag under the resource's mutex
//!
//! Looking inside an empty guard or unlocking it twice is a bug and panics.

use std::{
    fmt, mem,
    ops::{Deref, DerefMut},
    ptr,
    sync::atomic::Ordering::Release,
};

use super::{GuardedResource, LockMode};
use crate::error::LockError;

/// Shared access. Cloning adds one more reader without waiting.
pub struct ReadGuard<'a, T> {
    resource: Option<&'a GuardedResource<T>>,
}

impl<'a, T> ReadGuard<'a, T> {
    pub const fn empty() -> Self {
        Self { resource: None }
    }

    /// The read count was already bumped by the caller
    pub(super) fn bound(resource: &'a GuardedResource<T>) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.resource.is_some()
    }

    pub fn resource(&self) -> Option<&'a GuardedResource<T>> {
        self.resource
    }

    pub fn get(&self) -> Option<&T> {
        // SAFETY: a bound read guard means there's no writer until it's gone
        self.resource.map(|r| unsafe { &*r.value.get() })
    }

    /// Blocks until `resource` is read-locked. The previous binding, if any, is released first.
    pub fn lock(&mut self, resource: &'a GuardedResource<T>) {
        self.release();
        *self = resource.read();
    }

    /// Releases the previous binding, then tries once. The guard is empty on failure.
    pub fn try_lock(&mut self, resource: &'a GuardedResource<T>) -> bool {
        self.release();
        *self = resource.try_read();
        self.is_locked()
    }

    pub fn unlock(&mut self) {
        if !self.release() {
            panic!(
                "{}",
                LockError::UnlockEmpty {
                    mode: LockMode::Read
                }
            );
        }
    }

    /// Moves the binding out, leaving this guard empty
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    fn release(&mut self) -> bool {
        match self.resource.take() {
            Some(resource) => {
                resource.readers.fetch_sub(1, Release);
                true
            }
            None => false,
        }
    }
}

impl<T> Default for ReadGuard<'_, T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// The source guard proves there's no writer, so there's nothing to wait for
impl<T> Clone for ReadGuard<'_, T> {
    fn clone(&self) -> Self {
        if let Some(resource) = self.resource {
            resource.add_reader();
        }
        Self {
            resource: self.resource,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if same_resource(self.resource, source.resource) {
            return;
        }
        self.release();
        if let Some(resource) = source.resource {
            resource.add_reader();
        }
        self.resource = source.resource;
    }
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        self.get().unwrap_or_else(|| {
            panic!(
                "{}",
                LockError::EmptyGuard {
                    mode: LockMode::Read
                }
            )
        })
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("ReadGuard").field(value).finish(),
            None => f.write_str("ReadGuard(<empty>)"),
        }
    }
}

/// Exclusive access. Move-only: there's exactly one per locked resource.
pub struct WriteGuard<'a, T> {
    resource: Option<&'a GuardedResource<T>>,
}

impl<'a, T> WriteGuard<'a, T> {
    pub const fn empty() -> Self {
        Self { resource: None }
    }

    /// The write flag was already set by the caller
    pub(super) fn bound(resource: &'a GuardedResource<T>) -> Self {
        Self {
            resource: Some(resource),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.resource.is_some()
    }

    pub fn resource(&self) -> Option<&'a GuardedResource<T>> {
        self.resource
    }

    pub fn get(&self) -> Option<&T> {
        // SAFETY: a bound write guard is the only way to the value
        self.resource.map(|r| unsafe { &*r.value.get() })
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        // SAFETY: same as above, and &mut self keeps it unique
        self.resource.map(|r| unsafe { &mut *r.value.get() })
    }

    /// Blocks until `resource` is write-locked. The previous binding, if any, is released first,
    /// so re-locking the same resource doesn't wait on ourselves.
    pub fn lock(&mut self, resource: &'a GuardedResource<T>) {
        self.release();
        *self = resource.write();
    }

    pub fn try_lock(&mut self, resource: &'a GuardedResource<T>) -> bool {
        self.release();
        *self = resource.try_write();
        self.is_locked()
    }

    pub fn unlock(&mut self) {
        if !self.release() {
            panic!(
                "{}",
                LockError::UnlockEmpty {
                    mode: LockMode::Write
                }
            );
        }
    }

    pub fn take(&mut self) -> Self {
        mem::take(self)
    }

    fn release(&mut self) -> bool {
        match self.resource.take() {
            Some(resource) => {
                resource.state.lock().write_held = false;
                true
            }
            None => false,
        }
    }
}

impl<T> Default for WriteGuard<'_, T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        self.get().unwrap_or_else(|| {
            panic!(
                "{}",
                LockError::EmptyGuard {
                    mode: LockMode::Write
                }
            )
        })
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.get_mut().unwrap_or_else(|| {
            panic!(
                "{}",
                LockError::EmptyGuard {
                    mode: LockMode::Write
                }
            )
        })
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T: fmt::Debug> fmt::Debug for WriteGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(value) => f.debug_tuple("WriteGuard").field(value).finish(),
            None => f.write_str("WriteGuard(<empty>)"),
        }
    }
}

fn same_resource<T>(a: Option<&GuardedResource<T>>, b: Option<&GuardedResource<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => ptr::eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
