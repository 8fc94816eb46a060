//! # Errors
//!
//! Only the deadline variants are ever returned. The rest describe programmer bugs and are
//! raised as panics carrying these messages: a non-blocking miss is an empty guard, not an error.

use thiserror::Error;

use crate::LockMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("timed out waiting for a {mode} lock")]
    TimedOut { mode: LockMode },

    #[error("timed out waiting for every resource of the lock set")]
    SetTimedOut,

    #[error("tried to access an empty {mode} guard")]
    EmptyGuard { mode: LockMode },

    #[error("tried to unlock an empty {mode} guard")]
    UnlockEmpty { mode: LockMode },

    #[error("guarded resource torn down while locked (writer: {writer}, readers: {readers})")]
    StillLocked { writer: bool, readers: usize },
}
