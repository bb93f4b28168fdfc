//! Kernel-local error type.
//!
//! The kernel never surfaces asynchronous-input failures upward (§7): this type only
//! covers the one case a caller needs to observe: the kernel's command channel having
//! gone away, which only happens once every `KernelHandle` has been dropped and the
//! `Kernel::run` task has exited.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The kernel's command loop has already shut down.
    KernelStopped,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::KernelStopped => write!(f, "control kernel has stopped accepting commands"),
        }
    }
}

impl std::error::Error for Error {}
