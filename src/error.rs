use std::io;

use thiserror::Error;

/// Open-time counter failure, translated from the errno left behind by
/// `perf_event_open(2)`.
///
/// The set of codes the syscall can produce is closed, so each gets a fixed
/// message; anything unrecognized falls through to [`OpenError::Other`] with
/// the raw errno. None of these are fatal: the affected task is simply not
/// measured until a later round succeeds.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum OpenError {
    #[error("event attr struct is too small")]
    AttrTooSmall,
    #[error("performance counters not permitted or available; try a newer kernel or the CAP_PERFMON capability")]
    NotPermitted,
    #[error("event group fd not valid")]
    BadGroupFd,
    #[error("another process has exclusive access to performance counters")]
    ExclusivelyHeld,
    #[error("invalid memory address")]
    BadAddress,
    #[error("invalid event")]
    InvalidEvent,
    #[error("not enough file descriptors available")]
    FdExhausted,
    #[error("event not supported on this CPU")]
    UnsupportedOnCpu,
    #[error("invalid event type")]
    InvalidEventType,
    #[error("too many hardware breakpoint events")]
    BreakpointsExhausted,
    #[error("hardware support not available")]
    NoHardwareSupport,
    #[error("unsupported event exclusion setting")]
    BadExclusion,
    #[error("invalid pid for event")]
    InvalidPid,
    #[error("performance counter error, errno = {0}")]
    Other(i32),
}

impl OpenError {
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc::E2BIG => Self::AttrTooSmall,
            libc::EACCES => Self::NotPermitted,
            libc::EBADF => Self::BadGroupFd,
            libc::EBUSY => Self::ExclusivelyHeld,
            libc::EFAULT => Self::BadAddress,
            libc::EINVAL => Self::InvalidEvent,
            libc::EMFILE => Self::FdExhausted,
            libc::ENODEV => Self::UnsupportedOnCpu,
            libc::ENOENT => Self::InvalidEventType,
            libc::ENOSPC => Self::BreakpointsExhausted,
            libc::EOPNOTSUPP => Self::NoHardwareSupport,
            libc::EPERM => Self::BadExclusion,
            libc::ESRCH => Self::InvalidPid,
            other => Self::Other(other),
        }
    }
}

impl From<io::Error> for OpenError {
    fn from(err: io::Error) -> Self {
        // The error always carries an errno since the syscall layer builds
        // it via `Error::last_os_error`.
        Self::from_errno(err.raw_os_error().unwrap_or_default())
    }
}
