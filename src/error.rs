//! Error taxonomy for channel operations
//!
//! Every error is returned from the call that produced it; the engine keeps
//! no global error state and never retries anything on its own except the
//! wait-then-recheck loop of blocking I/O.

use std::io;

/// Errors produced by [`crate::ring::RingChannel`] operations.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// A blocking wait (or a lock acquisition) was cancelled through the
    /// session's [`crate::cancel::CancelToken`]. No state was changed.
    #[error("operation interrupted by cancellation")]
    Interrupted,

    /// A non-blocking call found no data (read) or no space (write).
    /// Caller-retriable.
    #[error("operation would block")]
    WouldBlock,

    /// Allocating channel storage on first open failed. No counter was
    /// touched.
    #[error("out of memory allocating channel storage")]
    OutOfMemory,

    /// A storage transfer fell outside the allocated buffer. Indicates a
    /// corrupted cursor; surfaced instead of panicking.
    #[error("storage transfer failed")]
    Fault,

    /// The session does not hold the Read capability.
    #[error("session not open for reading")]
    NotOpenForRead,

    /// The session does not hold the Write capability.
    #[error("session not open for writing")]
    NotOpenForWrite,

    /// A blocking write found the buffer full with no reader session left
    /// to ever drain it.
    #[error("no readers left on channel")]
    BrokenPipe,
}

impl embedded_io::Error for RingError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            RingError::Interrupted => embedded_io::ErrorKind::Interrupted,
            RingError::OutOfMemory => embedded_io::ErrorKind::OutOfMemory,
            RingError::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            RingError::NotOpenForRead | RingError::NotOpenForWrite => {
                embedded_io::ErrorKind::PermissionDenied
            }
            RingError::WouldBlock | RingError::Fault => embedded_io::ErrorKind::Other,
        }
    }
}

impl From<RingError> for io::Error {
    fn from(e: RingError) -> Self {
        let kind = match e {
            RingError::Interrupted => io::ErrorKind::Interrupted,
            RingError::WouldBlock => io::ErrorKind::WouldBlock,
            RingError::OutOfMemory => io::ErrorKind::OutOfMemory,
            RingError::BrokenPipe => io::ErrorKind::BrokenPipe,
            RingError::NotOpenForRead | RingError::NotOpenForWrite => {
                io::ErrorKind::PermissionDenied
            }
            RingError::Fault => io::ErrorKind::Other,
        };
        io::Error::new(kind, e.to_string())
    }
}
