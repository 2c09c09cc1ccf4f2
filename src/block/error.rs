use super::BlockId;
use std::{error, fmt, io};

/// The state of a manager's read/update bracket, as reported in phase errors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Reading(usize),
    Updating,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Reading(depth) => write!(f, "reading (depth {depth})"),
            Self::Updating => write!(f, "updating"),
        }
    }
}

/// Coarse classification of a [`BlockError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range access to the backing store.
    File,
    /// An operation was called outside the phase that permits it.
    Phase,
    /// A block was used without being checked out, or a phase ended with blocks still checked out.
    Tracking,
    /// A mutator was invoked on a read-only manager.
    ReadOnly,
}

/// Represents the errors raised by block access and block managers.
#[derive(Debug)]
pub enum BlockError {
    OutOfBounds { label: String, id: BlockId, boundary: BlockId },
    NeverWritten { label: String, id: BlockId },
    SizeMismatch { label: String, id: BlockId, expected: usize, actual: usize },
    Closed { label: String },
    LimitReached { label: String },
    IO(io::Error),
    Phase { label: String, op: &'static str, state: Phase },
    NotActive { label: String, op: &'static str, id: BlockId },
    WrongHold { label: String, op: &'static str, id: BlockId, reason: &'static str },
    Leaked { label: String, op: &'static str, read: Vec<BlockId>, write: Vec<BlockId> },
    ReadOnly { label: String, op: &'static str },
}

impl BlockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfBounds { .. }
            | Self::NeverWritten { .. }
            | Self::SizeMismatch { .. }
            | Self::Closed { .. }
            | Self::LimitReached { .. }
            | Self::IO(_) => ErrorKind::File,
            Self::Phase { .. } => ErrorKind::Phase,
            Self::NotActive { .. } | Self::WrongHold { .. } | Self::Leaked { .. } => {
                ErrorKind::Tracking
            }
            Self::ReadOnly { .. } => ErrorKind::ReadOnly,
        }
    }
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { label, id, boundary } => {
                write!(f, "{label}: block {id} is beyond the allocation boundary ({boundary})")
            }
            Self::NeverWritten { label, id } => {
                write!(f, "{label}: block {id} was allocated but never written")
            }
            Self::SizeMismatch { label, id, expected, actual } => {
                write!(f, "{label}: block {id} has size {actual}, expected {expected}")
            }
            Self::Closed { label } => write!(f, "{label}: closed"),
            Self::LimitReached { label } => write!(f, "{label}: block limit reached"),
            Self::IO(ref e) => write!(f, "I/O error: {e}"),
            Self::Phase { label, op, state } => write!(f, "{label}: {op} while {state}"),
            Self::NotActive { label, op, id } => {
                write!(f, "{label}: {op}: block {id} is not an active block")
            }
            Self::WrongHold { label, op, id, reason } => {
                write!(f, "{label}: {op}: block {id} {reason}")
            }
            Self::Leaked { label, op, read, write } => {
                write!(f, "{label}: {op}: outstanding blocks (read: {read:?}, write: {write:?})")
            }
            Self::ReadOnly { label, op } => write!(f, "{label}: {op} on a read-only block manager"),
        }
    }
}

impl error::Error for BlockError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::IO(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BlockError {
    fn from(e: io::Error) -> Self {
        Self::IO(e)
    }
}
