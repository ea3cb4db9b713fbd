//! Store error types

use crate::handles::{HandleId, HandleKind};
use otter_host::HostError;
use std::fmt;
use thiserror::Error;

/// Result type for store operations
pub type KvResult<T> = Result<T, KvError>;

/// Failure category, reported to script code as the exception name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidHandle,
    InvalidArgument,
    InvalidCursorState,
    Engine,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidHandle => "InvalidHandle",
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::InvalidCursorState => "InvalidCursorState",
            ErrorKind::Engine => "EngineError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for store operations
#[derive(Debug, Error)]
pub enum KvError {
    /// Unknown or disposed handle, or a handle of the wrong kind
    #[error("invalid {kind} handle {id}")]
    InvalidHandle { kind: HandleKind, id: HandleId },

    /// Argument of the wrong type or shape
    #[error("{0}")]
    InvalidArgument(String),

    /// Cursor is not positioned where the operation requires
    #[error("{0}")]
    InvalidCursorState(String),

    /// Failure reported by the storage engine or the filesystem
    #[error("{0}")]
    Engine(String),
}

impl KvError {
    pub fn invalid_handle(kind: HandleKind, id: HandleId) -> Self {
        KvError::InvalidHandle { kind, id }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        KvError::InvalidArgument(msg.into())
    }

    pub fn cursor_state(msg: impl Into<String>) -> Self {
        KvError::InvalidCursorState(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        KvError::Engine(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            KvError::InvalidHandle { .. } => ErrorKind::InvalidHandle,
            KvError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            KvError::InvalidCursorState(_) => ErrorKind::InvalidCursorState,
            KvError::Engine(_) => ErrorKind::Engine,
        }
    }

    /// Convert into the exception raised for `op`
    pub fn into_host(self, op: &str) -> HostError {
        HostError::thrown(self.kind().as_str(), format!("{op}: {self}"))
    }
}

macro_rules! engine_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for KvError {
                fn from(err: $ty) -> Self {
                    KvError::Engine(err.to_string())
                }
            }
        )*
    };
}

engine_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
    std::io::Error,
);
