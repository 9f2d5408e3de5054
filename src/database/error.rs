//! Store error taxonomy.

use std::io;

use mongodb::error::{ErrorKind, WriteFailure};
use thiserror::Error;

use crate::retry::Transient;

/// MongoDB duplicate key error code.
const DUPLICATE_KEY: i32 = 11000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("operation timed out")]
    Timeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("connection terminated unexpectedly")]
    ConnectionTerminated,

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Backend(String),
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionReset | Self::Timeout | Self::ConnectionRefused | Self::ConnectionTerminated
        )
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset => Self::ConnectionReset,
            io::ErrorKind::TimedOut => Self::Timeout,
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionAborted => Self::ConnectionTerminated,
            _ => Self::Backend(err.to_string()),
        }
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::Io(io_err) => match io_err.kind() {
                io::ErrorKind::ConnectionReset => Self::ConnectionReset,
                io::ErrorKind::TimedOut => Self::Timeout,
                io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
                io::ErrorKind::UnexpectedEof
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionAborted => Self::ConnectionTerminated,
                _ => Self::Backend(err.to_string()),
            },
            ErrorKind::ServerSelection { .. } => Self::Timeout,
            ErrorKind::ConnectionPoolCleared { .. } => Self::ConnectionTerminated,
            ErrorKind::Write(WriteFailure::WriteError(write_error))
                if write_error.code == DUPLICATE_KEY =>
            {
                Self::Duplicate(write_error.message.clone())
            }
            _ => Self::Backend(err.to_string()),
        }
    }
}
