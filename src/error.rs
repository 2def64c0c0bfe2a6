//! Error Types
//!
//! Every fallible operation in the crate returns [`BloomdError`]. The variants
//! follow where the failure is detected:
//!
//! - **Local**: `InvalidArgument`, `Released`, `NotConnected`, `PoolClosed`,
//!   `NotCheckedOut`, `AcquireTimeout`. Returned synchronously, nothing is
//!   written to the socket.
//! - **Per command**: `Protocol`, `Server`, `UnexpectedResponse`. Delivered
//!   through the command's pending result.
//! - **Per connection**: `ConnectionLost`, `Desync`, `Frame`, `Io`. Every
//!   outstanding command on the connection observes `ConnectionLost`.
//!
//! "Filter does not exist" is not an error. It is reported as
//! [`Lookup::FilterNotFound`](crate::protocol::Lookup::FilterNotFound).

use crate::protocol::FrameError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the bloomd client and pool.
#[derive(Debug, Error)]
pub enum BloomdError {
    /// An argument failed validation before anything was sent.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A reply line did not match the shape expected by its command.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with an error line.
    #[error("server error: {0}")]
    Server(String),

    /// The decoded reply belongs to a different command family.
    #[error("unexpected response for {0} command")]
    UnexpectedResponse(&'static str),

    /// A reply line arrived while no command was outstanding.
    #[error("reply received with no outstanding command: {0:?}")]
    Desync(String),

    /// The inbound byte stream could not be split into lines.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The connection closed or failed before the reply arrived.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The client was released back to its pool and can no longer be used.
    #[error("client was released back to the pool")]
    Released,

    /// The underlying connection is no longer active.
    #[error("client is not connected to the server")]
    NotConnected,

    /// Connecting to the server took longer than the configured timeout.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No pooled connection became available within the acquire timeout.
    #[error("timed out acquiring a connection after {0:?}")]
    AcquireTimeout(Duration),

    /// The pool was closed with `close_connections`.
    #[error("pool was already closed, it can no longer be used")]
    PoolClosed,

    /// The client handed to `release` is not checked out of this pool.
    #[error("client {0} is not checked out of this pool")]
    NotCheckedOut(u64),

    /// Network failure while connecting.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BloomdError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        BloomdError::InvalidArgument(message.into())
    }

    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        BloomdError::Protocol(message.into())
    }

    /// Returns true if the failure means the connection itself is gone.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            BloomdError::ConnectionLost(_) | BloomdError::NotConnected
        )
    }
}

/// Result type for client and pool operations.
pub type Result<T> = std::result::Result<T, BloomdError>;
