//! Error taxonomy shared by every component of the client.

use thiserror::Error;

/// Every failure mode the client can produce, as laid out in the design spec.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed CLI options or missing required inputs.
    #[error("argument error: {0}")]
    Argument(String),

    /// Missing file, unreadable, malformed, or missing credentials.
    #[error("auth file error: {0}")]
    AuthFile(String),

    /// DNS failure, connect failure, TLS handshake failure, socket I/O failure,
    /// certificate verification failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A read did not produce data within the configured deadline.
    #[error("timed out waiting for server")]
    Timeout,

    /// The peer closed the connection, orderly or otherwise.
    #[error("connection closed by peer")]
    ClosedByPeer,

    /// Malformed response, unexpected completion, truncated literal, missing
    /// UIDVALIDITY, unknown greeting.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Tagged `NO`/`BAD` on LOGIN.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Tagged `NO`/`BAD` on SELECT.
    #[error("mailbox selection failed: {0}")]
    Select(String),

    /// Tagged `NO`/`BAD` on SEARCH or FETCH, after the single allowed retry.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Filesystem errors in the local store.
    #[error("storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => Error::Timeout,
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => Error::ClosedByPeer,
            _ => Error::Transport(e.to_string()),
        }
    }
}
