//! Failure taxonomy shared by the chain, the retry middleware and the
//! rate limiter.
//!
//! # Design Decisions
//! - A received response with an error status is NOT an error; it travels as
//!   `Ok(Response)` so callers can tell "bad status" from "call failed"
//! - Transport failures keep their cause chain so retry matching can walk it
//! - Exhausted retries surface the last outcome verbatim, so there is no
//!   "exhausted" variant here

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while executing a request through a chain.
#[derive(Debug, Error)]
pub enum Error {
    /// The terminal call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request deadline elapsed before a response arrived.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A backoff or admission wait was cancelled.
    #[error("wait interrupted by cancellation")]
    Interrupted,

    /// The rate limiter refused admission.
    #[error("rate limit exceeded ({strategy})")]
    RateLimited { strategy: &'static str },

    /// A middleware short-circuited the request with an error.
    #[error("request rejected by {middleware}: {reason}")]
    Rejected { middleware: String, reason: String },

    /// The request could not be turned into a transport call.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Build a `Rejected` error.
    pub fn rejected(middleware: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Rejected {
            middleware: middleware.into(),
            reason: reason.into(),
        }
    }

    /// Transport error kind, if this is a transport failure.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Error::Transport(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// Walk this error and its `source()` chain, yielding every transport
    /// error kind found along the way.
    ///
    /// Links are recognised as either [`TransportError`] or [`std::io::Error`].
    pub fn kinds_in_chain(&self) -> Vec<TransportErrorKind> {
        let mut kinds = Vec::new();
        if let Error::Timeout(_) = self {
            kinds.push(TransportErrorKind::TimedOut);
        }
        // `Transport` is transparent, so start from the inner error itself.
        let mut link: Option<&(dyn StdError + 'static)> = match self {
            Error::Transport(inner) => Some(inner),
            other => other.source(),
        };
        while let Some(err) = link {
            if let Some(t) = err.downcast_ref::<TransportError>() {
                kinds.push(t.kind());
            } else if let Some(io_err) = err.downcast_ref::<io::Error>() {
                kinds.push(TransportErrorKind::from(io_err.kind()));
            }
            link = err.source();
        }
        kinds.dedup();
        kinds
    }
}

/// Category of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    ConnectionRefused,
    ConnectionReset,
    ConnectionAborted,
    TimedOut,
    Dns,
    Protocol,
    Io,
    Other,
}

impl TransportErrorKind {
    /// Kinds retried by default: failures where the request most likely
    /// never reached the application on the other side, plus timeouts.
    pub fn defaults() -> [TransportErrorKind; 4] {
        [
            TransportErrorKind::ConnectionRefused,
            TransportErrorKind::ConnectionReset,
            TransportErrorKind::ConnectionAborted,
            TransportErrorKind::TimedOut,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::ConnectionRefused => "connection_refused",
            TransportErrorKind::ConnectionReset => "connection_reset",
            TransportErrorKind::ConnectionAborted => "connection_aborted",
            TransportErrorKind::TimedOut => "timed_out",
            TransportErrorKind::Dns => "dns",
            TransportErrorKind::Protocol => "protocol",
            TransportErrorKind::Io => "io",
            TransportErrorKind::Other => "other",
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<io::ErrorKind> for TransportErrorKind {
    fn from(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::ConnectionRefused => TransportErrorKind::ConnectionRefused,
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => {
                TransportErrorKind::ConnectionReset
            }
            io::ErrorKind::ConnectionAborted | io::ErrorKind::NotConnected => {
                TransportErrorKind::ConnectionAborted
            }
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportErrorKind::TimedOut,
            io::ErrorKind::InvalidData | io::ErrorKind::UnexpectedEof => {
                TransportErrorKind::Protocol
            }
            _ => TransportErrorKind::Io,
        }
    }
}

/// Failure of the terminal transport call.
#[derive(Debug, Error)]
#[error("{kind} transport error: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach an underlying cause.
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::new(TransportErrorKind::from(err.kind()), err.to_string()).with_source(err)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Transport(err.into())
    }
}
