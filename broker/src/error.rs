//! Error types for the `broker` crate.
//!
//! Follows the same pattern as the other layers: a root Error struct holding an
//! error kind and an optional source for error chaining.

use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

/// Top-level error type for broker operations.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Categories of failures a broker adapter can report.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The broker could not be reached, or the connection dropped mid-operation.
    Connection,
    /// The broker rejected the configuration (e.g. a malformed URL).
    Config,
}

impl Error {
    pub fn connection(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Error {
            source: Some(source.into()),
            error_kind: ErrorKind::Connection,
        }
    }

    pub fn config(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Error {
            source: Some(source.into()),
            error_kind: ErrorKind::Config,
        }
    }

    pub fn is_connection(&self) -> bool {
        self.error_kind == ErrorKind::Connection
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Broker error ({:?}): {source}", self.error_kind),
            None => write!(f, "Broker error ({:?})", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        // An invalid client URL is a configuration problem; everything else that
        // redis reports means the broker is not reachable.
        if err.kind() == redis::ErrorKind::InvalidClientConfig {
            Error::config(err)
        } else {
            Error::connection(err)
        }
    }
}
