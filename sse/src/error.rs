//! Error types for the `sse` crate.
//!
//! A peer disconnecting is deliberately absent from this taxonomy: it is a
//! normal way for a stream to end and is reported as a terminal
//! [`StreamState`](crate::session::StreamState), never as an error.

use std::error::Error as StdError;
use std::fmt;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    /// The client did not ask for `text/event-stream`.
    Negotiation,
    /// The broker could not be reached to subscribe or publish.
    BrokerConnection,
    /// The broker rejected its configuration.
    BrokerConfig,
    /// A payload could not be represented as UTF-8 text.
    Encoding,
    /// An event name cannot be written on a single `event:` line.
    InvalidEventName(String),
    /// A wire frame could not be parsed back into an envelope.
    Decode(String),
}

impl Error {
    pub fn negotiation() -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::Negotiation,
        }
    }

    pub fn invalid_event_name(reason: impl Into<String>) -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::InvalidEventName(reason.into()),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::Decode(reason.into()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Negotiation => write!(f, "client did not accept text/event-stream"),
            ErrorKind::BrokerConnection => write!(f, "broker unreachable: {self:?}"),
            ErrorKind::BrokerConfig => write!(f, "broker misconfigured: {self:?}"),
            ErrorKind::Encoding => write!(f, "payload is not valid UTF-8"),
            ErrorKind::InvalidEventName(reason) => write!(f, "invalid event name: {reason}"),
            ErrorKind::Decode(reason) => write!(f, "malformed event frame: {reason}"),
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

// Translate broker failures into this layer's kinds.
impl From<broker::Error> for Error {
    fn from(err: broker::Error) -> Self {
        let error_kind = match err.error_kind {
            broker::ErrorKind::Connection => ErrorKind::BrokerConnection,
            broker::ErrorKind::Config => ErrorKind::BrokerConfig,
        };
        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Encoding,
        }
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(err: std::num::ParseIntError) -> Self {
        Error {
            error_kind: ErrorKind::Decode(err.to_string()),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_connection_error_translates() {
        let err: Error = broker::Error::connection("refused").into();
        assert_eq!(err.error_kind, ErrorKind::BrokerConnection);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_invalid_utf8_is_encoding_error() {
        let err: Error = String::from_utf8(vec![0xff, 0xfe]).unwrap_err().into();
        assert_eq!(err.error_kind, ErrorKind::Encoding);
    }
}
