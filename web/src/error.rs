use std::error::Error as StdError;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use ::sse::{Error as SseError, ErrorKind as SseErrorKind};

use log::*;

/// Body served to clients that do not accept `text/event-stream`.
pub(crate) const SSE_ONLY_BODY: &str =
    "<!DOCTYPE html><html><title></title><body>SSE only!</body></html>";

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug)]
pub struct Error(SseError);

impl StdError for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> core::result::Result<(), std::fmt::Error> {
        write!(fmt, "{self:?}")
    }
}

// List of possible StatusCode variants https://docs.rs/http/latest/http/status/struct.StatusCode.html#associatedconstant.UNPROCESSABLE_ENTITY
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self.0.error_kind {
            // Not a failure: the client simply asked for something other than a stream.
            SseErrorKind::Negotiation => (StatusCode::OK, Html(SSE_ONLY_BODY)).into_response(),
            SseErrorKind::BrokerConnection => {
                warn!("Broker unavailable: {}", self.0);
                (StatusCode::BAD_GATEWAY, "BAD GATEWAY").into_response()
            }
            SseErrorKind::Encoding | SseErrorKind::InvalidEventName(_) => {
                debug!("Unprocessable request: {}", self.0);
                (StatusCode::UNPROCESSABLE_ENTITY, "UNPROCESSABLE ENTITY").into_response()
            }
            SseErrorKind::BrokerConfig | SseErrorKind::Decode(_) => {
                error!("Internal SSE error: {}", self.0);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL SERVER ERROR").into_response()
            }
        }
    }
}

impl<E> From<E> for Error
where
    E: Into<SseError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
