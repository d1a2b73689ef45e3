//! Envelope type and the SSE wire codec.
//!
//! An envelope is encoded as `field: value` lines followed by a blank line:
//!
//! ```text
//! event: message
//! id: 7
//! retry: 15000
//! data: first line
//! data: second line
//!
//! ```
//!
//! Only `data` gets special treatment (one `data:` line per payload line). No
//! other field is escaped, so event names taken from clients must pass
//! [`validate_event_name`] first.

use crate::error::{Error, Result};

/// Event name used for every message relayed from a broker channel.
pub const MESSAGE_EVENT: &str = "message";

/// One unit of the outgoing event stream. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    event: String,
    id: Option<u64>,
    retry: Option<u64>,
    data: String,
}

/// Reject event names that would break out of their `event:` line.
pub fn validate_event_name(event: &str) -> Result<()> {
    if event.is_empty() {
        return Err(Error::invalid_event_name("event name is empty"));
    }
    if event.contains(['\r', '\n']) {
        return Err(Error::invalid_event_name("event name contains a line break"));
    }
    Ok(())
}

impl Envelope {
    /// Line breaks in `data` are normalized to `\n`.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        let data: String = data.into();
        let data = if data.contains('\r') {
            data.replace("\r\n", "\n").replace('\r', "\n")
        } else {
            data
        };

        Self {
            event: event.into(),
            id: None,
            retry: None,
            data,
        }
    }

    /// Wrap a raw broker payload as a `message` event.
    pub fn message(payload: Vec<u8>) -> Result<Self> {
        let data = String::from_utf8(payload)?;
        Ok(Self::new(MESSAGE_EVENT, data))
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry = Some(retry_ms);
        self
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn id(&self) -> Option<u64> {
        self.id
    }

    pub fn retry(&self) -> Option<u64> {
        self.retry
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// Render this envelope as one SSE frame.
    pub fn encode(&self) -> String {
        encode(&self.event, self.id, self.retry, &self.data)
    }

    /// Parse a single frame back into an envelope.
    ///
    /// Diagnostics only: the gateway never reads frames. Parsing stops at the
    /// first blank line, comments and unknown fields are ignored, and a missing
    /// `event` field means `message`, as an `EventSource` would see it.
    pub fn decode(frame: &str) -> Result<Self> {
        let mut event = None;
        let mut id = None;
        let mut retry = None;
        let mut data: Option<String> = None;

        for line in frame.lines() {
            if line.is_empty() {
                break;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "event" => event = Some(value.to_string()),
                "id" => id = Some(value.parse::<u64>()?),
                "retry" => retry = Some(value.parse::<u64>()?),
                "data" => match data.as_mut() {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => data = Some(value.to_string()),
                },
                _ => {}
            }
        }

        let data = data.ok_or_else(|| Error::decode("frame has no data field"))?;

        Ok(Self {
            event: event.unwrap_or_else(|| MESSAGE_EVENT.to_string()),
            id,
            retry,
            data,
        })
    }
}

/// Encode one SSE frame from its parts.
pub fn encode(event: &str, id: Option<u64>, retry_ms: Option<u64>, data: &str) -> String {
    let mut frame = String::with_capacity(event.len() + data.len() + 32);

    frame.push_str("event: ");
    frame.push_str(event);
    frame.push('\n');

    if let Some(id) = id {
        frame.push_str(&format!("id: {id}\n"));
    }
    if let Some(retry_ms) = retry_ms {
        frame.push_str(&format!("retry: {retry_ms}\n"));
    }

    // CRLF, CR and LF all end a line for an SSE client.
    let normalized = data.replace("\r\n", "\n");
    for line in normalized.split(['\n', '\r']) {
        frame.push_str("data: ");
        frame.push_str(line);
        frame.push('\n');
    }

    frame.push('\n');
    frame
}
