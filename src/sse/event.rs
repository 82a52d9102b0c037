//! Server-sent event framing.
//!
//! An encoded event looks like:
//! ```text
//! : optional comment
//! id: 42
//! event: error
//! data: {"status_code":500,"detail":"Internal Server Error"}
//! retry: 3000
//!
//! ```
//! Each field line ends with the configured separator, and a lone separator
//! terminates the event.

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Line separator used when none is configured.
pub const DEFAULT_SEPARATOR: &str = "\n";

/// Status code carried by the synthetic error event.
pub const INTERNAL_SERVER_ERROR_CODE: u16 = 500;

/// Detail carried by the synthetic error event.
pub const INTERNAL_SERVER_ERROR_DETAIL: &str = "Internal Server Error";

/// Event name of the synthetic error event.
pub const ERROR_EVENT: &str = "error";

/// A single server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSentEvent {
    /// Payload, written as one `data:` line per payload line
    pub data: String,
    /// Optional event name
    pub event: Option<String>,
    /// Optional last-event id
    pub id: Option<String>,
    /// Optional reconnection delay in milliseconds
    pub retry: Option<u64>,
    /// Optional comment, ignored by EventSource clients
    pub comment: Option<String>,
}

/// Payload of the error event sent when a stream source fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ErrorPayload {
    pub status_code: u16,
    pub detail: String,
}

impl ServerSentEvent {
    /// Creates an event carrying `data`.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Creates an event whose data is the JSON encoding of `payload`.
    pub fn json<T: Serialize + ?Sized>(payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string(payload)?))
    }

    /// The fixed `error` event. It never carries details of the underlying failure.
    pub fn internal_error() -> Self {
        let payload = serde_json::json!({
            "status_code": INTERNAL_SERVER_ERROR_CODE,
            "detail": INTERNAL_SERVER_ERROR_DETAIL,
        });
        Self::new(payload.to_string()).with_event(ERROR_EVENT)
    }

    /// Sets the event name.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Sets the event id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the reconnection delay.
    pub fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry = Some(retry_ms);
        self
    }

    /// Sets a comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Deserializes the data field as JSON.
    pub fn data_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.data)
    }

    /// Encodes the event with [`DEFAULT_SEPARATOR`].
    pub fn encode(&self) -> Bytes {
        self.encode_with(DEFAULT_SEPARATOR)
    }

    /// Encodes the event using `sep` as the line terminator.
    pub fn encode_with(&self, sep: &str) -> Bytes {
        let mut buf = String::with_capacity(self.data.len() + 32);

        if let Some(comment) = &self.comment {
            for line in split_lines(comment) {
                buf.push_str(": ");
                buf.push_str(line);
                buf.push_str(sep);
            }
        }
        // Single-line fields must not smuggle extra fields into the frame.
        if let Some(id) = &self.id {
            push_field(&mut buf, "id", &single_line(id), sep);
        }
        if let Some(event) = &self.event {
            push_field(&mut buf, "event", &single_line(event), sep);
        }
        // A comment-only frame is a keepalive and carries no data.
        let keepalive = self.data.is_empty()
            && self.comment.is_some()
            && self.id.is_none()
            && self.event.is_none();
        if !keepalive {
            for line in split_lines(&self.data) {
                push_field(&mut buf, "data", line, sep);
            }
        }
        if let Some(retry) = self.retry {
            push_field(&mut buf, "retry", &retry.to_string(), sep);
        }
        buf.push_str(sep);

        Bytes::from(buf)
    }

    /// Parses one encoded event, accepting `\n`, `\r\n` or `\r` line endings.
    ///
    /// Returns `None` when the frame holds no recognised field.
    pub fn parse(frame: &str) -> Option<Self> {
        let mut event = Self::default();
        let mut data_lines: Vec<&str> = Vec::new();
        let mut comments: Vec<&str> = Vec::new();
        let mut seen = false;

        for line in frame.split(['\n', '\r']) {
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix(':') {
                comments.push(comment.strip_prefix(' ').unwrap_or(comment));
                seen = true;
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };

            match field {
                "data" => data_lines.push(value),
                "event" => event.event = Some(value.to_string()),
                "id" => event.id = Some(value.to_string()),
                "retry" => match value.parse() {
                    Ok(retry) => event.retry = Some(retry),
                    Err(_) => continue,
                },
                _ => continue,
            }
            seen = true;
        }

        if !seen {
            return None;
        }
        event.data = data_lines.join("\n");
        if !comments.is_empty() {
            event.comment = Some(comments.join("\n"));
        }
        Some(event)
    }
}

fn push_field(buf: &mut String, name: &str, value: &str, sep: &str) {
    buf.push_str(name);
    buf.push_str(": ");
    buf.push_str(value);
    buf.push_str(sep);
}

/// Splits on `\r\n`, `\r` or `\n`, keeping empty segments, so every
/// segment becomes its own `data:` line.
fn split_lines(value: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(value);
    std::iter::from_fn(move || {
        let current = rest?;
        match current.find(['\r', '\n']) {
            Some(pos) => {
                let skip = if current[pos..].starts_with("\r\n") { 2 } else { 1 };
                rest = Some(&current[pos + skip..]);
                Some(&current[..pos])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

fn single_line(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

/// One item produced by a stream source.
#[derive(Debug, Clone, PartialEq)]
pub enum SseItem {
    /// A fully specified event
    Event(ServerSentEvent),
    /// Plain text, sent as the event data
    Text(String),
    /// A JSON value, serialized compactly as the event data
    Json(Value),
    /// Bytes already framed by the producer, sent as-is
    Raw(Bytes),
}

impl SseItem {
    /// Encodes the item into body bytes.
    pub fn into_frame(self, sep: &str) -> Bytes {
        match self {
            SseItem::Event(event) => event.encode_with(sep),
            SseItem::Text(text) => ServerSentEvent::new(text).encode_with(sep),
            SseItem::Json(value) => ServerSentEvent::new(value.to_string()).encode_with(sep),
            SseItem::Raw(bytes) => bytes,
        }
    }
}

impl From<ServerSentEvent> for SseItem {
    fn from(event: ServerSentEvent) -> Self {
        SseItem::Event(event)
    }
}

impl From<String> for SseItem {
    fn from(text: String) -> Self {
        SseItem::Text(text)
    }
}

impl From<&str> for SseItem {
    fn from(text: &str) -> Self {
        SseItem::Text(text.to_string())
    }
}

impl From<Value> for SseItem {
    fn from(value: Value) -> Self {
        SseItem::Json(value)
    }
}

impl From<Bytes> for SseItem {
    fn from(bytes: Bytes) -> Self {
        SseItem::Raw(bytes)
    }
}
