//! Streaming SSE responses.
//!
//! [`StreamingResponse`] relays an async stream of items, and
//! [`ChainStreamingResponse`] relays a single chain invocation together with
//! the events the chain emits while it runs. Both send exactly one response
//! head and exactly one terminal frame. A failing source becomes a single
//! `error` event instead of an HTTP error, because the `200` head is already
//! on the wire by then.

pub mod background;
pub mod chain;
pub mod streaming;
pub mod writer;

pub use background::{BackgroundArgs, BackgroundTask};
pub use chain::{Chain, ChainConfig, ChainOutputs, ChainStreamingResponse, EventSender, RunMode};
pub use streaming::{BodyStream, StreamingResponse};
pub use writer::ResponseWriter;

use crate::sse::DEFAULT_SEPARATOR;
use crate::transport::TransportError;

/// Errors from driving a streamed response.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The requested run mode is not one of the supported modes
    #[error("Invalid run mode '{0}'. Must be one of [async, sync]")]
    InvalidRunMode(String),
    /// An operation was attempted out of lifecycle order
    #[error("Invalid state: cannot move to {expected} from {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
    /// The response body has already been streamed
    #[error("Response body already consumed")]
    BodyConsumed,
    /// The HTTP layer rejected a frame
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Status, headers and line separator of a streamed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// HTTP status code
    pub status: u16,
    /// Response headers, in send order
    pub headers: Vec<(String, String)>,
    /// Line separator used when encoding events
    pub separator: String,
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self {
            status: 200,
            headers: vec![
                ("Content-Type".to_string(), "text/event-stream".to_string()),
                ("Cache-Control".to_string(), "no-cache".to_string()),
                ("Connection".to_string(), "keep-alive".to_string()),
                ("X-Accel-Buffering".to_string(), "no".to_string()),
            ],
            separator: DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl ResponseHead {
    /// Sets the status code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Sets a header, replacing any existing header of the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Sets the line separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }
}

/// What happened while streaming one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    /// Session id, as seen in the logs
    pub session_id: String,
    /// Non-terminal body chunks sent, including an error event
    pub chunks_sent: usize,
    /// Whether the source failed and an error event was sent
    pub failed: bool,
}
