use bytes::Bytes;
use tracing::{debug, info};

use super::{StreamError, StreamSummary};
use crate::session::{Session, SessionStatus};
use crate::sse::{ServerSentEvent, SseItem};
use crate::transport::{ResponseMessage, Transport};

/// Sends the frames of one response in lifecycle order.
///
/// The writer enforces `start` before any body chunk, and sends the terminal
/// frame at most once no matter how often `close` is called. The session only
/// advances once the transport has accepted the frame.
pub struct ResponseWriter<'a> {
    transport: &'a dyn Transport,
    session: Session,
    separator: &'a str,
    failed: bool,
}

impl<'a> ResponseWriter<'a> {
    /// Creates a writer for a new session.
    pub fn new(transport: &'a dyn Transport, separator: &'a str) -> Self {
        Self {
            transport,
            session: Session::new(),
            separator,
            failed: false,
        }
    }

    /// Returns the session this writer drives.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Sends the response head. Only valid once, before any body chunk.
    pub async fn start(&mut self, status: u16, headers: &[(String, String)]) -> Result<(), StreamError> {
        self.session.check_advance(SessionStatus::Started)?;
        info!(session = %self.session.id, status, "Starting streamed response");
        self.transport
            .send(ResponseMessage::Start {
                status,
                headers: headers.to_vec(),
            })
            .await?;
        self.session.advance(SessionStatus::Started)
    }

    /// Encodes `item` and sends it as a non-terminal body chunk.
    pub async fn send_item(&mut self, item: SseItem) -> Result<(), StreamError> {
        let chunk = item.into_frame(self.separator);
        self.send_chunk(chunk).await
    }

    /// Sends the fixed `error` event and marks the session as failed.
    pub async fn send_error_event(&mut self) -> Result<(), StreamError> {
        self.failed = true;
        let chunk = ServerSentEvent::internal_error().encode_with(self.separator);
        self.send_chunk(chunk).await
    }

    async fn send_chunk(&mut self, chunk: Bytes) -> Result<(), StreamError> {
        self.session.check_advance(SessionStatus::Streaming)?;
        debug!(
            chunk = %String::from_utf8_lossy(&chunk).trim_end(),
            "Sending body chunk"
        );
        self.transport
            .send(ResponseMessage::Body {
                body: chunk,
                more_body: true,
            })
            .await?;
        self.session.advance(SessionStatus::Streaming)
    }

    /// Sends the terminal frame.
    ///
    /// Returns `Ok(false)` without sending anything if the response is
    /// already closed.
    pub async fn close(&mut self) -> Result<bool, StreamError> {
        if self.session.is_closed() {
            return Ok(false);
        }
        self.session.check_advance(SessionStatus::Closed)?;
        self.transport
            .send(ResponseMessage::Body {
                body: Bytes::new(),
                more_body: false,
            })
            .await?;
        self.session.advance(SessionStatus::Closed)?;
        info!(
            session = %self.session.id,
            chunks = self.session.chunks_sent,
            failed = self.failed,
            "Closed streamed response"
        );
        Ok(true)
    }

    /// Summarizes the session so far.
    pub fn summary(&self) -> StreamSummary {
        StreamSummary {
            session_id: self.session.id.clone(),
            chunks_sent: self.session.chunks_sent,
            failed: self.failed,
        }
    }
}
