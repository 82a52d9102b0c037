//! The send boundary between a streamed response and the HTTP connection.
//!
//! A response is emitted as a sequence of [`ResponseMessage`]s: one `Start`
//! carrying the status and headers, then `Body` frames. The last frame has
//! `more_body == false`.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// One message sent to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseMessage {
    /// Response head
    Start {
        status: u16,
        headers: Vec<(String, String)>,
    },
    /// A body segment; `more_body == false` ends the response
    Body { body: Bytes, more_body: bool },
}

impl ResponseMessage {
    /// Returns whether this message is the terminal body frame.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResponseMessage::Body { more_body: false, .. })
    }
}

/// Errors raised while handing frames to the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The receiving side has gone away
    #[error("Transport closed")]
    Closed,
    /// Writing to the connection failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Receives the frames of a streamed response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hands one message to the HTTP layer.
    async fn send(&self, message: ResponseMessage) -> Result<(), TransportError>;
}

/// A transport that forwards messages over a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<ResponseMessage>,
}

impl ChannelTransport {
    /// Creates a transport and the receiver that observes its messages.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ResponseMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: ResponseMessage) -> Result<(), TransportError> {
        self.tx.send(message).await.map_err(|_| TransportError::Closed)
    }
}

/// A transport that writes HTTP/1.1 directly to an async writer.
///
/// The body is written unframed, so the head always carries
/// `Connection: close` in place of any `Connection` header it was given, and
/// the terminal frame flushes and shuts the writer down.
#[derive(Debug)]
pub struct WriterTransport<W> {
    writer: Mutex<W>,
}

impl<W> WriterTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wraps `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

/// Serializes a response head in HTTP/1.1 wire format.
pub fn encode_head(status: u16, headers: &[(String, String)]) -> Bytes {
    let mut buf = BytesMut::with_capacity(128 + headers.len() * 48);
    buf.put(format!("HTTP/1.1 {} {}\r\n", status, reason_phrase(status)).as_bytes());
    for (name, value) in headers {
        // Header values must not split the head.
        let value: String = value.chars().filter(|c| *c != '\r' && *c != '\n').collect();
        buf.put(format!("{name}: {value}\r\n").as_bytes());
    }
    buf.put(&b"\r\n"[..]);
    buf.freeze()
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

#[async_trait]
impl<W> Transport for WriterTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: ResponseMessage) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        match message {
            ResponseMessage::Start { status, mut headers } => {
                headers.retain(|(name, _)| !name.eq_ignore_ascii_case("connection"));
                headers.push(("Connection".to_string(), "close".to_string()));
                writer.write_all(&encode_head(status, &headers)).await?;
            }
            ResponseMessage::Body { body, more_body } => {
                if !body.is_empty() {
                    writer.write_all(&body).await?;
                }
                writer.flush().await?;
                if !more_body {
                    debug!("Terminal frame written, shutting down writer");
                    writer.shutdown().await?;
                }
            }
        }
        Ok(())
    }
}
