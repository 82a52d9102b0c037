//! Shared helpers for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Mutex;

use llm_relay::sse::ServerSentEvent;
use llm_relay::transport::{ResponseMessage, Transport, TransportError};

/// Transport that keeps every message it is given.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    messages: Mutex<Vec<ResponseMessage>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<ResponseMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn frames(&self) -> Frames {
        Frames::from_messages(&self.messages())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, message: ResponseMessage) -> Result<(), TransportError> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

/// Transport that accepts the head and then refuses every body frame.
#[derive(Debug, Default)]
pub struct HangupTransport;

#[async_trait]
impl Transport for HangupTransport {
    async fn send(&self, message: ResponseMessage) -> Result<(), TransportError> {
        match message {
            ResponseMessage::Start { .. } => Ok(()),
            ResponseMessage::Body { .. } => Err(TransportError::Closed),
        }
    }
}

/// Recorded messages, sorted by kind.
#[derive(Debug, Default)]
pub struct Frames {
    pub starts: usize,
    pub data: Vec<ServerSentEvent>,
    pub errors: Vec<ServerSentEvent>,
    pub terminals: usize,
    /// Index of the terminal frame in send order
    pub terminal_position: Option<usize>,
    pub total: usize,
}

impl Frames {
    pub fn from_messages(messages: &[ResponseMessage]) -> Self {
        let mut frames = Frames {
            total: messages.len(),
            ..Frames::default()
        };

        for (index, message) in messages.iter().enumerate() {
            match message {
                ResponseMessage::Start { .. } => frames.starts += 1,
                ResponseMessage::Body { more_body: false, body } => {
                    assert!(body.is_empty(), "terminal frame must be empty");
                    frames.terminals += 1;
                    frames.terminal_position = Some(index);
                }
                ResponseMessage::Body { body, .. } => {
                    let text = std::str::from_utf8(body).expect("frames are utf-8");
                    let event = ServerSentEvent::parse(text).expect("body chunk is an SSE event");
                    if event.event.as_deref() == Some("error") {
                        frames.errors.push(event);
                    } else {
                        frames.data.push(event);
                    }
                }
            }
        }
        frames
    }
}
