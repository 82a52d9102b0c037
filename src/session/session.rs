use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::response::StreamError;

/// Bookkeeping for one streamed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier for the session, used in log spans
    pub id: String,
    /// Where the response currently is in its lifecycle
    pub status: SessionStatus,
    /// Timestamp when the session was created
    pub created_at: DateTime<Utc>,
    /// Number of non-terminal body chunks sent so far
    pub chunks_sent: usize,
}

/// Lifecycle of a streamed response.
///
/// Transitions only move forward: `Idle -> Started -> Streaming -> Closed`,
/// where `Streaming` may be skipped when the body is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Nothing sent yet
    Idle,
    /// Response head sent
    Started,
    /// At least one body chunk sent
    Streaming,
    /// Terminal frame sent
    Closed,
}

impl SessionStatus {
    /// Returns the status name as written in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Started => "started",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Closed => "closed",
        }
    }

    fn can_advance_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Idle, Started)
                | (Started, Streaming)
                | (Streaming, Streaming)
                | (Started, Closed)
                | (Streaming, Closed)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Session {
    /// Creates a new idle session.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: SessionStatus::Idle,
            created_at: Utc::now(),
            chunks_sent: 0,
        }
    }

    /// Checks that the session may move to `next` without moving it.
    pub fn check_advance(&self, next: SessionStatus) -> Result<(), StreamError> {
        if !self.status.can_advance_to(next) {
            return Err(StreamError::InvalidState {
                expected: next.as_str(),
                actual: self.status.as_str(),
            });
        }
        Ok(())
    }

    /// Moves the session to `next`, rejecting backward or skipped transitions.
    pub fn advance(&mut self, next: SessionStatus) -> Result<(), StreamError> {
        self.check_advance(next)?;
        if next == SessionStatus::Streaming {
            self.chunks_sent += 1;
        }
        self.status = next;
        Ok(())
    }

    /// Returns whether the terminal frame has been sent.
    pub fn is_closed(&self) -> bool {
        self.status == SessionStatus::Closed
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
