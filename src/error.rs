//! Error types for the llm-relay library.

use thiserror::Error;

/// Unified error type for the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// LLM-related error
    #[error("LLM error: {0}")]
    LLM(#[from] crate::llm::LLMError),

    /// Streaming response error
    #[error("Stream error: {0}")]
    Stream(#[from] crate::response::StreamError),

    /// Transport error outside of a streamed response
    #[error("Transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
