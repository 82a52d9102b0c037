//! # LLM Relay
//!
//! Glue between chat-completion models and browsers listening for
//! server-sent events.
//!
//! ## Features
//!
//! - **Model forwarding**: send a task, with an optional system prompt, to any
//!   OpenAI-compatible endpoint and get the first choice back
//! - **SSE responses**: relay a stream, or a chain invocation, as `text/event-stream`
//!   frames over a pluggable transport
//! - **Failure as events**: a failing source becomes one `error` event and the
//!   response still terminates cleanly
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llm_relay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ForwarderConfig::from_env()?;
//!     let forwarder = ModelForwarder::from_config(config)?;
//!
//!     let answer = forwarder.run("Hello!").await?;
//!     println!("{}", answer);
//!
//!     let (transport, mut rx) = ChannelTransport::new(16);
//!     tokio::spawn(async move {
//!         while let Some(message) = rx.recv().await {
//!             println!("{:?}", message);
//!         }
//!     });
//!     StreamingResponse::from_items(["a", "b"]).respond(&transport).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod llm;
pub mod response;
pub mod session;
pub mod sse;
pub mod transport;

// Re-exports for convenient usage
pub use config::ForwarderConfig;
pub use error::RelayError;
pub use llm::{LLMClient, LLMInput, LLMOutput, LLMEvent, LLMError, ModelForwarder, OpenAIClient};
pub use llm::client::LLMClientBuilder;
pub use response::{
    BackgroundArgs, BackgroundTask, Chain, ChainConfig, ChainOutputs, ChainStreamingResponse,
    EventSender, ResponseHead, RunMode, StreamError, StreamSummary, StreamingResponse,
};
pub use session::{ChatMessage, ChatRole, Session, SessionStatus};
pub use sse::{ServerSentEvent, SseItem};
pub use transport::{ChannelTransport, ResponseMessage, Transport, TransportError, WriterTransport};

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::config::ForwarderConfig;
    pub use crate::llm::{LLMClient, ModelForwarder};
    pub use crate::response::{Chain, ChainConfig, ChainStreamingResponse, RunMode, StreamingResponse};
    pub use crate::sse::{ServerSentEvent, SseItem};
    pub use crate::transport::{ChannelTransport, Transport};
    pub use crate::LLMClientBuilder;
}
