pub mod client;
pub mod forwarder;
pub mod openai;

pub use client::{LLMClient, LLMInput, LLMOutput, LLMEvent, LLMStream, FinishReason, Usage, LLMError};
pub use forwarder::ModelForwarder;
pub use openai::OpenAIClient;
