use std::sync::Arc;
use tracing::debug;

use super::client::LLMClientBuilder;
use super::{LLMClient, LLMError, LLMInput, LLMStream};
use crate::config::ForwarderConfig;
use crate::session::ChatMessage;

/// Forwards single tasks to a chat-completion model.
///
/// The model name and system prompt come from the [`ForwarderConfig`] given
/// at construction. Errors from the client are returned unchanged; there is
/// no retry.
#[derive(Clone)]
pub struct ModelForwarder {
    config: ForwarderConfig,
    client: Arc<dyn LLMClient>,
}

impl ModelForwarder {
    /// Creates a forwarder that sends requests through `client`.
    pub fn new(config: ForwarderConfig, client: Arc<dyn LLMClient>) -> Self {
        Self { config, client }
    }

    /// Creates a forwarder with an OpenAI-compatible client built from the
    /// configured base URL, API key and timeout.
    pub fn from_config(config: ForwarderConfig) -> Result<Self, LLMError> {
        let mut builder = LLMClientBuilder::new().with_base_url(config.base_url.clone());
        if let Some(api_key) = &config.api_key {
            builder = builder.with_api_key(api_key.clone());
        }
        if let Some(timeout) = config.timeout() {
            builder = builder.with_timeout(timeout);
        }
        let client = builder.build_openai()?;
        Ok(Self::new(config, client))
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    /// Builds the conversation for `task`: the system prompt, if any, then the task.
    pub fn build_messages(&self, task: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = self.config.system_prompt.as_deref() {
            if !system_prompt.is_empty() {
                messages.push(ChatMessage::system(system_prompt));
            }
        }
        messages.push(ChatMessage::user(task));
        messages
    }

    fn input(&self, task: &str) -> LLMInput {
        LLMInput {
            model: self.config.model_name.clone(),
            messages: self.build_messages(task),
            max_tokens: None,
            temperature: None,
        }
    }

    /// Sends `task` and returns the text of the first choice.
    pub async fn run(&self, task: &str) -> Result<String, LLMError> {
        debug!(model = %self.config.model_name, "Forwarding task");
        let output = self.client.complete(self.input(task)).await?;
        Ok(output.content)
    }

    /// Sends `task` and returns the streamed response.
    pub async fn run_stream(&self, task: &str) -> Result<LLMStream, LLMError> {
        debug!(model = %self.config.model_name, "Forwarding task as stream");
        self.client.stream(self.input(task)).await
    }
}

impl std::fmt::Debug for ModelForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelForwarder")
            .field("model_name", &self.config.model_name)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}
