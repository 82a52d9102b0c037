use async_trait::async_trait;
use async_stream::stream;
use futures::stream::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{FinishReason, LLMClient, LLMError, LLMEvent, LLMInput, LLMOutput, LLMStream, Usage};
use crate::session::ChatMessage;
use crate::sse::data_lines;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// OpenAI API response for chat completions.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<MessageResponse>,
    /// Legacy completion-style servers put the text here instead.
    #[serde(default)]
    text: Option<String>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

/// Streaming response chunk.
#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

impl<'a> ChatRequest<'a> {
    pub(crate) fn new(input: &'a LLMInput, stream: bool) -> Self {
        Self {
            model: &input.model,
            messages: &input.messages,
            max_tokens: input.max_tokens,
            temperature: input.temperature,
            stream,
        }
    }
}

/// An LLM client for OpenAI-compatible chat-completion APIs.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    base_url: String,
}

impl OpenAIClient {
    /// Creates a new OpenAI client.
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, LLMError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LLMError::AuthError(format!("Invalid API key: {}", e)))?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let mut client_builder = reqwest::Client::builder().default_headers(headers);

        if let Some(timeout) = timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let client = client_builder.build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)),
        })
    }

    /// Returns the normalized base URL, without the completions path.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the full chat-completions endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, CHAT_COMPLETIONS_PATH)
    }

    async fn send(&self, input: &LLMInput, stream: bool) -> Result<Response, LLMError> {
        debug!(model = %input.model, stream, endpoint = %self.endpoint(), "Sending chat request");

        let response = self
            .client
            .post(self.endpoint())
            .json(&ChatRequest::new(input, stream))
            .send()
            .await?;

        check_status(response).await
    }
}

/// Strips trailing slashes and a trailing completions path, so both
/// `https://host/v1` and `https://host/v1/chat/completions` are accepted.
fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    trimmed
        .strip_suffix(CHAT_COMPLETIONS_PATH)
        .unwrap_or(trimmed)
        .to_string()
}

/// Maps non-success statuses onto error kinds.
async fn check_status(response: Response) -> Result<Response, LLMError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{}: {}", status, body);
    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LLMError::AuthError(message),
        StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimitError(message),
        _ => LLMError::ApiError(message),
    })
}

/// Extracts the first choice of a chat-completion response body.
fn parse_completion(response_text: &str) -> Result<LLMOutput, LLMError> {
    let response: ChatCompletionResponse = serde_json::from_str(response_text)
        .map_err(|e| LLMError::InvalidResponse(format!("{}: {}", e, response_text)))?;

    let choice = response.choices.into_iter().next().ok_or_else(|| {
        LLMError::InvalidResponse(format!("No choices in response. Response: {}", response_text))
    })?;

    let content = choice
        .message
        .and_then(|m| m.content)
        .or(choice.text)
        .ok_or_else(|| LLMError::InvalidResponse("First choice has no text".to_string()))?;

    Ok(LLMOutput {
        content,
        finish_reason: FinishReason::from_api(choice.finish_reason.as_deref()),
        usage: Usage {
            input_tokens: response.usage.prompt_tokens,
            output_tokens: response.usage.completion_tokens,
        },
    })
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn stream(&self, input: LLMInput) -> Result<LLMStream, LLMError> {
        let response = self.send(&input, true).await?;
        let mut lines = Box::pin(data_lines(response.bytes_stream()));

        let s = stream! {
            while let Some(line) = lines.next().await {
                let data = match line {
                    Ok(data) => data,
                    Err(e) => {
                        yield Err(LLMError::NetworkError(e));
                        return;
                    }
                };

                match serde_json::from_str::<ChatCompletionChunk>(&data) {
                    Ok(chunk) => {
                        for choice in chunk.choices {
                            if let Some(text) = choice.delta.content {
                                if !text.is_empty() {
                                    yield Ok(LLMEvent::TextDelta { text });
                                }
                            }
                            if let Some(reason) = choice.finish_reason {
                                yield Ok(LLMEvent::Finish {
                                    reason: FinishReason::from_api(Some(reason.as_str())),
                                });
                            }
                        }
                    }
                    Err(e) => {
                        debug!("Failed to parse chunk: {:?}", e);
                    }
                }
            }
        };

        Ok(Box::pin(s))
    }

    async fn complete(&self, input: LLMInput) -> Result<LLMOutput, LLMError> {
        let response_text = self
            .send(&input, false)
            .await?
            .text()
            .await
            .map_err(|e| LLMError::InvalidResponse(e.to_string()))?;

        debug!("LLM response: {}", response_text);

        parse_completion(&response_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> LLMInput {
        LLMInput {
            model: "tiiuae/falcon-7b".to_string(),
            messages: vec![
                ChatMessage::system("You are concise."),
                ChatMessage::user("Hello"),
            ],
            max_tokens: None,
            temperature: Some(0.5),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let input = input();
        let body = serde_json::to_value(ChatRequest::new(&input, false)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "tiiuae/falcon-7b",
                "messages": [
                    {"role": "system", "content": "You are concise."},
                    {"role": "user", "content": "Hello"}
                ],
                "temperature": 0.5,
                "stream": false
            })
        );
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("http://localhost:8000/v1/"), "http://localhost:8000/v1");
        assert_eq!(
            normalize_base_url("https://openrouter.ai/api/v1/chat/completions"),
            "https://openrouter.ai/api/v1"
        );
        assert_eq!(normalize_base_url(DEFAULT_BASE_URL), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_endpoint() {
        let client = OpenAIClient::new(
            "key".to_string(),
            Some("https://openrouter.ai/api/v1/chat/completions".to_string()),
            None,
        )
        .unwrap();
        assert_eq!(client.endpoint(), "https://openrouter.ai/api/v1/chat/completions");
    }

    #[test]
    fn test_invalid_api_key_is_rejected() {
        let result = OpenAIClient::new("bad\nkey".to_string(), None, None);
        assert!(matches!(result, Err(LLMError::AuthError(_))));
    }

    #[test]
    fn test_parse_completion_message_content() {
        let output = parse_completion(
            r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"},"finish_reason":"stop"}],
                "usage":{"prompt_tokens":9,"completion_tokens":3}}"#,
        )
        .unwrap();
        assert_eq!(output.content, "Hi there");
        assert_eq!(output.finish_reason, FinishReason::Stop);
        assert_eq!(output.usage.input_tokens, 9);
        assert_eq!(output.usage.output_tokens, 3);
    }

    #[test]
    fn test_parse_completion_legacy_text() {
        let output = parse_completion(r#"{"choices":[{"text":"plain","finish_reason":"length"}]}"#).unwrap();
        assert_eq!(output.content, "plain");
        assert_eq!(output.finish_reason, FinishReason::MaxTokens);
    }

    #[test]
    fn test_parse_completion_uses_first_choice() {
        let output = parse_completion(
            r#"{"choices":[{"message":{"content":"first"}},{"message":{"content":"second"}}]}"#,
        )
        .unwrap();
        assert_eq!(output.content, "first");
    }

    #[test]
    fn test_parse_completion_errors() {
        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(LLMError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_completion("not json"),
            Err(LLMError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_completion(r#"{"choices":[{"message":{"content":null}}]}"#),
            Err(LLMError::InvalidResponse(_))
        ));
    }
}
