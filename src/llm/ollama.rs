use crate::llm::streaming::LineBuffer;
use crate::llm::{types::*, LLMProvider, StreamingCallback};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ModelOptions>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
    done: bool,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn default_base_url() -> String {
        "http://localhost:11434".to_string()
    }

    pub fn new(model: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model,
        }
    }

    fn get_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn convert_messages(request: &LLMRequest) -> Vec<OllamaMessage> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: request.system_prompt.clone(),
            });
        }
        for message in &request.messages {
            messages.push(OllamaMessage {
                role: match message.role {
                    MessageRole::System => "system".to_string(),
                    MessageRole::User => "user".to_string(),
                    MessageRole::Assistant => "assistant".to_string(),
                },
                content: message.content.clone(),
            });
        }
        messages
    }

    async fn send_request(&self, request: &OllamaRequest) -> Result<reqwest::Response> {
        debug!("Sending request to Ollama at {}", self.get_url());

        let response = self
            .client
            .post(self.get_url())
            .json(request)
            .send()
            .await
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        // Store status code before consuming response
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let error = match status.as_u16() {
                429 => ApiError::RateLimit(error_text),
                400..=499 => ApiError::InvalidRequest(error_text),
                500..=599 => ApiError::ServiceError(error_text),
                _ => ApiError::Unknown(format!("Status {status}: {error_text}")),
            };
            return Err(error.into());
        }
        Ok(response)
    }

    async fn try_send_request(&self, request: &OllamaRequest) -> Result<LLMResponse> {
        let response = self.send_request(request).await?;

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Unknown(format!("Failed to parse Ollama response: {e}")))?;

        Ok(LLMResponse {
            content: ollama_response.message.content,
            usage: Usage {
                input_tokens: ollama_response.prompt_eval_count,
                output_tokens: ollama_response.eval_count,
            },
        })
    }

    async fn try_send_request_streaming(
        &self,
        request: &OllamaRequest,
        streaming_callback: &StreamingCallback,
    ) -> Result<LLMResponse> {
        let mut response = self.send_request(request).await?;

        let mut line_buffer = LineBuffer::new();
        let mut content = String::new();
        let mut usage = Usage::zero();

        while let Some(chunk) = response.chunk().await? {
            for line in line_buffer.push(&chunk)? {
                self.process_stream_line(&line, streaming_callback, &mut content, &mut usage)?;
            }
        }
        if let Some(line) = line_buffer.take_remainder() {
            self.process_stream_line(&line, streaming_callback, &mut content, &mut usage)?;
        }

        Ok(LLMResponse { content, usage })
    }

    fn process_stream_line(
        &self,
        line: &str,
        streaming_callback: &StreamingCallback,
        content: &mut String,
        usage: &mut Usage,
    ) -> Result<()> {
        let chunk_response: OllamaResponse = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("Failed to parse chunk line '{line}'");
                return Ok(());
            }
        };

        if !chunk_response.message.content.is_empty() {
            content.push_str(&chunk_response.message.content);
            // Propagated as-is so a cancellation error reaches the caller
            // with its type intact.
            streaming_callback(&chunk_response.message.content)?;
        }

        if chunk_response.done {
            usage.input_tokens = chunk_response.prompt_eval_count;
            usage.output_tokens = chunk_response.eval_count;
        }
        Ok(())
    }
}

#[async_trait]
impl LLMProvider for OllamaClient {
    async fn send_message(
        &self,
        request: LLMRequest,
        streaming_callback: Option<&StreamingCallback>,
    ) -> Result<LLMResponse> {
        let ollama_request = OllamaRequest {
            model: self.model.clone(),
            messages: Self::convert_messages(&request),
            stream: streaming_callback.is_some(),
            options: request.options.clone(),
        };

        if let Some(callback) = streaming_callback {
            self.try_send_request_streaming(&ollama_request, callback)
                .await
        } else {
            self.try_send_request(&ollama_request).await
        }
    }
}
