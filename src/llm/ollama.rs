//! Ollama chat backend.
//!
//! Sends the full transcript to `/api/chat` with streaming disabled and
//! returns the assistant message content.

use crate::llm::{ChatMessage, InferenceClient, InferenceError, ModelSettings};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Connection settings for the Ollama backend.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub timeout_seconds: u64,
    /// Extra attempts on transient failures.
    pub retries: usize,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            timeout_seconds: 300,
            retries: 2,
        }
    }
}

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Inference client backed by a local or remote Ollama server.
pub struct OllamaClient {
    config: OllamaConfig,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, InferenceError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.config.ollama_url.trim_end_matches('/'))
    }

    async fn send_once(
        &self,
        settings: &ModelSettings,
        transcript: &[ChatMessage],
    ) -> Result<String, InferenceError> {
        let request = OllamaChatRequest {
            model: &settings.model,
            messages: transcript,
            stream: false,
            options: OllamaOptions {
                temperature: settings.temperature,
            },
        };

        debug!(
            "Sending chat request to {} with {} messages",
            settings.model,
            transcript.len()
        );

        let response = self
            .http_client
            .post(self.chat_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout(self.config.timeout_seconds)
                } else if e.is_connect() {
                    InferenceError::Connect(self.config.ollama_url.clone())
                } else {
                    InferenceError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api { status, body });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| InferenceError::Malformed(e.to_string()))?;

        Ok(chat_response.message.content)
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn complete(
        &self,
        settings: &ModelSettings,
        transcript: &[ChatMessage],
    ) -> Result<String, InferenceError> {
        let mut attempt = 0;
        loop {
            match self.send_once(settings, transcript).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_transient() && attempt < self.config.retries => {
                    attempt += 1;
                    warn!(
                        "Inference call failed ({}), retrying {}/{}",
                        e, attempt, self.config.retries
                    );
                    tokio::time::sleep(Duration::from_millis(500 * attempt as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let transcript = vec![ChatMessage::system("sys"), ChatMessage::user("hello")];
        let request = OllamaChatRequest {
            model: "llama3.2:latest",
            messages: &transcript,
            stream: false,
            options: OllamaOptions { temperature: 0.5 },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "llama3.2:latest");
        assert_eq!(json["stream"], false);
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["options"]["temperature"], 0.5);
    }

    #[test]
    fn test_chat_url_trims_trailing_slash() {
        let client = OllamaClient::new(OllamaConfig {
            ollama_url: "http://localhost:11434/".to_string(),
            ..OllamaConfig::default()
        })
        .unwrap();
        assert_eq!(client.chat_url(), "http://localhost:11434/api/chat");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_an_error() {
        let client = OllamaClient::new(OllamaConfig {
            ollama_url: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 5,
            retries: 0,
        })
        .unwrap();

        let result = client
            .complete(
                &ModelSettings::new("any", 0.1),
                &[ChatMessage::user("hello")],
            )
            .await;
        assert!(result.is_err());
    }
}
