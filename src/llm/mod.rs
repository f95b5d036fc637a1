//! Inference capability used by the panel.
//!
//! The panel only needs one thing from a language model: given a transcript
//! of role-tagged messages, return a completion. [`InferenceClient`] is that
//! seam; [`OllamaClient`] is the production implementation.

pub mod ollama;

#[cfg(test)]
pub mod scripted;

pub use ollama::OllamaClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Speaker of a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    System,
    User,
    Assistant,
}

/// Message in a transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Speaker,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Speaker::Assistant,
            content: content.into(),
        }
    }
}

/// Model selection for one caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
}

impl ModelSettings {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }
}

/// Failure of an inference call.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Cannot connect to inference service at {0}")]
    Connect(String),

    #[error("Inference API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed inference response: {0}")]
    Malformed(String),

    #[error("Failed to send request: {0}")]
    Request(String),
}

impl InferenceError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            InferenceError::Timeout(_) | InferenceError::Connect(_) => true,
            InferenceError::Api { status, .. } => *status == 429 || *status >= 500,
            InferenceError::Malformed(_) | InferenceError::Request(_) => false,
        }
    }
}

/// Text completion over a transcript.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn complete(
        &self,
        settings: &ModelSettings,
        transcript: &[ChatMessage],
    ) -> Result<String, InferenceError>;
}
