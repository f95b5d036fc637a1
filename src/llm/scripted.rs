//! Scripted inference client for tests.

use crate::llm::{ChatMessage, InferenceClient, InferenceError, ModelSettings};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Responder =
    Box<dyn Fn(&ModelSettings, &[ChatMessage]) -> Result<String, InferenceError> + Send + Sync>;

/// Answers every call through a closure and records what it was sent.
pub struct ScriptedClient {
    responder: Responder,
    stall: Option<(String, Duration)>,
    calls: AtomicUsize,
    transcripts: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ModelSettings, &[ChatMessage]) -> Result<String, InferenceError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            responder: Box::new(responder),
            stall: None,
            calls: AtomicUsize::new(0),
            transcripts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with the same text.
    pub fn constant(reply: &str) -> Self {
        let reply = reply.to_string();
        Self::new(move |_, _| Ok(reply.clone()))
    }

    /// Sleep before answering when the system prompt contains `marker`.
    pub fn stall_when(mut self, marker: &str, duration: Duration) -> Self {
        self.stall = Some((marker.to_string(), duration));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn transcripts(&self) -> Vec<Vec<ChatMessage>> {
        self.transcripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for ScriptedClient {
    async fn complete(
        &self,
        settings: &ModelSettings,
        transcript: &[ChatMessage],
    ) -> Result<String, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.transcripts.lock().unwrap().push(transcript.to_vec());

        if let Some((marker, duration)) = &self.stall {
            let stalls = transcript
                .first()
                .map(|m| m.content.contains(marker.as_str()))
                .unwrap_or(false);
            if stalls {
                tokio::time::sleep(*duration).await;
            }
        }

        (self.responder)(settings, transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_every_call() {
        let client = ScriptedClient::constant("ok");
        let settings = ModelSettings::new("m", 0.1);
        let transcript = vec![ChatMessage::system("s"), ChatMessage::user("q")];

        let reply = tokio_test::block_on(client.complete(&settings, &transcript)).unwrap();

        assert_eq!(reply, "ok");
        assert_eq!(client.calls(), 1);
        assert_eq!(client.transcripts(), vec![transcript]);
    }
}
