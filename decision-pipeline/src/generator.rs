//! Generative backend client
//!
//! Everything downstream of ingestion talks to the text backend through the
//! [`TextGenerator`] capability trait, so the pipeline can run against the
//! real chat-completions API or a deterministic fake.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use common::PipelineError;

/// Capability interface for the generative-text backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send a prompt, get free-form text back. Failures are retryable at the
    /// implementation's discretion; an error here means the call chain that
    /// needed the text must be abandoned.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Settings for the chat-completions client.
#[derive(Debug, Clone)]
pub struct CompletionClientConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    /// Attempts per call before failing loudly.
    pub max_retries: u32,
    /// Explicit request timeout; transport defaults are not enough here.
    pub request_timeout: Duration,
}

impl Default for CompletionClientConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "llama-3.3-70b-versatile".to_string(),
            max_retries: 3,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// OpenAI-compatible chat-completions client with bounded retry.
pub struct CompletionClient {
    http: reqwest::Client,
    config: CompletionClientConfig,
}

impl CompletionClient {
    pub fn new(config: CompletionClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    async fn call_once(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatRequestMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
        };

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("backend returned status {}", response.status());
        }

        let body: ChatResponse = response.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("backend response contained no choices"))?;

        Ok(strip_reasoning(&content))
    }
}

/// Reasoning models prefix their answer with a `</think>`-terminated block;
/// only the text after the last marker is the usable reply.
pub(crate) fn strip_reasoning(content: &str) -> String {
    content
        .rsplit("</think>")
        .next()
        .unwrap_or(content)
        .trim()
        .to_string()
}

#[async_trait]
impl TextGenerator for CompletionClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut last_error = None;

        for attempt in 1..=self.config.max_retries {
            match self.call_once(prompt).await {
                Ok(text) => {
                    debug!(attempt, "backend call succeeded");
                    return Ok(text);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "backend call failed, retrying");
                    last_error = Some(e);
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        Err(PipelineError::Backend {
            attempts: self.config.max_retries,
            message,
        }
        .into())
    }
}

/// Deterministic generator that replays a fixed queue of replies.
///
/// Used by tests and offline runs; errors once the script is exhausted so a
/// missing expectation fails loudly instead of hanging the pipeline.
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of generate calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted generator ran out of replies"))
    }
}
