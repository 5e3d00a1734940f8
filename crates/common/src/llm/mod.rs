//! Language model abstraction
//!
//! Provides:
//! - `LanguageModel` trait (one prompt in, one completion out)
//! - OpenAI-compatible chat client with client-side rate limiting
//! - Groundedness checking against the same endpoint
//! - Scripted mock for tests

mod grounding;

pub use grounding::{
    Groundedness, GroundednessChecker, MockGroundednessChecker, UpstageGroundednessChecker,
};

use crate::config::LlmConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Trait for text generation
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate a completion for a fully rendered prompt.
    ///
    /// Exactly one upstream request per call.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// OpenAI-compatible chat completions client
pub struct ChatClient {
    config: LlmConfig,
    api_key: String,
    endpoint: String,
    client: reqwest::Client,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl ChatClient {
    /// Create a new chat client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AppError::Configuration {
                message: "llm.api_key is not set".to_string(),
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        let per_second =
            NonZeroU32::new(config.requests_per_second).ok_or_else(|| AppError::Configuration {
                message: "llm.requests_per_second must be at least 1".to_string(),
            })?;
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            config: config.clone(),
            api_key,
            client,
            limiter,
        })
    }

    /// Send a message list to `model` and return the first choice's content
    pub async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        self.limiter.until_ready().await;

        let request = ChatRequest {
            model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let start = Instant::now();
        let result = self.send(&request).await;
        metrics::record_model_call(start.elapsed().as_secs_f64(), model, result.is_ok());
        result
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<String> {
        let timeout_ms = self.config.timeout_secs * 1000;

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| AppError::from_model_transport(e, timeout_ms))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::from_status(status, body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::from_model_transport(e, timeout_ms))?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::Model {
                message: "Empty response from model".to_string(),
            })?;

        debug!(model = request.model, chars = content.len(), "Model responded");
        Ok(content)
    }
}

#[async_trait]
impl LanguageModel for ChatClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.chat(&self.config.model, &[ChatMessage::user(prompt)])
            .await
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

type Responder = dyn Fn(&str) -> Result<String> + Send + Sync;

/// Mock model for testing
///
/// Answers every prompt through a closure and records the prompts it saw.
pub struct MockLanguageModel {
    responder: Box<Responder>,
    prompts: Mutex<Vec<String>>,
}

impl MockLanguageModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with the same text
    pub fn constant(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());
        (self.responder)(prompt)
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}
