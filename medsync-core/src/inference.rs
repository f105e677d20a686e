//! Inference module: chat completions for the advice features
//!
//! Provides an `InferenceBackend` trait with:
//! - **GroqClient**: OpenAI-compatible `/chat/completions` over HTTPS
//! - **AdviceClient**: wraps any backend; never fails, substitutes the
//!   feature's fallback text and strips `**` emphasis from completions

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::prompts::{Feature, Prompt};

// ============================================================================
// InferenceBackend trait
// ============================================================================

/// Abstraction over completion providers.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run one completion and return the first choice's text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, InferenceError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn for_feature(model: &str, feature: Feature, prompt: &Prompt) -> Self {
        let params = feature.params();
        Self {
            model: model.to_string(),
            messages: vec![
                ChatMessage::system(prompt.system.clone()),
                ChatMessage::user(prompt.user.clone()),
            ],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Completion contained no choices")]
    NoChoices,

    #[error("Completion was empty")]
    EmptyCompletion,

    #[error("Missing API key")]
    MissingApiKey,
}

// ============================================================================
// GroqClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl InferenceConfig {
    pub fn from_settings(settings: &crate::config::InferenceSettings, api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.unwrap_or_default(),
            model: settings.model.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout_seconds: settings.timeout_seconds,
        }
    }
}

/// Chat-completions client for Groq (or any OpenAI-compatible endpoint).
#[derive(Debug, Clone)]
pub struct GroqClient {
    client: Client,
    config: InferenceConfig,
}

impl GroqClient {
    pub fn new(config: InferenceConfig) -> Result<Self, InferenceError> {
        if config.api_key.is_empty() {
            return Err(InferenceError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a client against a custom base URL (for testing / self-hosted routers)
    pub fn with_base_url(mut config: InferenceConfig, base_url: String) -> Result<Self, InferenceError> {
        config.base_url = base_url.trim_end_matches('/').to_string();
        Self::new(config)
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl InferenceBackend for GroqClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, InferenceError> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "Inference API error");

            return Err(InferenceError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .ok_or(InferenceError::NoChoices)?
            .message
            .content
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(InferenceError::EmptyCompletion);
        }

        Ok(content)
    }

    fn name(&self) -> &str {
        "groq"
    }
}

// ============================================================================
// AdviceClient
// ============================================================================

/// Outcome of an advice call. `error` is set when `text` is the fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advice {
    pub text: String,
    pub error: Option<String>,
}

impl Advice {
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// Remove every `**` emphasis delimiter.
pub fn strip_emphasis(text: &str) -> String {
    match Regex::new(r"\*\*") {
        Ok(re) => re.replace_all(text, "").into_owned(),
        Err(_) => text.replace("**", ""),
    }
}

/// Wraps a backend so advice paths never see an error.
#[derive(Clone)]
pub struct AdviceClient {
    backend: Arc<dyn InferenceBackend>,
    model: String,
}

impl AdviceClient {
    pub fn new(backend: Arc<dyn InferenceBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn advise(&self, feature: Feature, prompt: &Prompt) -> Advice {
        let request = ChatRequest::for_feature(&self.model, feature, prompt);

        match self.backend.complete(&request).await {
            Ok(text) => Advice {
                text: strip_emphasis(&text),
                error: None,
            },
            Err(e) => {
                tracing::error!(
                    feature = %feature,
                    backend = self.backend.name(),
                    error = %e,
                    "Inference failed; returning fallback advice"
                );
                Advice {
                    text: feature.fallback().to_string(),
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Backend used when no API key is configured: every call fails, so every
/// feature answers with its fallback text.
pub struct UnavailableBackend;

#[async_trait]
impl InferenceBackend for UnavailableBackend {
    async fn complete(&self, _request: &ChatRequest) -> Result<String, InferenceError> {
        Err(InferenceError::MissingApiKey)
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

/// Build the production backend, degrading to [`UnavailableBackend`] without a key.
pub fn create_backend(config: InferenceConfig) -> Arc<dyn InferenceBackend> {
    match GroqClient::new(config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::warn!(error = %e, "Inference backend unavailable; advice will use fallback text");
            Arc::new(UnavailableBackend)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
