//! OpenAI-compatible chat completion provider

use super::{
    ChatMessage, CompletionFactory, CompletionProvider, CompletionRequest, CompletionResponse,
    ProviderConfig, ProviderError, ProviderFamily, ProviderInfo, ProviderLifecycle, TokensUsed,
};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const PROVIDER_NAME: &str = "openai";

/// Settings read from the provider's config block
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key (read from `api_key_env` if not set)
    #[serde(default)]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// USD per 1k prompt tokens
    #[serde(default = "default_prompt_price")]
    pub prompt_price_per_1k: f64,

    /// USD per 1k completion tokens
    #[serde(default = "default_completion_price")]
    pub completion_price_per_1k: f64,
}

fn default_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_timeout_ms() -> u64 { 30_000 }
fn default_prompt_price() -> f64 { 0.000_15 }
fn default_completion_price() -> f64 { 0.000_6 }

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            api_key_env: default_api_key_env(),
            model: default_model(),
            timeout_ms: default_timeout_ms(),
            prompt_price_per_1k: default_prompt_price(),
            completion_price_per_1k: default_completion_price(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Chat completion client for OpenAI-compatible endpoints
pub struct OpenAiProvider {
    http: Client,
    settings: OpenAiSettings,
    api_key: Option<SecretString>,
}

impl OpenAiProvider {
    pub fn new(settings: OpenAiSettings) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;

        let api_key = settings.api_key.clone().or_else(|| {
            std::env::var(&settings.api_key_env)
                .ok()
                .filter(|key| !key.is_empty())
                .map(SecretString::new)
        });
        if api_key.is_none() {
            warn!(env = %settings.api_key_env, "No API key configured for completion provider");
        }

        Ok(Self {
            http,
            settings,
            api_key,
        })
    }

    /// Build from an opaque provider config block
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let settings = if config.is_null() {
            OpenAiSettings::default()
        } else {
            serde_json::from_value(config.clone())
                .map_err(|e| ProviderError::NotConfigured(format!("invalid openai settings: {}", e)))?
        };
        Self::new(settings)
    }

    pub fn factory() -> CompletionFactory {
        Arc::new(|config| {
            let provider: Arc<dyn CompletionProvider> = Arc::new(OpenAiProvider::from_config(config)?);
            Ok(provider)
        })
    }

    pub fn info() -> ProviderInfo {
        ProviderInfo {
            name: PROVIDER_NAME.to_string(),
            family: ProviderFamily::Completion,
            version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: vec!["chat".to_string(), "json".to_string()],
        }
    }

    pub fn settings(&self) -> &OpenAiSettings {
        &self.settings
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key.expose_secret()),
            None => request,
        }
    }

    async fn error_from_response(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64);

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or(body);

        ProviderError::Http {
            status,
            message,
            retry_after,
        }
    }
}

#[async_trait]
impl ProviderLifecycle for OpenAiProvider {
    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.settings.base_url.trim_end_matches('/'));
        match self.authorize(self.http.get(&url)).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "Completion provider health check rejected");
                false
            }
            Err(e) => {
                warn!(error = %e, "Completion provider unreachable");
                false
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn generate_response(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));
        let model = request.model.as_deref().unwrap_or(&self.settings.model);
        let body = ChatCompletionRequest {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(model, messages = request.messages.len(), "Calling chat completion API");

        let response = self
            .authorize(self.http.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Network(format!("request timed out: {}", e))
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;
        let content = choice.message.content.unwrap_or_default();

        let tokens_used = match parsed.usage {
            Some(usage) => TokensUsed {
                prompt: usage.prompt_tokens,
                completion: usage.completion_tokens,
                total: usage
                    .total_tokens
                    .unwrap_or(usage.prompt_tokens + usage.completion_tokens),
            },
            None => {
                let prompt: u64 = request
                    .messages
                    .iter()
                    .map(|m| self.estimate_tokens(&m.content))
                    .sum();
                let completion = self.estimate_tokens(&content);
                TokensUsed {
                    prompt,
                    completion,
                    total: prompt + completion,
                }
            }
        };

        Ok(CompletionResponse {
            content,
            tokens_used,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }

    fn calculate_cost(&self, usage: &TokensUsed) -> f64 {
        usage.prompt as f64 / 1000.0 * self.settings.prompt_price_per_1k
            + usage.completion as f64 / 1000.0 * self.settings.completion_price_per_1k
    }
}
