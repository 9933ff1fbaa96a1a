//! Provider abstractions for completion backends and message channels
//!
//! Everything above this module talks to providers only through the
//! [`CompletionProvider`] and [`ChannelProvider`] traits, never through a
//! concrete vendor SDK.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod console;
pub mod openai;
pub mod registry;

pub use registry::{ChannelFactory, CompletionFactory, ProviderRegistry};

/// Provider call errors
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Provider error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Whether the upstream is throttling us (HTTP 429 or a "rate limit" message)
    pub fn is_rate_limit(&self) -> bool {
        if let Self::Http { status: 429, .. } = self {
            return true;
        }
        self.to_string().to_lowercase().contains("rate limit")
    }

    /// Retry-after hint supplied by the provider, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Capability family of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    Completion,
    Channel,
}

impl ProviderFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Channel => "channel",
        }
    }
}

/// Catalog entry for a registered provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub family: ProviderFamily,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Opaque per-provider settings handed to a factory
pub type ProviderConfig = serde_json::Value;

/// Chat message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message sent to a completion provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Completion request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Token counts reported by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokensUsed {
    pub prompt: u64,
    pub completion: u64,
    pub total: u64,
}

/// Completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub tokens_used: TokensUsed,
    pub finish_reason: String,
}

/// Contract shared by every provider for lifecycle management
#[async_trait]
pub trait ProviderLifecycle: Send + Sync {
    /// Self-reported health
    async fn health_check(&self) -> bool;

    /// Release resources held by the provider
    async fn destroy(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// Model completion backend
#[async_trait]
pub trait CompletionProvider: ProviderLifecycle {
    /// Provider name as registered
    fn name(&self) -> &str;

    /// Generate a completion for the given messages
    async fn generate_response(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Provider-specific token estimate
    fn estimate_tokens(&self, text: &str) -> u64 {
        (text.chars().count() as u64).div_ceil(4)
    }

    /// Cost in USD for the given usage
    fn calculate_cost(&self, usage: &TokensUsed) -> f64;
}

/// Inbound message delivered by a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub channel: String,
    pub user: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Outbound message sent through a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Callback invoked for every inbound message
pub type MessageHandler = Arc<dyn Fn(InboundMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Chat/messaging integration
#[async_trait]
pub trait ChannelProvider: ProviderLifecycle {
    /// Provider name as registered
    fn name(&self) -> &str;

    /// Begin receiving messages
    async fn start(&self) -> Result<(), ProviderError>;

    /// Stop receiving messages
    async fn stop(&self) -> Result<(), ProviderError>;

    /// Deliver a message
    async fn send_message(&self, message: OutboundMessage) -> Result<(), ProviderError>;

    /// Install the inbound message handler
    fn on_message(&self, handler: MessageHandler);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection_by_status() {
        let err = ProviderError::Http {
            status: 429,
            message: "Too Many Requests".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert!(err.is_rate_limit());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_rate_limit_detection_by_message() {
        let err = ProviderError::Other("Rate limit exceeded for org".to_string());
        assert!(err.is_rate_limit());
        assert_eq!(err.retry_after(), None);

        let err = ProviderError::Http {
            status: 500,
            message: "internal".to_string(),
            retry_after: None,
        };
        assert!(!err.is_rate_limit());
    }

    #[test]
    fn test_request_serialization_skips_empty_options() {
        let request = CompletionRequest {
            messages: vec![ChatMessage::user("hi")],
            ..Default::default()
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("temperature").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
