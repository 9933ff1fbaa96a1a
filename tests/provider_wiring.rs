//! Registry wiring against a mock OpenAI-compatible endpoint

use command_gateway::admission::AdmissionQueue;
use command_gateway::budget::BudgetLedger;
use command_gateway::config::Config;
use command_gateway::orchestrator::{Orchestrator, ProcessOptions, RequestContext};
use command_gateway::providers::console::{self, ConsoleChannel};
use command_gateway::providers::openai::{self, OpenAiProvider};
use command_gateway::providers::{ChannelProvider, ProviderRegistry};
use command_gateway::validation::CommandValidator;
use command_gateway::GatewayError;
use serde_json::json;
use std::sync::Arc;

fn registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();
    registry.register_llm_provider(
        openai::PROVIDER_NAME,
        OpenAiProvider::factory(),
        OpenAiProvider::info(),
    );
    registry.register_message_channel(
        console::PROVIDER_NAME,
        ConsoleChannel::factory(),
        ConsoleChannel::info(),
    );
    registry
}

fn settings(base_url: &str) -> serde_json::Value {
    json!({
        "base_url": base_url,
        "api_key": "test-key",
        "model": "gpt-test",
        "timeout_ms": 2000
    })
}

#[tokio::test]
async fn test_configured_provider_runs_full_cycle() {
    let mut server = mockito::Server::new_async().await;
    let models = server
        .mock("GET", "/models")
        .with_status(200)
        .with_body(r#"{"data": []}"#)
        .create_async()
        .await;
    let plan = json!({
        "commands": [{
            "action": "file_list",
            "parameters": {"path": "src"},
            "reasoning": "Look around",
            "confidence": 0.88
        }],
        "reasoning": "inspect"
    });
    let completions = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{"message": {"content": plan.to_string()}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 900, "completion_tokens": 60, "total_tokens": 960}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let config = Config::default();
    let registry = registry();
    let provider = registry
        .create_llm_provider(openai::PROVIDER_NAME, &settings(&server.url()))
        .await
        .unwrap();
    models.assert_async().await;
    assert_eq!(registry.active_llm_providers(), vec!["openai".to_string()]);

    let orchestrator = Orchestrator::new(
        provider,
        Arc::new(BudgetLedger::new(config.budget.clone()).unwrap()),
        Arc::new(AdmissionQueue::new(config.rate_limits.clone(), config.backoff.clone())),
        Arc::new(CommandValidator::new(&config.validation)),
        config.llm.clone(),
    );

    let result = orchestrator
        .process_request("what is in src?", &RequestContext::for_user("dev"), ProcessOptions::default())
        .await
        .unwrap();
    completions.assert_async().await;

    assert_eq!(result.provider_name, "openai");
    assert_eq!(result.token_usage.total_tokens, 960);
    assert!(result.token_usage.estimated_cost > 0.0);
    assert!(result.validation.all_valid());

    registry.cleanup().await;
    assert!(registry.active_llm_providers().is_empty());
}

#[tokio::test]
async fn test_unhealthy_provider_is_not_activated() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/models")
        .with_status(401)
        .with_body(r#"{"error": {"message": "bad key"}}"#)
        .create_async()
        .await;

    let registry = registry();
    let err = registry
        .create_llm_provider(openai::PROVIDER_NAME, &settings(&server.url()))
        .await
        .err()
        .unwrap();

    assert!(matches!(err, GatewayError::ProviderHealthCheckFailed(_)));
    assert!(registry.active_llm_providers().is_empty());
}

#[tokio::test]
async fn test_default_selection_resolves_registered_names() {
    let config = Config::default();
    let registry = registry();

    let completion = config.providers.completion_provider().unwrap();
    let channel = config.providers.channel_provider().unwrap();
    assert!(registry.has_llm_provider(&completion.name));
    assert!(registry.has_message_channel(&channel.name));

    let stdio = registry
        .create_message_channel(&channel.name, &channel.settings)
        .await
        .unwrap();
    assert_eq!(stdio.name(), "console");

    let health = registry.health_check_all().await;
    assert_eq!(health.get("channel:console"), Some(&true));

    let unknown = registry
        .create_llm_provider("nope", &serde_json::Value::Null)
        .await
        .err()
        .unwrap();
    assert!(matches!(unknown, GatewayError::UnknownProvider(_)));
}
