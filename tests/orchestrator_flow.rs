//! End-to-end tests of the request cycle against a scripted provider
//!
//! These cover the path a channel message takes: budget check, admission,
//! provider call, usage accounting, parsing and validation.

use async_trait::async_trait;
use command_gateway::admission::{AdmissionQueue, BackoffConfig, Priority, RateWindowConfig};
use command_gateway::budget::{BudgetLedger, TokenBudget};
use command_gateway::orchestrator::{
    format_reply, LlmConfig, Orchestrator, ProcessOptions, RequestContext,
};
use command_gateway::providers::{
    CompletionProvider, CompletionRequest, CompletionResponse, ProviderError, ProviderLifecycle,
    TokensUsed,
};
use command_gateway::validation::{CommandValidator, ValidationConfig};
use command_gateway::GatewayError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const VALID_PLAN: &str = r#"```json
{
  "commands": [
    {
      "action": "git_clone",
      "parameters": {"url": "https://github.com/example/service.git", "directory": "service"},
      "reasoning": "Fetch the code first",
      "confidence": 0.95
    },
    {
      "action": "shell_exec",
      "parameters": {"command": "cargo test", "cwd": "service"},
      "reasoning": "Run the test suite",
      "confidence": 0.9
    }
  ],
  "reasoning": "Clone then test",
  "needsMoreInfo": false
}
```"#;

/// Completion provider that replays a fixed script of outcomes
struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    usage: TokensUsed,
    calls: AtomicUsize,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        let usage = TokensUsed {
            prompt: 400,
            completion: 100,
            total: 500,
        };
        Self::with_usage(script, usage)
    }

    fn with_usage(script: Vec<Result<String, ProviderError>>, usage: TokensUsed) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            usage,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderLifecycle for ScriptedProvider {
    async fn health_check(&self) -> bool {
        true
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_response(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Other("script exhausted".to_string())));

        next.map(|content| CompletionResponse {
            content,
            tokens_used: self.usage,
            finish_reason: "stop".to_string(),
        })
    }

    fn calculate_cost(&self, usage: &TokensUsed) -> f64 {
        usage.total as f64 * 0.00001
    }
}

fn throttled() -> ProviderError {
    ProviderError::Http {
        status: 429,
        message: "Too Many Requests".to_string(),
        retry_after: None,
    }
}

fn orchestrator(provider: Arc<ScriptedProvider>, budget: TokenBudget) -> Orchestrator {
    let ledger = Arc::new(BudgetLedger::new(budget).unwrap());
    let queue = Arc::new(AdmissionQueue::new(
        RateWindowConfig::default(),
        BackoffConfig::default(),
    ));
    let validator = Arc::new(CommandValidator::new(&ValidationConfig::default()));
    Orchestrator::new(provider, ledger, queue, validator, LlmConfig::default())
}

#[tokio::test]
async fn test_successful_request_records_usage_and_validates() {
    let provider = ScriptedProvider::new(vec![Ok(VALID_PLAN.to_string())]);
    let orchestrator = orchestrator(Arc::clone(&provider), TokenBudget::default());

    let result = orchestrator
        .process_request(
            "clone the service repo and run its tests",
            &RequestContext::for_user("ops"),
            ProcessOptions::with_priority(Priority::High),
        )
        .await
        .unwrap();

    assert_eq!(provider.calls(), 1);
    assert_eq!(result.provider_name, "scripted");
    assert_eq!(result.parsed_response.commands.len(), 2);
    assert!(result.parsed_response.parse_error.is_none());
    assert!(result.validation.all_valid());
    assert_eq!(result.validation.valid.len(), 2);
    assert!(result.budget_status.can_proceed);
    assert!(result.budget_warnings.is_empty());

    assert_eq!(result.token_usage.total_tokens, 500);
    assert!((result.token_usage.estimated_cost - 0.005).abs() < 1e-9);
    assert_eq!(orchestrator.ledger().usage_summary().today.total_tokens, 500);

    let requests = provider.requests.lock().unwrap();
    assert_eq!(requests[0].messages.len(), 2);
    assert_eq!(requests[0].temperature, Some(0.2));

    let reply = format_reply(&result);
    assert!(reply.contains("Ready to run (2):"));
    assert!(reply.contains("via scripted"));
}

#[tokio::test]
async fn test_budget_refusal_skips_provider() {
    let provider = ScriptedProvider::new(vec![Ok(VALID_PLAN.to_string())]);
    let budget = TokenBudget {
        daily_limit: 10,
        monthly_limit: 1_000,
        warning_threshold_percent: 80.0,
    };
    let orchestrator = orchestrator(Arc::clone(&provider), budget);

    let err = orchestrator
        .process_request("list the files", &RequestContext::default(), ProcessOptions::default())
        .await
        .unwrap_err();

    match err {
        GatewayError::BudgetExceeded { reason } => assert!(reason.contains("daily")),
        other => panic!("expected budget refusal, got {:?}", other),
    }
    assert_eq!(provider.calls(), 0);
    assert_eq!(orchestrator.ledger().usage_summary().today.total_tokens, 0);
}

#[tokio::test]
async fn test_unparseable_output_degrades_to_clarification() {
    let provider = ScriptedProvider::new(vec![Ok("Sure! I'll get right on that.".to_string())]);
    let orchestrator = orchestrator(Arc::clone(&provider), TokenBudget::default());

    let result = orchestrator
        .process_request("do the thing", &RequestContext::default(), ProcessOptions::default())
        .await
        .unwrap();

    assert!(result.parsed_response.needs_more_info);
    assert!(result.parsed_response.parse_error.is_some());
    assert!(result.parsed_response.commands.is_empty());
    assert_eq!(result.validation.total(), 0);
    // the call still cost tokens
    assert_eq!(result.token_usage.total_tokens, 500);
}

#[tokio::test]
async fn test_invalid_commands_are_reported_not_dropped() {
    let plan = r#"{
        "commands": [
            {"action": "file_read", "parameters": {"path": "README.md"}, "confidence": 0.9},
            {"action": "file_read", "parameters": {"path": "../../etc/shadow"}, "confidence": 0.9},
            {"action": "launch_rockets", "parameters": {}, "confidence": 0.9}
        ],
        "reasoning": "mixed"
    }"#;
    let provider = ScriptedProvider::new(vec![Ok(plan.to_string())]);
    let orchestrator = orchestrator(provider, TokenBudget::default());

    let result = orchestrator
        .process_request("read some files", &RequestContext::default(), ProcessOptions::default())
        .await
        .unwrap();

    assert_eq!(result.validation.total(), 3);
    assert_eq!(result.validation.valid.len(), 1);
    assert_eq!(result.validation.invalid.len(), 2);
    assert_eq!(result.validation.invalid[1].command.action, "launch_rockets");
    assert!(!result.validation.invalid[0].report.errors.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_throttled_call_is_retried() {
    let provider = ScriptedProvider::new(vec![Err(throttled()), Ok(VALID_PLAN.to_string())]);
    let orchestrator = orchestrator(Arc::clone(&provider), TokenBudget::default());

    let started = tokio::time::Instant::now();
    let result = orchestrator
        .process_request("clone it", &RequestContext::default(), ProcessOptions::default())
        .await
        .unwrap();

    assert_eq!(provider.calls(), 2);
    assert!(started.elapsed() >= std::time::Duration::from_secs(1));
    assert_eq!(result.validation.valid.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_throttling_gives_up() {
    let provider = ScriptedProvider::new((0..10).map(|_| Err(throttled())).collect());
    let orchestrator = orchestrator(Arc::clone(&provider), TokenBudget::default());

    let err = orchestrator
        .process_request("clone it", &RequestContext::default(), ProcessOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::RateLimited { attempts: 4, .. }));
    assert_eq!(provider.calls(), 4);
    assert_eq!(orchestrator.ledger().usage_summary().today.total_tokens, 0);
}

#[tokio::test]
async fn test_provider_failure_is_not_retried() {
    let provider = ScriptedProvider::new(vec![Err(ProviderError::Network("connection reset".to_string()))]);
    let orchestrator = orchestrator(Arc::clone(&provider), TokenBudget::default());

    let err = orchestrator
        .process_request("clone it", &RequestContext::default(), ProcessOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Provider(ProviderError::Network(_))));
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_malformed_command_does_not_hide_its_siblings() {
    let plan = r#"{
        "commands": [
            {"action": "file_read", "parameters": {"path": "Cargo.toml"}, "confidence": 0.9},
            {"action": "file_read", "parameters": {"path": "README.md"}, "confidence": "high"}
        ],
        "reasoning": "read both"
    }"#;
    let provider = ScriptedProvider::new(vec![Ok(plan.to_string())]);
    let orchestrator = orchestrator(provider, TokenBudget::default());

    let result = orchestrator
        .process_request("read both files", &RequestContext::default(), ProcessOptions::default())
        .await
        .unwrap();

    assert!(result.parsed_response.parse_error.is_none());
    assert_eq!(result.parsed_response.commands.len(), 2);
    assert_eq!(result.validation.valid.len(), 1);
    assert_eq!(result.validation.invalid.len(), 1);
    assert!(result.validation.invalid[0].report.has_error("confidence_range"));
}

#[tokio::test]
async fn test_provider_reported_total_is_recorded() {
    let usage = TokensUsed {
        prompt: 400,
        completion: 100,
        total: 530,
    };
    let provider = ScriptedProvider::with_usage(vec![Ok(VALID_PLAN.to_string())], usage);
    let orchestrator = orchestrator(provider, TokenBudget::default());

    let result = orchestrator
        .process_request("clone it", &RequestContext::default(), ProcessOptions::default())
        .await
        .unwrap();

    assert_eq!(result.token_usage.total_tokens, 530);
    assert_eq!(orchestrator.ledger().usage_summary().today.total_tokens, 530);
}
