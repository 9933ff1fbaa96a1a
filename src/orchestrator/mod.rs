//! End-to-end request cycle
//!
//! render prompt -> estimate and check budget -> admit through the queue ->
//! record usage -> parse -> validate

pub mod prompt;
pub mod reply;

pub use prompt::{PromptBuilder, RequestContext};
pub use reply::{format_error, format_reply};

use crate::admission::{AdmissionQueue, Priority};
use crate::budget::{BudgetLedger, BudgetStatus, BudgetWarning, TokenUsage};
use crate::commands::{parse_response, ParsedResponse};
use crate::error::{GatewayError, Result};
use crate::metrics::METRICS;
use crate::providers::{CompletionProvider, CompletionRequest};
use crate::validation::{CommandValidation, CommandValidator};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Model settings applied to every request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model name; the provider's default is used when empty
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Replaces the default instructions in the system prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1_024
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
        }
    }
}

/// Per-request overrides
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub priority: Priority,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub model: Option<String>,
}

impl ProcessOptions {
    pub fn with_priority(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }
}

/// Everything produced by one request cycle
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResult {
    pub parsed_response: ParsedResponse,
    pub validation: CommandValidation,
    pub token_usage: TokenUsage,
    pub budget_status: BudgetStatus,
    pub budget_warnings: Vec<BudgetWarning>,
    pub provider_name: String,
}

/// Composes ledger, queue, provider and validator into one request cycle
pub struct Orchestrator {
    provider: Arc<dyn CompletionProvider>,
    ledger: Arc<BudgetLedger>,
    queue: Arc<AdmissionQueue>,
    validator: Arc<CommandValidator>,
    prompts: PromptBuilder,
    llm: LlmConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        ledger: Arc<BudgetLedger>,
        queue: Arc<AdmissionQueue>,
        validator: Arc<CommandValidator>,
        llm: LlmConfig,
    ) -> Self {
        let prompts = PromptBuilder::new(llm.system_prompt.as_deref());
        Self {
            provider,
            ledger,
            queue,
            validator,
            prompts,
            llm,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn ledger(&self) -> &BudgetLedger {
        &self.ledger
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    /// Run one request through the full pipeline
    ///
    /// Budget, admission and provider failures abort the cycle. Unparseable
    /// output and invalid commands do not: they are reported in the result.
    pub async fn process_request(
        &self,
        user_request: &str,
        context: &RequestContext,
        options: ProcessOptions,
    ) -> Result<ProcessResult> {
        let started = Instant::now();
        let result = self.run_cycle(user_request, context, options).await;

        let status = if result.is_ok() { "success" } else { "error" };
        METRICS
            .request_duration
            .with_label_values(&[status])
            .observe(started.elapsed().as_secs_f64());
        result
    }

    async fn run_cycle(
        &self,
        user_request: &str,
        context: &RequestContext,
        options: ProcessOptions,
    ) -> Result<ProcessResult> {
        let messages = self.prompts.render(user_request, context);
        let prompt_text: String = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let estimated_tokens = self.ledger.estimate_tokens(&prompt_text);
        let budget_status = self.ledger.check_budget(estimated_tokens);
        if !budget_status.can_proceed {
            let reason = budget_status
                .reason
                .clone()
                .unwrap_or_else(|| "token budget exhausted".to_string());
            warn!(estimated_tokens, reason = %reason, "Request refused by budget");
            return Err(GatewayError::BudgetExceeded { reason });
        }

        if let Some(user_message) = messages.last() {
            let optimization = self.ledger.analyze_for_optimization(&user_message.content);
            if optimization.should_optimize {
                debug!(
                    estimated_savings = optimization.estimated_savings,
                    recommendations = ?optimization.recommendations,
                    "Request prompt could be trimmed"
                );
            }
        }

        let request = CompletionRequest {
            messages,
            temperature: Some(options.temperature.unwrap_or(self.llm.temperature)),
            max_tokens: Some(options.max_tokens.unwrap_or(self.llm.max_tokens)),
            model: options.model.or_else(|| self.llm.model.clone()),
        };

        let provider = Arc::clone(&self.provider);
        let response = self
            .queue
            .execute_with_rate_limit(
                move || {
                    let provider = Arc::clone(&provider);
                    let request = request.clone();
                    async move { provider.generate_response(request).await }
                },
                estimated_tokens,
                options.priority,
            )
            .await?;

        let cost = self.provider.calculate_cost(&response.tokens_used);
        let token_usage = TokenUsage::reported(
            response.tokens_used.prompt,
            response.tokens_used.completion,
            response.tokens_used.total,
            cost,
        );
        let budget_warnings = self.ledger.record_usage(token_usage);

        let parsed_response = parse_response(&response.content);
        let validation = self.validator.validate_commands(&parsed_response.commands);

        info!(
            provider = self.provider.name(),
            estimated_tokens,
            total_tokens = token_usage.total_tokens,
            commands = validation.total(),
            invalid = validation.invalid.len(),
            needs_more_info = parsed_response.needs_more_info,
            "Request processed"
        );

        Ok(ProcessResult {
            parsed_response,
            validation,
            token_usage,
            budget_status,
            budget_warnings,
            provider_name: self.provider.name().to_string(),
        })
    }
}
