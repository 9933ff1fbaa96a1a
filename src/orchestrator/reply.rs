//! Text rendering of request outcomes for channel replies

use super::ProcessResult;
use crate::error::GatewayError;
use crate::validation::CommandReport;
use std::fmt::Write;

/// Render a processed request as a chat reply
pub fn format_reply(result: &ProcessResult) -> String {
    let parsed = &result.parsed_response;
    let mut out = String::new();

    if parsed.needs_more_info || result.validation.total() == 0 {
        let message = parsed
            .user_message
            .as_deref()
            .unwrap_or("I need more information before I can act on that.");
        out.push_str(message);
        return out;
    }

    if !parsed.reasoning.is_empty() {
        let _ = writeln!(out, "{}", parsed.reasoning);
        out.push('\n');
    }

    if !result.validation.valid.is_empty() {
        let _ = writeln!(out, "Ready to run ({}):", result.validation.valid.len());
        for entry in &result.validation.valid {
            write_command(&mut out, entry);
        }
    }

    if !result.validation.invalid.is_empty() {
        let _ = writeln!(out, "Rejected ({}):", result.validation.invalid.len());
        for entry in &result.validation.invalid {
            write_command(&mut out, entry);
            for issue in &entry.report.errors {
                let _ = writeln!(out, "    error: {}", issue);
            }
        }
    }

    for warning in &result.budget_warnings {
        let _ = writeln!(out, "Budget warning: {}", warning);
    }

    if let Some(message) = &parsed.user_message {
        let _ = writeln!(out, "{}", message);
    }

    let _ = write!(
        out,
        "[{} tokens, ${:.4}, via {}]",
        result.token_usage.total_tokens, result.token_usage.estimated_cost, result.provider_name
    );
    out
}

fn write_command(out: &mut String, entry: &CommandReport) {
    let command = &entry.command;
    let approval = if command.requires_approval { " (needs approval)" } else { "" };
    let confidence = command
        .confidence
        .map(|c| format!(" [{:.0}%]", c * 100.0))
        .unwrap_or_default();
    let _ = writeln!(out, "  - {}{}{}: {}", command.action, confidence, approval, command.parameters);
    for warning in &entry.report.warnings {
        let _ = writeln!(out, "    warning: {}", warning);
    }
}

/// Render a pipeline failure for the user
pub fn format_error(error: &GatewayError) -> String {
    match error {
        GatewayError::BudgetExceeded { reason } => {
            format!("Request not sent: token budget exhausted ({}).", reason)
        }
        GatewayError::RateLimited { attempts, .. } => format!(
            "The model provider is throttling requests (gave up after {} attempts). Please try again later.",
            attempts
        ),
        GatewayError::QueueShutdown => "The gateway is shutting down.".to_string(),
        other => format!("Request failed: {}", other),
    }
}
