//! Prompt rendering
//!
//! Output is a pure function of the request and its context, so identical
//! inputs give identical prompts (and identical token estimates).

use crate::commands::ACTION_TABLE;
use crate::providers::ChatMessage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prior turns included in the prompt
const MAX_HISTORY_TURNS: usize = 10;

const DEFAULT_INSTRUCTIONS: &str = "You translate operator requests into commands for an automation agent. \
Only use the actions listed below. If the request is ambiguous or unsafe, return no commands, \
set needsMoreInfo to true and ask a short question in userMessage. \
Reply with a single JSON document and nothing else.";

const COMMAND_SCHEMA: &str = r#"{
  "commands": [
    {
      "action": "<action name>",
      "parameters": { },
      "reasoning": "<why this command>",
      "confidence": 0.0,
      "requiresApproval": false
    }
  ],
  "reasoning": "<overall plan>",
  "needsMoreInfo": false,
  "userMessage": "<optional message for the user>"
}"#;

/// Caller-supplied context for a request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    pub user: Option<String>,
    pub channel: Option<String>,
    pub working_directory: Option<String>,
    /// Earlier turns of the conversation, oldest first
    #[serde(default)]
    pub history: Vec<String>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl RequestContext {
    pub fn for_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..Self::default()
        }
    }
}

/// Renders the system and user messages for a request
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
}

impl PromptBuilder {
    /// `instructions` replaces the default preamble when given
    pub fn new(instructions: Option<&str>) -> Self {
        let instructions = instructions.unwrap_or(DEFAULT_INSTRUCTIONS);
        let actions: Vec<&str> = ACTION_TABLE.iter().map(|(_, name, _)| *name).collect();
        let system_prompt = format!(
            "{}\n\nAvailable actions:\n{}\n\nResponse format:\n{}",
            instructions,
            actions.join(", "),
            COMMAND_SCHEMA
        );
        Self { system_prompt }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn render(&self, user_request: &str, context: &RequestContext) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(render_user_message(user_request, context)),
        ]
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(None)
    }
}

fn render_user_message(user_request: &str, context: &RequestContext) -> String {
    let mut lines = Vec::new();

    let mut facts = Vec::new();
    if let Some(user) = &context.user {
        facts.push(format!("user: {}", user));
    }
    if let Some(channel) = &context.channel {
        facts.push(format!("channel: {}", channel));
    }
    if let Some(dir) = &context.working_directory {
        facts.push(format!("working directory: {}", dir));
    }
    facts.extend(context.extra.iter().map(|(k, v)| format!("{}: {}", k, v)));
    if !facts.is_empty() {
        lines.push("Context:".to_string());
        lines.extend(facts.into_iter().map(|fact| format!("- {}", fact)));
        lines.push(String::new());
    }

    if !context.history.is_empty() {
        let skip = context.history.len().saturating_sub(MAX_HISTORY_TURNS);
        lines.push("Conversation so far:".to_string());
        lines.extend(context.history.iter().skip(skip).map(|turn| format!("> {}", turn)));
        lines.push(String::new());
    }

    lines.push("Request:".to_string());
    lines.push(user_request.trim().to_string());
    lines.join("\n")
}
