//! Parsing model output into structured commands

use super::action::Action;
use super::params::CommandParameters;
use crate::admission::Priority;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

const CLARIFICATION_MESSAGE: &str =
    "I could not turn that into concrete actions. Could you rephrase or add more detail?";

/// A single model-emitted command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub action: String,
    #[serde(default = "empty_object")]
    pub parameters: Value,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Execution timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    /// The object exactly as the model emitted it
    #[serde(skip)]
    pub raw: Option<Value>,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl Command {
    pub fn new(action: impl Into<String>, parameters: Value) -> Self {
        Self {
            id: None,
            action: action.into(),
            parameters,
            reasoning: String::new(),
            confidence: None,
            requires_approval: false,
            priority: None,
            timeout: None,
            retryable: None,
            max_retries: None,
            depends_on: Vec::new(),
            tags: Vec::new(),
            metadata: Map::new(),
            raw: None,
        }
    }

    /// Lenient typed view of a model-emitted command
    ///
    /// Fields with the wrong type fall back to their defaults here; the
    /// validator sees the original object through [`Command::wire_value`] and
    /// reports them.
    pub fn from_value(value: &Value) -> Self {
        let field = |name: &str| value.get(name);
        let text = |name: &str| field(name).and_then(Value::as_str).map(str::to_string);
        let strings = |name: &str| -> Vec<String> {
            field(name)
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default()
        };

        Self {
            id: text("id"),
            action: text("action").unwrap_or_default(),
            parameters: field("parameters").cloned().unwrap_or_else(empty_object),
            reasoning: text("reasoning").unwrap_or_default(),
            confidence: field("confidence").and_then(Value::as_f64),
            requires_approval: field("requiresApproval").and_then(Value::as_bool).unwrap_or(false),
            priority: field("priority")
                .and_then(Value::as_str)
                .and_then(|p| p.parse().ok()),
            timeout: field("timeout").and_then(Value::as_u64),
            retryable: field("retryable").and_then(Value::as_bool),
            max_retries: field("maxRetries")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
            depends_on: strings("dependsOn"),
            tags: strings("tags"),
            metadata: field("metadata")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            raw: Some(value.clone()),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// The known action this command names, if any
    pub fn action_kind(&self) -> Option<Action> {
        self.action.parse().ok()
    }

    /// Parameters decoded for the action's expected shape
    ///
    /// Returns `None` for unknown actions.
    pub fn typed_parameters(&self) -> Option<Result<CommandParameters, serde_json::Error>> {
        self.action_kind()
            .map(|action| CommandParameters::decode(action.shape(), &self.parameters))
    }

    /// JSON form of the typed fields
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| empty_object())
    }

    /// JSON form handed to the validator: the original object when parsed,
    /// otherwise the typed fields
    pub fn wire_value(&self) -> Value {
        match &self.raw {
            Some(raw) => raw.clone(),
            None => self.to_value(),
        }
    }
}

/// Model output after parsing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedResponse {
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub needs_more_info: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    /// Set when the raw output could not be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl ParsedResponse {
    /// Zero commands and a request for clarification
    pub fn needs_clarification(parse_error: impl Into<String>) -> Self {
        Self {
            commands: Vec::new(),
            reasoning: String::new(),
            needs_more_info: true,
            user_message: Some(CLARIFICATION_MESSAGE.to_string()),
            parse_error: Some(parse_error.into()),
        }
    }
}

/// Remove a surrounding markdown code fence, with or without a language tag
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // drop the info string ("json", "JSON", ...) on the opening line
    match body.find('\n') {
        Some(newline) if !body[..newline].trim().contains('{') => body[newline + 1..].trim(),
        _ => body.trim(),
    }
}

/// Document envelope; commands stay untyped so one bad field cannot sink the rest
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    #[serde(default)]
    commands: Option<Vec<Value>>,
    #[serde(default)]
    reasoning: Value,
    #[serde(default)]
    needs_more_info: Value,
    #[serde(default)]
    user_message: Value,
}

impl From<RawDocument> for ParsedResponse {
    fn from(doc: RawDocument) -> Self {
        Self {
            commands: doc
                .commands
                .unwrap_or_default()
                .iter()
                .map(Command::from_value)
                .collect(),
            reasoning: doc.reasoning.as_str().unwrap_or_default().to_string(),
            needs_more_info: doc.needs_more_info.as_bool().unwrap_or(false),
            user_message: doc.user_message.as_str().map(str::to_string),
            parse_error: None,
        }
    }
}

/// Parse raw model output, degrading to a clarification request on failure
///
/// Only an unreadable document degrades. Commands with malformed fields are
/// kept and left for validation to reject.
pub fn parse_response(raw: &str) -> ParsedResponse {
    let body = strip_code_fences(raw);

    let parsed = serde_json::from_str::<RawDocument>(body).or_else(|first_err| {
        // tolerate prose around a single JSON object
        match (body.find('{'), body.rfind('}')) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str::<RawDocument>(&body[start..=end]).map_err(|_| first_err)
            }
            _ => Err(first_err),
        }
    });

    match parsed {
        Ok(document) => {
            let response = ParsedResponse::from(document);
            debug!(commands = response.commands.len(), "Parsed model response");
            response
        }
        Err(err) => {
            warn!(error = %err, "Model response was not a valid command document");
            ParsedResponse::needs_clarification(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DOCUMENT: &str = r#"{
  "commands": [
    {
      "action": "git_clone",
      "parameters": {"url": "https://github.com/example/repo.git"},
      "reasoning": "User asked for the repository",
      "confidence": 0.92,
      "requiresApproval": true,
      "dependsOn": ["setup"],
      "priority": "high"
    }
  ],
  "reasoning": "Clone first",
  "needsMoreInfo": false
}"#;

    #[test]
    fn test_fenced_and_plain_parse_identically() {
        let plain = parse_response(DOCUMENT);
        let fenced = parse_response(&format!("```json\n{}\n```", DOCUMENT));
        let bare_fence = parse_response(&format!("```\n{}\n```", DOCUMENT));

        assert_eq!(plain, fenced);
        assert_eq!(plain, bare_fence);
        assert!(plain.parse_error.is_none());
    }

    #[test]
    fn test_command_fields() {
        let parsed = parse_response(DOCUMENT);
        assert_eq!(parsed.commands.len(), 1);

        let command = &parsed.commands[0];
        assert_eq!(command.action_kind(), Some(Action::GitClone));
        assert_eq!(command.confidence, Some(0.92));
        assert!(command.requires_approval);
        assert_eq!(command.priority, Some(Priority::High));
        assert_eq!(command.depends_on, vec!["setup".to_string()]);
        assert!(matches!(
            command.typed_parameters(),
            Some(Ok(CommandParameters::Repository(_)))
        ));
    }

    #[test]
    fn test_malformed_output_degrades() {
        let parsed = parse_response("Sure! I will clone the repo for you.");
        assert!(parsed.commands.is_empty());
        assert!(parsed.needs_more_info);
        assert!(parsed.user_message.is_some());
        assert!(parsed.parse_error.is_some());
    }

    #[test]
    fn test_prose_around_document() {
        let raw = format!("Here is the plan:\n{}\nLet me know.", DOCUMENT);
        let parsed = parse_response(&raw);
        assert_eq!(parsed.commands.len(), 1);
    }

    #[test]
    fn test_clarification_document() {
        let parsed = parse_response(
            r#"{"commands": [], "reasoning": "ambiguous", "needsMoreInfo": true, "userMessage": "Which repository?"}"#,
        );
        assert!(parsed.needs_more_info);
        assert_eq!(parsed.user_message.as_deref(), Some("Which repository?"));
        assert!(parsed.parse_error.is_none());
    }

    #[test]
    fn test_unknown_action_kept() {
        let parsed = parse_response(r#"{"commands": [{"action": "format_disk", "confidence": 0.9}]}"#);
        assert_eq!(parsed.commands.len(), 1);
        assert!(parsed.commands[0].action_kind().is_none());
        assert!(parsed.commands[0].typed_parameters().is_none());
        assert_eq!(parsed.commands[0].parameters, json!({}));
    }

    #[test]
    fn test_to_value_uses_wire_names() {
        let command = Command::new("shell_exec", json!({"command": "ls"})).with_confidence(0.8);
        let value = command.to_value();
        assert_eq!(value["action"], "shell_exec");
        assert_eq!(value["requiresApproval"], false);
        assert_eq!(value["confidence"], 0.8);
        assert!(value.get("dependsOn").is_none());
        assert_eq!(command.wire_value(), value);
    }

    #[test]
    fn test_malformed_field_keeps_sibling_commands() {
        let parsed = parse_response(
            r#"{"commands": [
                {"action": "file_read", "parameters": {"path": "a.txt"}, "confidence": 0.9},
                {"action": "file_read", "parameters": {"path": "b.txt"}, "confidence": "high", "timeout": -1}
            ]}"#,
        );

        assert!(parsed.parse_error.is_none());
        assert!(!parsed.needs_more_info);
        assert_eq!(parsed.commands.len(), 2);

        let loose = &parsed.commands[1];
        assert_eq!(loose.confidence, None);
        assert_eq!(loose.timeout, None);
        assert_eq!(loose.wire_value()["confidence"], "high");
        assert_eq!(loose.wire_value()["timeout"], -1);
    }

    #[test]
    fn test_non_object_command_is_kept() {
        let parsed = parse_response(r#"{"commands": ["clone the repo"], "reasoning": 42}"#);
        assert_eq!(parsed.commands.len(), 1);
        assert_eq!(parsed.commands[0].action, "");
        assert_eq!(parsed.commands[0].wire_value(), json!("clone the repo"));
        assert_eq!(parsed.reasoning, "");
    }
}
