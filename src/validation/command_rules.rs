//! Rule sets for model-emitted commands
//!
//! Every command is checked twice: once as a whole against the
//! `StructuredCommand` rules, and once by its action name against the rules
//! for that action's parameters.

use super::engine::{ValidationEngine, ValidationReport, ValidationRule};
use super::rules::{
    boolean_type, confidence_range, dangerous_patterns, insecure_http, known_action, low_confidence_warning,
    no_path_traversal, number_range, object_type, parameter_shape, required, string_type,
    url_scheme,
};
use crate::commands::{Action, Command, ACTION_TABLE};
use crate::metrics::METRICS;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Subject type for command-level rules
pub const STRUCTURED_COMMAND: &str = "StructuredCommand";

/// Upper bound accepted for a command timeout (ms)
const MAX_TIMEOUT_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;
const MAX_COMMAND_RETRIES: f64 = 10.0;

/// Validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Confidence below this only produces a warning
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

/// Command-level rules
pub fn structured_command_rules(confidence_threshold: f64) -> Vec<ValidationRule> {
    vec![
        required("action"),
        string_type("action"),
        known_action(),
        object_type("parameters"),
        string_type("reasoning"),
        confidence_range(),
        low_confidence_warning(confidence_threshold),
        number_range("timeout", 0.0, MAX_TIMEOUT_MS),
        number_range("maxRetries", 0.0, MAX_COMMAND_RETRIES),
        boolean_type("requiresApproval"),
        boolean_type("retryable"),
    ]
}

/// Parameter rules for one action, derived from its parameter shape
pub fn action_rules(action: Action) -> Vec<ValidationRule> {
    let shape = action.shape();
    let mut rules: Vec<ValidationRule> = shape.required_fields().iter().map(|f| required(f)).collect();
    rules.push(parameter_shape(shape));
    for field in shape.url_fields() {
        rules.push(url_scheme(field));
        rules.push(insecure_http(field));
    }
    for field in shape.path_fields() {
        rules.push(no_path_traversal(field));
    }
    rules.push(dangerous_patterns());
    rules
}

/// Per-command outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandReport {
    pub command: Command,
    pub report: ValidationReport,
}

/// Validated commands, split by outcome; nothing is dropped
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandValidation {
    pub valid: Vec<CommandReport>,
    pub invalid: Vec<CommandReport>,
}

impl CommandValidation {
    pub fn all_valid(&self) -> bool {
        self.invalid.is_empty()
    }

    pub fn total(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &super::engine::ValidationIssue> {
        self.valid
            .iter()
            .chain(self.invalid.iter())
            .flat_map(|entry| entry.report.warnings.iter())
    }
}

/// Validation engine preloaded with command rule sets
pub struct CommandValidator {
    engine: ValidationEngine,
}

impl CommandValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        let engine = ValidationEngine::new();
        engine.register_rules(
            STRUCTURED_COMMAND,
            structured_command_rules(config.confidence_threshold),
        );
        for (action, name, _) in ACTION_TABLE {
            engine.register_rules(*name, action_rules(*action));
        }
        Self { engine }
    }

    /// The underlying engine, for registering or replacing rule sets
    pub fn engine(&self) -> &ValidationEngine {
        &self.engine
    }

    /// Validate the command shape and then its parameters
    pub fn validate_command(&self, command: &Command) -> ValidationReport {
        let mut report = self.engine.validate(STRUCTURED_COMMAND, &command.wire_value());
        report.merge(self.engine.validate(&command.action, &command.parameters));

        METRICS.record_validation(report.is_valid);
        debug!(
            action = %command.action,
            valid = report.is_valid,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "Validated command"
        );
        report
    }

    pub fn validate_commands(&self, commands: &[Command]) -> CommandValidation {
        let mut validation = CommandValidation::default();
        for command in commands {
            let report = self.validate_command(command);
            let entry = CommandReport {
                command: command.clone(),
                report,
            };
            if entry.report.is_valid {
                validation.valid.push(entry);
            } else {
                validation.invalid.push(entry);
            }
        }
        validation
    }
}

impl Default for CommandValidator {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}
