//! Rule registration and execution
//!
//! Rules are grouped by subject type (a command action name, or a schema
//! name such as `StructuredCommand`) and run against a JSON value. Reports
//! are computed fresh on every call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// How a failing rule affects validity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Result of running one rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub is_valid: bool,
    pub message: Option<String>,
}

impl RuleOutcome {
    pub fn pass() -> Self {
        Self {
            is_valid: true,
            message: None,
        }
    }

    /// Passing outcome that still carries an informational message
    pub fn note(message: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            message: Some(message.into()),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: Some(message.into()),
        }
    }
}

pub type Predicate = Arc<dyn Fn(&Value) -> RuleOutcome + Send + Sync>;

/// A named, severity-tagged predicate
#[derive(Clone)]
pub struct ValidationRule {
    pub name: String,
    pub severity: Severity,
    predicate: Predicate,
}

impl ValidationRule {
    pub fn new<F>(name: impl Into<String>, severity: Severity, predicate: F) -> Self
    where
        F: Fn(&Value) -> RuleOutcome + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            severity,
            predicate: Arc::new(predicate),
        }
    }

    pub fn error<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> RuleOutcome + Send + Sync + 'static,
    {
        Self::new(name, Severity::Error, predicate)
    }

    pub fn warning<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value) -> RuleOutcome + Send + Sync + 'static,
    {
        Self::new(name, Severity::Warning, predicate)
    }

    pub fn check(&self, value: &Value) -> RuleOutcome {
        (self.predicate)(value)
    }
}

impl fmt::Debug for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationRule")
            .field("name", &self.name)
            .field("severity", &self.severity)
            .finish()
    }
}

/// A rule that failed, or a warning rule that spoke up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub rule: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.rule, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub passed_rules: Vec<String>,
}

impl ValidationReport {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            ..Self::default()
        }
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: ValidationReport) {
        self.is_valid = self.is_valid && other.is_valid;
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.passed_rules.extend(other.passed_rules);
    }

    pub fn has_error(&self, rule: &str) -> bool {
        self.errors.iter().any(|issue| issue.rule == rule)
    }
}

/// Registry of rule sets keyed by subject type
#[derive(Default)]
pub struct ValidationEngine {
    rules: RwLock<HashMap<String, Vec<ValidationRule>>>,
}

impl ValidationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `rules` for `subject_type`, replacing any previous set
    pub fn register_rules(&self, subject_type: impl Into<String>, rules: Vec<ValidationRule>) {
        let subject_type = subject_type.into();
        debug!(subject_type = %subject_type, rules = rules.len(), "Registering validation rules");
        self.rules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(subject_type, rules);
    }

    pub fn rule_names(&self, subject_type: &str) -> Vec<String> {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subject_type)
            .map(|rules| rules.iter().map(|rule| rule.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has_rules(&self, subject_type: &str) -> bool {
        self.rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(subject_type)
    }

    /// Run every rule registered for `subject_type` against `value`
    ///
    /// A subject with no rules validates trivially.
    pub fn validate(&self, subject_type: &str, value: &Value) -> ValidationReport {
        let rules = self
            .rules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(subject_type)
            .cloned()
            .unwrap_or_default();

        let mut report = ValidationReport::valid();
        for rule in &rules {
            let outcome = rule.check(value);
            match (rule.severity, outcome.is_valid) {
                (Severity::Error, true) => report.passed_rules.push(rule.name.clone()),
                (Severity::Error, false) => {
                    report.is_valid = false;
                    report.errors.push(ValidationIssue {
                        rule: rule.name.clone(),
                        message: outcome
                            .message
                            .unwrap_or_else(|| format!("{} failed", rule.name)),
                    });
                }
                (Severity::Warning, passed) => {
                    if passed {
                        report.passed_rules.push(rule.name.clone());
                    }
                    if let Some(message) = outcome.message {
                        report.warnings.push(ValidationIssue {
                            rule: rule.name.clone(),
                            message,
                        });
                    } else if !passed {
                        report.warnings.push(ValidationIssue {
                            rule: rule.name.clone(),
                            message: format!("{} failed", rule.name),
                        });
                    }
                }
            }
        }

        report
    }
}
