//! Rule-based validation of model output

pub mod command_rules;
pub mod engine;
pub mod rules;

pub use command_rules::{
    CommandReport, CommandValidation, CommandValidator, ValidationConfig, STRUCTURED_COMMAND,
};
pub use engine::{
    RuleOutcome, Severity, ValidationEngine, ValidationIssue, ValidationReport, ValidationRule,
};
