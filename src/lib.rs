//! Command Gateway
//!
//! Admission control and governance for LLM-driven automation agents:
//! token budgets, rate-limited priority admission, provider registry and
//! validation of the structured commands a model returns.

pub mod admission;
pub mod budget;
pub mod cache;
pub mod commands;
pub mod config;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod validation;

pub use admission::{AdmissionQueue, BackoffConfig, Priority, RateWindowConfig};
pub use budget::{BudgetLedger, BudgetStatus, TokenBudget, TokenUsage};
pub use commands::{parse_response, Action, Command, ParsedResponse};
pub use config::Config;
pub use error::{GatewayError, Result};
pub use orchestrator::{Orchestrator, ProcessOptions, ProcessResult, RequestContext};
pub use providers::{ProviderError, ProviderRegistry};
pub use validation::{CommandValidator, ValidationConfig, ValidationEngine, ValidationReport};
