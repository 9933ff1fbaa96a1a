//! Token budgeting: estimation, the daily/monthly ledger and prompt analysis

pub mod estimator;
pub mod ledger;
pub mod optimizer;

pub use estimator::{ContentKind, HeuristicEstimator, TokenEstimator};
pub use ledger::{
    BudgetError, BudgetLedger, BudgetPeriod, BudgetStatus, BudgetWarning, DayKey, TokenBudget,
    TokenUsage, UsageSummary,
};
pub use optimizer::OptimizationReport;
