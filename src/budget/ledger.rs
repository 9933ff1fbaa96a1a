//! Daily and monthly token budget ledger
//!
//! Usage is accumulated per calendar day (UTC). The month total is the sum of
//! every day in the same year and month, so there is no separate monthly
//! counter to keep in sync.

use super::estimator::{HeuristicEstimator, TokenEstimator};
use super::optimizer::{analyze_prompt, OptimizationReport};
use crate::metrics::METRICS;
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, warn};

/// Budget errors
#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("Invalid budget configuration: {0}")]
    ConfigurationInvalid(String),

    #[error("Invalid day key: {0}")]
    InvalidDayKey(String),
}

/// Token limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBudget {
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u64,
    #[serde(default = "default_monthly_limit")]
    pub monthly_limit: u64,
    /// Percent of a limit at which a warning is emitted
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold_percent: f64,
}

fn default_daily_limit() -> u64 {
    100_000
}

fn default_monthly_limit() -> u64 {
    2_000_000
}

fn default_warning_threshold() -> f64 {
    80.0
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self {
            daily_limit: default_daily_limit(),
            monthly_limit: default_monthly_limit(),
            warning_threshold_percent: default_warning_threshold(),
        }
    }
}

impl TokenBudget {
    pub fn validate(&self) -> Result<(), BudgetError> {
        if self.daily_limit == 0 || self.monthly_limit == 0 {
            return Err(BudgetError::ConfigurationInvalid(
                "daily_limit and monthly_limit must be positive".to_string(),
            ));
        }
        if self.daily_limit > self.monthly_limit {
            return Err(BudgetError::ConfigurationInvalid(format!(
                "daily_limit ({}) exceeds monthly_limit ({})",
                self.daily_limit, self.monthly_limit
            )));
        }
        if !(self.warning_threshold_percent > 0.0 && self.warning_threshold_percent <= 100.0) {
            return Err(BudgetError::ConfigurationInvalid(format!(
                "warning_threshold_percent must be in (0, 100], got {}",
                self.warning_threshold_percent
            )));
        }
        Ok(())
    }
}

/// Calendar day used to bucket usage, rendered as `YYYY-MM-DD`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn today() -> Self {
        Self(Utc::now().date_naive())
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, BudgetError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| BudgetError::InvalidDayKey(format!("{:04}-{:02}-{:02}", year, month, day)))
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn same_month(&self, other: &DayKey) -> bool {
        self.0.year() == other.0.year() && self.0.month() == other.0.month()
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DayKey {
    type Err = BudgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| BudgetError::InvalidDayKey(s.to_string()))
    }
}

/// Tokens and spend for one call, or accumulated over a period
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost: f64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64, estimated_cost: f64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            estimated_cost,
        }
    }

    /// Usage as reported by a provider; a zero total falls back to
    /// prompt + completion
    pub fn reported(
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
        estimated_cost: f64,
    ) -> Self {
        let mut usage = Self::new(prompt_tokens, completion_tokens, estimated_cost);
        if total_tokens > 0 {
            usage.total_tokens = total_tokens;
        }
        usage
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.prompt_tokens += rhs.prompt_tokens;
        self.completion_tokens += rhs.completion_tokens;
        self.total_tokens += rhs.total_tokens;
        self.estimated_cost += rhs.estimated_cost;
    }
}

/// Which limit a check or warning concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetPeriod {
    Daily,
    Monthly,
}

impl BudgetPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }
}

/// Outcome of a budget check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub can_proceed: bool,
    pub reason: Option<String>,
    pub limited_by: Option<BudgetPeriod>,
    pub daily_remaining: u64,
    pub monthly_remaining: u64,
    pub daily_percent_used: f64,
    pub monthly_percent_used: f64,
}

/// Emitted when a recording pushes usage across the warning threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetWarning {
    pub period: BudgetPeriod,
    pub percent_used: f64,
    pub used: u64,
    pub limit: u64,
}

impl fmt::Display for BudgetWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} token usage at {:.1}% ({} of {})",
            self.period.as_str(),
            self.percent_used,
            self.used,
            self.limit
        )
    }
}

/// Usage snapshot for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub day: String,
    pub today: TokenUsage,
    pub month: TokenUsage,
    pub daily_limit: u64,
    pub monthly_limit: u64,
    pub daily_percent_used: f64,
    pub monthly_percent_used: f64,
}

/// Per-day token ledger enforcing daily and monthly limits
pub struct BudgetLedger {
    budget: TokenBudget,
    usage: Mutex<BTreeMap<DayKey, TokenUsage>>,
    estimator: Arc<dyn TokenEstimator>,
}

impl BudgetLedger {
    /// Create a ledger with the default heuristic estimator
    pub fn new(budget: TokenBudget) -> Result<Self, BudgetError> {
        Self::with_estimator(budget, Arc::new(HeuristicEstimator::default()))
    }

    pub fn with_estimator(
        budget: TokenBudget,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Result<Self, BudgetError> {
        budget.validate()?;
        Ok(Self {
            budget,
            usage: Mutex::new(BTreeMap::new()),
            estimator,
        })
    }

    pub fn budget(&self) -> &TokenBudget {
        &self.budget
    }

    /// Approximate token count of `text`
    pub fn estimate_tokens(&self, text: &str) -> u64 {
        self.estimator.estimate(text)
    }

    /// Check whether `estimated_tokens` more would fit today's budget
    pub fn check_budget(&self, estimated_tokens: u64) -> BudgetStatus {
        self.check_budget_on(DayKey::today(), estimated_tokens)
    }

    /// Check against the usage recorded for `day` and its month
    pub fn check_budget_on(&self, day: DayKey, estimated_tokens: u64) -> BudgetStatus {
        let (daily_used, monthly_used) = {
            let usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
            (
                usage.get(&day).map(|u| u.total_tokens).unwrap_or(0),
                sum_month(&usage, &day).total_tokens,
            )
        };

        let mut status = BudgetStatus {
            can_proceed: true,
            reason: None,
            limited_by: None,
            daily_remaining: self.budget.daily_limit.saturating_sub(daily_used),
            monthly_remaining: self.budget.monthly_limit.saturating_sub(monthly_used),
            daily_percent_used: percent(daily_used, self.budget.daily_limit),
            monthly_percent_used: percent(monthly_used, self.budget.monthly_limit),
        };

        if daily_used + estimated_tokens > self.budget.daily_limit {
            status.can_proceed = false;
            status.limited_by = Some(BudgetPeriod::Daily);
            status.reason = Some(format!(
                "Request would exceed the daily token limit: {} used + {} estimated > {}",
                daily_used, estimated_tokens, self.budget.daily_limit
            ));
        } else if monthly_used + estimated_tokens > self.budget.monthly_limit {
            status.can_proceed = false;
            status.limited_by = Some(BudgetPeriod::Monthly);
            status.reason = Some(format!(
                "Request would exceed the monthly token limit: {} used + {} estimated > {}",
                monthly_used, estimated_tokens, self.budget.monthly_limit
            ));
        }

        if let Some(period) = status.limited_by {
            METRICS.record_budget_rejection(period.as_str());
            debug!(day = %day, estimated_tokens, period = period.as_str(), "Budget check refused");
        }

        status
    }

    /// Record completed usage against today
    pub fn record_usage(&self, usage: TokenUsage) -> Vec<BudgetWarning> {
        self.record_usage_on(DayKey::today(), usage)
    }

    /// Record completed usage against `day`
    ///
    /// Returns a warning for each limit whose threshold was crossed by this
    /// recording. Usage already above the threshold does not warn again.
    pub fn record_usage_on(&self, day: DayKey, usage: TokenUsage) -> Vec<BudgetWarning> {
        let (daily_before, daily_after, monthly_before, monthly_after) = {
            let mut map = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
            let daily_before = map.get(&day).map(|u| u.total_tokens).unwrap_or(0);
            let monthly_before = sum_month(&map, &day).total_tokens;
            *map.entry(day).or_default() += usage;
            (
                daily_before,
                daily_before + usage.total_tokens,
                monthly_before,
                monthly_before + usage.total_tokens,
            )
        };

        METRICS.record_usage(usage.prompt_tokens, usage.completion_tokens, usage.estimated_cost);

        let mut warnings = Vec::new();
        let checks = [
            (BudgetPeriod::Daily, daily_before, daily_after, self.budget.daily_limit),
            (BudgetPeriod::Monthly, monthly_before, monthly_after, self.budget.monthly_limit),
        ];
        for (period, before, after, limit) in checks {
            let threshold = self.budget.warning_threshold_percent;
            let after_percent = percent(after, limit);
            if percent(before, limit) < threshold && after_percent >= threshold {
                let warning = BudgetWarning {
                    period,
                    percent_used: after_percent,
                    used: after,
                    limit,
                };
                warn!(day = %day, "Token budget warning: {}", warning);
                warnings.push(warning);
            }
        }

        warnings
    }

    pub fn usage_for_day(&self, day: &DayKey) -> TokenUsage {
        let usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        usage.get(day).copied().unwrap_or_default()
    }

    /// Sum of every recorded day in the month containing `day`
    pub fn monthly_usage(&self, day: &DayKey) -> TokenUsage {
        let usage = self.usage.lock().unwrap_or_else(PoisonError::into_inner);
        sum_month(&usage, day)
    }

    pub fn usage_summary(&self) -> UsageSummary {
        let day = DayKey::today();
        let today = self.usage_for_day(&day);
        let month = self.monthly_usage(&day);
        UsageSummary {
            day: day.to_string(),
            today,
            month,
            daily_limit: self.budget.daily_limit,
            monthly_limit: self.budget.monthly_limit,
            daily_percent_used: percent(today.total_tokens, self.budget.daily_limit),
            monthly_percent_used: percent(month.total_tokens, self.budget.monthly_limit),
        }
    }

    /// Look for avoidable token spend in a prompt
    pub fn analyze_for_optimization(&self, prompt: &str) -> OptimizationReport {
        analyze_prompt(prompt, self.estimator.as_ref())
    }
}

fn sum_month(usage: &BTreeMap<DayKey, TokenUsage>, day: &DayKey) -> TokenUsage {
    usage
        .iter()
        .filter(|(key, _)| key.same_month(day))
        .fold(TokenUsage::default(), |mut acc, (_, u)| {
            acc += *u;
            acc
        })
}

fn percent(used: u64, limit: u64) -> f64 {
    if limit == 0 {
        return 100.0;
    }
    used as f64 / limit as f64 * 100.0
}
