//! Metrics collection for observability

use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    register_counter_vec_with_registry, register_counter_with_registry,
    register_gauge_vec_with_registry, register_gauge_with_registry,
    register_histogram_vec_with_registry, register_histogram_with_registry,
};
use std::sync::Arc;
use once_cell::sync::Lazy;

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> = Lazy::new(|| {
    Arc::new(Metrics::new().expect("Failed to initialize metrics"))
});

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    // Admission queue metrics
    pub admission_calls: CounterVec,
    pub admission_queue_depth: Gauge,
    pub rate_limit_waits: CounterVec,
    pub retries: Counter,
    pub call_duration: Histogram,

    // Budget metrics
    pub budget_rejections: CounterVec,
    pub tokens_recorded: CounterVec,
    pub cost_recorded: Counter,

    // Validation metrics
    pub commands_validated: CounterVec,

    // Provider metrics
    pub provider_health: GaugeVec,

    // Orchestrator metrics
    pub request_duration: HistogramVec,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let admission_calls = register_counter_vec_with_registry!(
            Opts::new("gateway_admission_calls_total", "Calls leaving the admission queue"),
            &["status"],
            registry
        )?;

        let admission_queue_depth = register_gauge_with_registry!(
            Opts::new("gateway_admission_queue_depth", "Calls waiting in the admission queue"),
            registry
        )?;

        let rate_limit_waits = register_counter_vec_with_registry!(
            Opts::new("gateway_rate_limit_waits_total", "Drain loop waits by violated window"),
            &["dimension"],
            registry
        )?;

        let retries = register_counter_with_registry!(
            Opts::new("gateway_retries_total", "Provider calls retried after throttling"),
            registry
        )?;

        let call_duration = register_histogram_with_registry!(
            HistogramOpts::new("gateway_call_duration_seconds", "Provider call duration in seconds"),
            registry
        )?;

        let budget_rejections = register_counter_vec_with_registry!(
            Opts::new("gateway_budget_rejections_total", "Requests refused by the budget ledger"),
            &["period"],
            registry
        )?;

        let tokens_recorded = register_counter_vec_with_registry!(
            Opts::new("gateway_tokens_recorded_total", "Tokens recorded in the ledger"),
            &["kind"],
            registry
        )?;

        let cost_recorded = register_counter_with_registry!(
            Opts::new("gateway_cost_recorded_usd_total", "Estimated spend recorded in the ledger"),
            registry
        )?;

        let commands_validated = register_counter_vec_with_registry!(
            Opts::new("gateway_commands_validated_total", "Commands validated by outcome"),
            &["outcome"],
            registry
        )?;

        let provider_health = register_gauge_vec_with_registry!(
            Opts::new("gateway_provider_healthy", "Last observed provider health (1 = healthy)"),
            &["provider"],
            registry
        )?;

        let request_duration = register_histogram_vec_with_registry!(
            "gateway_request_duration_seconds",
            "End-to-end request duration in seconds",
            &["status"],
            registry
        )?;

        Ok(Self {
            registry,
            admission_calls,
            admission_queue_depth,
            rate_limit_waits,
            retries,
            call_duration,
            budget_rejections,
            tokens_recorded,
            cost_recorded,
            commands_validated,
            provider_health,
            request_duration,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a call leaving the queue
    pub fn record_admission(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        self.admission_calls.with_label_values(&[status]).inc();
    }

    pub fn record_rate_limit_wait(&self, dimension: &str) {
        self.rate_limit_waits.with_label_values(&[dimension]).inc();
    }

    pub fn record_budget_rejection(&self, period: &str) {
        self.budget_rejections.with_label_values(&[period]).inc();
    }

    /// Record tokens and spend written to the ledger
    pub fn record_usage(&self, prompt: u64, completion: u64, cost: f64) {
        self.tokens_recorded.with_label_values(&["prompt"]).inc_by(prompt as f64);
        self.tokens_recorded.with_label_values(&["completion"]).inc_by(completion as f64);
        if cost > 0.0 {
            self.cost_recorded.inc_by(cost);
        }
    }

    pub fn record_validation(&self, valid: bool) {
        let outcome = if valid { "valid" } else { "invalid" };
        self.commands_validated.with_label_values(&[outcome]).inc();
    }

    pub fn record_provider_health(&self, provider: &str, healthy: bool) {
        self.provider_health
            .with_label_values(&[provider])
            .set(if healthy { 1.0 } else { 0.0 });
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();

        String::from_utf8(buffer).unwrap_or_default()
    }
}
