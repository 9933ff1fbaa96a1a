//! Command gateway binary: wires the configured channel to the orchestrator

use anyhow::{Context, Result};
use command_gateway::admission::AdmissionQueue;
use command_gateway::budget::{BudgetLedger, HeuristicEstimator};
use command_gateway::config::{Config, LogFormat, LoggingConfig};
use command_gateway::orchestrator::{
    format_error, format_reply, Orchestrator, ProcessOptions, RequestContext,
};
use command_gateway::providers::console::{self, ConsoleChannel};
use command_gateway::providers::openai::{self, OpenAiProvider};
use command_gateway::providers::{InboundMessage, OutboundMessage, ProviderRegistry};
use command_gateway::validation::CommandValidator;
use futures::FutureExt;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().context("Failed to load configuration")?;
    init_tracing(&config.logging);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting command gateway");

    let registry = Arc::new(ProviderRegistry::with_health_timeout(
        config.providers.health_timeout(),
    ));
    registry.register_llm_provider(
        openai::PROVIDER_NAME,
        OpenAiProvider::factory(),
        OpenAiProvider::info(),
    );
    registry.register_message_channel(
        console::PROVIDER_NAME,
        ConsoleChannel::factory(),
        ConsoleChannel::info(),
    );

    let completion = config.providers.completion_provider()?;
    let provider = registry
        .create_llm_provider(&completion.name, &completion.settings)
        .await
        .with_context(|| format!("Failed to start completion provider '{}'", completion.name))?;

    let channel_entry = config.providers.channel_provider()?;
    let channel = registry
        .create_message_channel(&channel_entry.name, &channel_entry.settings)
        .await
        .with_context(|| format!("Failed to start channel '{}'", channel_entry.name))?;

    let estimator = Arc::new(HeuristicEstimator::new(config.estimator_cache.to_cache_config()));
    let ledger = Arc::new(
        BudgetLedger::with_estimator(config.budget.clone(), estimator)
            .context("Invalid budget configuration")?,
    );
    let queue = Arc::new(AdmissionQueue::new(
        config.rate_limits.clone(),
        config.backoff.clone(),
    ));
    let validator = Arc::new(CommandValidator::new(&config.validation));
    let orchestrator = Arc::new(Orchestrator::new(
        provider,
        Arc::clone(&ledger),
        Arc::clone(&queue),
        validator,
        config.llm.clone(),
    ));

    let replies = Arc::clone(&channel);
    channel.on_message(Arc::new(move |message: InboundMessage| {
        let orchestrator = Arc::clone(&orchestrator);
        let replies = Arc::clone(&replies);
        async move {
            // Off the reader task
            tokio::spawn(async move {
                let context = RequestContext {
                    user: Some(message.user.clone()),
                    channel: Some(message.channel.clone()),
                    ..RequestContext::default()
                };
                let reply = match orchestrator
                    .process_request(&message.content, &context, ProcessOptions::default())
                    .await
                {
                    Ok(result) => format_reply(&result),
                    Err(e) => {
                        warn!(user = %message.user, "Request failed: {}", e);
                        format_error(&e)
                    }
                };

                let outbound = OutboundMessage {
                    channel: message.channel,
                    content: reply,
                    thread_id: message.thread_id,
                };
                if let Err(e) = replies.send_message(outbound).await {
                    error!("Failed to send reply: {}", e);
                }
            });
        }
        .boxed()
    }));

    channel.start().await.context("Failed to start channel")?;
    for (provider, healthy) in registry.health_check_all().await {
        if !healthy {
            warn!(%provider, "Provider reported unhealthy at startup");
        }
    }
    info!(
        provider = %completion.name,
        channel = %channel_entry.name,
        "Gateway ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    queue.destroy();
    registry.cleanup().await;

    let summary = ledger.usage_summary();
    info!(
        daily_tokens = summary.today.total_tokens,
        monthly_tokens = summary.month.total_tokens,
        "Gateway stopped"
    );
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| logging.level.as_str().into());
    let registry = tracing_subscriber::registry().with(env_filter);

    match logging.format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).init(),
    }
}
