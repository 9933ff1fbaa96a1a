//! Provider registry for completion backends and message channels
//!
//! The registry keeps three things per provider family: the factories that
//! know how to build an instance, the catalog of [`ProviderInfo`] entries, and
//! the set of live instances that passed their health check.

use super::{
    ChannelProvider, CompletionProvider, ProviderConfig, ProviderError, ProviderFamily,
    ProviderInfo, ProviderLifecycle,
};
use crate::error::{GatewayError, Result};
use crate::metrics::METRICS;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Factory building a provider instance from its settings
pub type Factory<P> = Arc<dyn Fn(&ProviderConfig) -> std::result::Result<Arc<P>, ProviderError> + Send + Sync>;

/// Factory for completion providers
pub type CompletionFactory = Factory<dyn CompletionProvider>;

/// Factory for channel providers
pub type ChannelFactory = Factory<dyn ChannelProvider>;

/// Per-family bookkeeping
struct Family<P: ?Sized> {
    family: ProviderFamily,
    factories: RwLock<HashMap<String, Factory<P>>>,
    catalog: RwLock<HashMap<String, ProviderInfo>>,
    active: RwLock<HashMap<String, Arc<P>>>,
}

impl<P> Family<P>
where
    P: ProviderLifecycle + ?Sized + 'static,
{
    fn new(family: ProviderFamily) -> Self {
        Self {
            family,
            factories: RwLock::new(HashMap::new()),
            catalog: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: &str, factory: Factory<P>, mut info: ProviderInfo) {
        if info.family != self.family {
            warn!(
                "Provider {} registered as {} but declares {}",
                name,
                self.family.as_str(),
                info.family.as_str()
            );
            info.family = self.family;
        }

        let replaced = self
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), factory)
            .is_some();
        self.catalog
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), info);

        if replaced {
            debug!("Replaced {} provider factory {}", self.family.as_str(), name);
        } else {
            debug!("Registered {} provider {}", self.family.as_str(), name);
        }
    }

    async fn create(&self, name: &str, config: &ProviderConfig) -> Result<Arc<P>> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        let factory = factory.ok_or_else(|| GatewayError::UnknownProvider(name.to_string()))?;

        let instance = factory(config)?;

        if !instance.health_check().await {
            error!("{} provider {} failed its health check", self.family.as_str(), name);
            METRICS.record_provider_health(name, false);
            if let Err(e) = instance.destroy().await {
                warn!("Failed to tear down unhealthy provider {}: {}", name, e);
            }
            return Err(GatewayError::ProviderHealthCheckFailed(name.to_string()));
        }

        METRICS.record_provider_health(name, true);
        let previous = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(&instance));

        if let Some(previous) = previous {
            if let Err(e) = previous.destroy().await {
                warn!("Failed to tear down replaced provider {}: {}", name, e);
            }
        }

        info!("Activated {} provider {}", self.family.as_str(), name);
        Ok(instance)
    }

    fn get(&self, name: &str) -> Option<Arc<P>> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn has(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    fn catalog(&self) -> Vec<ProviderInfo> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn active_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn snapshot(&self) -> Vec<(String, Arc<P>)> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, instance)| (name.clone(), Arc::clone(instance)))
            .collect()
    }

    async fn health_check_all(&self, timeout: Duration) -> Vec<(String, bool)> {
        let checks = self.snapshot().into_iter().map(|(name, instance)| async move {
            // Spawned so a panicking check only fails its own entry
            let check = tokio::spawn(async move { instance.health_check().await });
            let healthy = match tokio::time::timeout(timeout, check).await {
                Ok(Ok(healthy)) => healthy,
                Ok(Err(e)) => {
                    error!("Health check for {} aborted: {}", name, e);
                    false
                }
                Err(_) => {
                    warn!("Health check for {} timed out after {:?}", name, timeout);
                    false
                }
            };
            METRICS.record_provider_health(&name, healthy);
            (name, healthy)
        });

        join_all(checks).await
    }

    async fn deactivate(&self, name: &str) -> bool {
        let removed = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);

        match removed {
            Some(instance) => {
                if let Err(e) = instance.destroy().await {
                    warn!("Error destroying {} provider {}: {}", self.family.as_str(), name, e);
                }
                info!("Deactivated {} provider {}", self.family.as_str(), name);
                true
            }
            None => false,
        }
    }

    async fn cleanup(&self) {
        let drained: Vec<(String, Arc<P>)> = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        for (name, instance) in drained {
            if let Err(e) = instance.destroy().await {
                warn!("Error destroying {} provider {}: {}", self.family.as_str(), name, e);
            }
        }
    }
}

/// Registry of provider factories and live instances
pub struct ProviderRegistry {
    completion: Family<dyn CompletionProvider>,
    channel: Family<dyn ChannelProvider>,
    health_timeout: Duration,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::with_health_timeout(Duration::from_secs(10))
    }

    /// Create an empty registry with a per-instance health check timeout
    pub fn with_health_timeout(health_timeout: Duration) -> Self {
        Self {
            completion: Family::new(ProviderFamily::Completion),
            channel: Family::new(ProviderFamily::Channel),
            health_timeout,
        }
    }

    pub fn register_llm_provider(&self, name: &str, factory: CompletionFactory, info: ProviderInfo) {
        self.completion.register(name, factory, info);
    }

    pub fn register_message_channel(&self, name: &str, factory: ChannelFactory, info: ProviderInfo) {
        self.channel.register(name, factory, info);
    }

    /// Build, health-check and activate a completion provider
    pub async fn create_llm_provider(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn CompletionProvider>> {
        self.completion.create(name, config).await
    }

    /// Build, health-check and activate a channel provider
    pub async fn create_message_channel(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn ChannelProvider>> {
        self.channel.create(name, config).await
    }

    pub fn get_llm_provider(&self, name: &str) -> Option<Arc<dyn CompletionProvider>> {
        self.completion.get(name)
    }

    pub fn get_message_channel(&self, name: &str) -> Option<Arc<dyn ChannelProvider>> {
        self.channel.get(name)
    }

    /// Whether a completion provider factory is registered under `name`
    pub fn has_llm_provider(&self, name: &str) -> bool {
        self.completion.has(name)
    }

    /// Whether a channel provider factory is registered under `name`
    pub fn has_message_channel(&self, name: &str) -> bool {
        self.channel.has(name)
    }

    /// Catalog of every registered provider, sorted by family then name
    pub fn available_providers(&self) -> Vec<ProviderInfo> {
        let mut providers = self.completion.catalog();
        providers.extend(self.channel.catalog());
        providers.sort_by(|a, b| {
            a.family
                .as_str()
                .cmp(b.family.as_str())
                .then_with(|| a.name.cmp(&b.name))
        });
        providers
    }

    pub fn active_llm_providers(&self) -> Vec<String> {
        self.completion.active_names()
    }

    pub fn active_message_channels(&self) -> Vec<String> {
        self.channel.active_names()
    }

    /// Health check every active instance; keys are `family:name`
    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let (completion, channel) = tokio::join!(
            self.completion.health_check_all(self.health_timeout),
            self.channel.health_check_all(self.health_timeout),
        );

        completion
            .into_iter()
            .map(|(name, healthy)| (format!("{}:{}", ProviderFamily::Completion.as_str(), name), healthy))
            .chain(
                channel
                    .into_iter()
                    .map(|(name, healthy)| (format!("{}:{}", ProviderFamily::Channel.as_str(), name), healthy)),
            )
            .collect()
    }

    /// Tear down an active completion provider; returns whether one was active
    pub async fn deactivate_llm_provider(&self, name: &str) -> bool {
        self.completion.deactivate(name).await
    }

    /// Tear down an active channel provider; returns whether one was active
    pub async fn deactivate_message_channel(&self, name: &str) -> bool {
        self.channel.deactivate(name).await
    }

    /// Tear down every active instance
    pub async fn cleanup(&self) {
        info!("Cleaning up active providers");
        self.channel.cleanup().await;
        self.completion.cleanup().await;
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{CompletionRequest, CompletionResponse, TokensUsed};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockProvider {
        name: String,
        healthy: bool,
        fail_destroy: bool,
        panic_on_check: bool,
        destroyed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ProviderLifecycle for MockProvider {
        async fn health_check(&self) -> bool {
            if self.panic_on_check {
                panic!("health check exploded");
            }
            self.healthy
        }

        async fn destroy(&self) -> std::result::Result<(), ProviderError> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            if self.fail_destroy {
                return Err(ProviderError::Other("socket already closed".to_string()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CompletionProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate_response(
            &self,
            _request: CompletionRequest,
        ) -> std::result::Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: "{}".to_string(),
                tokens_used: TokensUsed::default(),
                finish_reason: "stop".to_string(),
            })
        }

        fn calculate_cost(&self, _usage: &TokensUsed) -> f64 {
            0.0
        }
    }

    #[derive(Clone, Default)]
    struct Behaviour {
        unhealthy: bool,
        fail_destroy: bool,
        panic_on_check: bool,
    }

    fn factory(name: &str, behaviour: Behaviour, destroyed: Arc<AtomicUsize>) -> CompletionFactory {
        let name = name.to_string();
        Arc::new(move |_config: &ProviderConfig| {
            Ok(Arc::new(MockProvider {
                name: name.clone(),
                healthy: !behaviour.unhealthy,
                fail_destroy: behaviour.fail_destroy,
                panic_on_check: behaviour.panic_on_check,
                destroyed: Arc::clone(&destroyed),
            }) as Arc<dyn CompletionProvider>)
        })
    }

    fn info(name: &str) -> ProviderInfo {
        ProviderInfo {
            name: name.to_string(),
            family: ProviderFamily::Completion,
            version: "1.0.0".to_string(),
            capabilities: vec!["chat".to_string()],
        }
    }

    #[tokio::test]
    async fn test_unknown_provider_is_rejected() {
        let registry = ProviderRegistry::new();
        let result = registry
            .create_llm_provider("nonexistent", &serde_json::json!({}))
            .await;

        assert!(matches!(result, Err(GatewayError::UnknownProvider(ref name)) if name == "nonexistent"));
        assert!(registry.active_llm_providers().is_empty());
        assert!(registry.get_llm_provider("nonexistent").is_none());
    }

    #[tokio::test]
    async fn test_create_activates_healthy_provider() {
        let registry = ProviderRegistry::new();
        let destroyed = Arc::new(AtomicUsize::new(0));
        registry.register_llm_provider("mock", factory("mock", Behaviour::default(), destroyed), info("mock"));

        let provider = registry
            .create_llm_provider("mock", &serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(provider.name(), "mock");
        assert!(registry.get_llm_provider("mock").is_some());
        assert_eq!(registry.active_llm_providers(), vec!["mock".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_health_check_leaves_nothing_active() {
        let registry = ProviderRegistry::new();
        let destroyed = Arc::new(AtomicUsize::new(0));
        let behaviour = Behaviour { unhealthy: true, ..Default::default() };
        registry.register_llm_provider("sick", factory("sick", behaviour, Arc::clone(&destroyed)), info("sick"));

        let result = registry.create_llm_provider("sick", &serde_json::json!({})).await;

        assert!(matches!(result, Err(GatewayError::ProviderHealthCheckFailed(_))));
        assert!(registry.get_llm_provider("sick").is_none());
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_register_overwrites_by_name() {
        let registry = ProviderRegistry::new();
        let destroyed = Arc::new(AtomicUsize::new(0));
        let behaviour = Behaviour { unhealthy: true, ..Default::default() };
        registry.register_llm_provider("mock", factory("mock", behaviour, Arc::clone(&destroyed)), info("mock"));
        registry.register_llm_provider("mock", factory("mock", Behaviour::default(), destroyed), info("mock"));

        assert!(registry.has_llm_provider("mock"));
        assert_eq!(registry.available_providers().len(), 1);
        assert!(registry.create_llm_provider("mock", &serde_json::json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_health_check_all_isolates_failures() {
        let registry = ProviderRegistry::new();
        let destroyed = Arc::new(AtomicUsize::new(0));
        registry.register_llm_provider("good", factory("good", Behaviour::default(), Arc::clone(&destroyed)), info("good"));
        registry.register_llm_provider("flaky", factory("flaky", Behaviour::default(), Arc::clone(&destroyed)), info("flaky"));
        registry.create_llm_provider("good", &serde_json::json!({})).await.unwrap();
        registry.create_llm_provider("flaky", &serde_json::json!({})).await.unwrap();

        // Swap the live "flaky" instance for one whose health check panics
        let exploding = factory(
            "flaky",
            Behaviour { panic_on_check: true, ..Default::default() },
            Arc::clone(&destroyed),
        )(&serde_json::json!({}))
        .unwrap();
        registry
            .completion
            .active
            .write()
            .unwrap()
            .insert("flaky".to_string(), exploding);

        let report = registry.health_check_all().await;
        assert_eq!(report.get("completion:good"), Some(&true));
        assert_eq!(report.get("completion:flaky"), Some(&false));
    }

    #[tokio::test]
    async fn test_deactivate_tolerates_teardown_failure() {
        let registry = ProviderRegistry::new();
        let destroyed = Arc::new(AtomicUsize::new(0));
        let behaviour = Behaviour { fail_destroy: true, ..Default::default() };
        registry.register_llm_provider("mock", factory("mock", behaviour, Arc::clone(&destroyed)), info("mock"));
        registry.create_llm_provider("mock", &serde_json::json!({})).await.unwrap();

        assert!(registry.deactivate_llm_provider("mock").await);
        assert!(registry.get_llm_provider("mock").is_none());
        assert!(!registry.deactivate_llm_provider("mock").await);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cleanup_clears_every_instance() {
        let registry = ProviderRegistry::new();
        let destroyed = Arc::new(AtomicUsize::new(0));
        let failing = Behaviour { fail_destroy: true, ..Default::default() };
        registry.register_llm_provider("a", factory("a", failing, Arc::clone(&destroyed)), info("a"));
        registry.register_llm_provider("b", factory("b", Behaviour::default(), Arc::clone(&destroyed)), info("b"));
        registry.create_llm_provider("a", &serde_json::json!({})).await.unwrap();
        registry.create_llm_provider("b", &serde_json::json!({})).await.unwrap();

        registry.cleanup().await;

        assert!(registry.active_llm_providers().is_empty());
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_lookups_have_no_side_effects() {
        let registry = ProviderRegistry::new();
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let tracking: CompletionFactory = Arc::new(move |_config: &ProviderConfig| {
            flag.store(true, Ordering::SeqCst);
            Err(ProviderError::NotConfigured("unused".to_string()))
        });
        registry.register_llm_provider("lazy", tracking, info("lazy"));

        assert!(registry.has_llm_provider("lazy"));
        assert!(registry.get_llm_provider("lazy").is_none());
        assert_eq!(registry.available_providers().len(), 1);
        assert!(!called.load(Ordering::SeqCst));
    }
}
