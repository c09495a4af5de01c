//! Component registry and lifecycle management.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, instrument, warn};

use adaptive_query_core::config::RegistryConfig;
use adaptive_query_core::traits::{Capabilities, Capability, Component, ComponentConfig};
use adaptive_query_core::types::{ComponentHealth, HealthStatus};
use adaptive_query_core::{AdaptiveQueryError, Result};

use super::health::{HealthMonitor, HealthStatuses, poll_components};

struct Registered {
    component: Arc<dyn Component>,
    capabilities: Capabilities,
    config: ComponentConfig,
    sequence: usize,
}

impl Registered {
    /// Start-order key: role category first, registration order within it.
    fn start_key(&self) -> (bool, Option<Capability>, usize) {
        let primary = self.capabilities.primary();
        (primary.is_none(), primary, self.sequence)
    }
}

/// Read-only description of a registered component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentInfo {
    /// Component name.
    pub name: String,
    /// Component version.
    pub version: String,
    /// Roles the component plays, in start order.
    pub capabilities: Vec<Capability>,
    /// Health at the time of listing.
    pub health: ComponentHealth,
}

/// Hosts pluggable components: registration, ordered start and stop, health
/// monitoring and hot configuration updates.
///
/// Components start by role category (context layer, intent analyzer,
/// strategy selector, rewrite strategy, quality engine, feedback learner,
/// then generic components), in registration order within a category.
/// No registry lock is held while a component method runs.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use adaptive_query_core::config::RegistryConfig;
/// use adaptive_query_pipeline::classifier::IntentClassifier;
/// use adaptive_query_pipeline::context::SessionContextLayer;
/// use adaptive_query_pipeline::registry::ComponentRegistry;
///
/// # tokio_test::block_on(async {
/// let registry = ComponentRegistry::new(RegistryConfig::default());
/// registry.register(Arc::new(IntentClassifier::default())).await.unwrap();
/// registry.register(Arc::new(SessionContextLayer::default())).await.unwrap();
///
/// registry.start_all().await.unwrap();
/// assert_eq!(registry.start_order().await, vec!["session_context", "intent_classifier"]);
/// registry.stop_all().await.unwrap();
/// # });
/// ```
pub struct ComponentRegistry {
    config: RegistryConfig,
    components: RwLock<HashMap<String, Registered>>,
    started: RwLock<Vec<String>>,
    running: AtomicBool,
    lifecycle: Mutex<()>,
    monitor: Mutex<Option<HealthMonitor>>,
    next_sequence: AtomicUsize,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("config", &self.config)
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            components: RwLock::new(HashMap::new()),
            started: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            lifecycle: Mutex::new(()),
            monitor: Mutex::new(None),
            next_sequence: AtomicUsize::new(0),
        }
    }

    /// Whether `start_all` has completed and `stop_all` has not run since.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Register a component. Its roles are detected once and cached.
    pub async fn register(&self, component: Arc<dyn Component>) -> Result<()> {
        self.insert(component, ComponentConfig::new()).await
    }

    /// Initialize a component with `config`, then register it.
    pub async fn register_with_config(
        &self,
        component: Arc<dyn Component>,
        config: ComponentConfig,
    ) -> Result<()> {
        let name = component.name().to_string();
        if self.components.read().await.contains_key(&name) {
            return Err(AdaptiveQueryError::already_registered(name));
        }
        component.initialize(&config).await?;
        self.insert(component, config).await
    }

    async fn insert(&self, component: Arc<dyn Component>, config: ComponentConfig) -> Result<()> {
        if self.is_running() {
            return Err(AdaptiveQueryError::already_started("component_registry"));
        }
        let name = component.name().to_string();
        let capabilities = Capabilities::detect(&component);

        let mut components = self.components.write().await;
        if components.contains_key(&name) {
            return Err(AdaptiveQueryError::already_registered(name));
        }
        info!(
            component = %name,
            version = component.version(),
            roles = ?capabilities.iter().collect::<Vec<_>>(),
            "Registering component"
        );
        components.insert(
            name,
            Registered {
                component,
                capabilities,
                config,
                sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
            },
        );
        Ok(())
    }

    /// Remove a component. Only allowed while the registry is stopped.
    pub async fn unregister(&self, name: &str) -> Result<Arc<dyn Component>> {
        if self.is_running() {
            return Err(AdaptiveQueryError::already_started("component_registry"));
        }
        let removed = self
            .components
            .write()
            .await
            .remove(name)
            .ok_or_else(|| AdaptiveQueryError::not_found(format!("component '{name}'")))?;
        debug!(component = %name, "Component unregistered");
        Ok(removed.component)
    }

    /// Look up a component by name.
    pub async fn get_component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components
            .read()
            .await
            .get(name)
            .map(|r| Arc::clone(&r.component))
    }

    /// Names of the components playing `capability`, sorted.
    pub async fn list_by_capability(&self, capability: Capability) -> Vec<String> {
        let mut names: Vec<String> = self
            .components
            .read()
            .await
            .iter()
            .filter(|(_, r)| r.capabilities.contains(capability))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Every component with its current health, sorted by name.
    pub async fn list_all_components(&self) -> Vec<ComponentInfo> {
        let mut entries: Vec<(String, Arc<dyn Component>, Vec<Capability>)> = self
            .components
            .read()
            .await
            .iter()
            .map(|(name, r)| {
                (
                    name.clone(),
                    Arc::clone(&r.component),
                    r.capabilities.iter().collect(),
                )
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut infos = Vec::with_capacity(entries.len());
        for (name, component, capabilities) in entries {
            infos.push(ComponentInfo {
                version: component.version().to_string(),
                health: component.health_check().await,
                name,
                capabilities,
            });
        }
        infos
    }

    /// Last configuration applied to a component.
    pub async fn get_component_config(&self, name: &str) -> Result<ComponentConfig> {
        self.components
            .read()
            .await
            .get(name)
            .map(|r| r.config.clone())
            .ok_or_else(|| AdaptiveQueryError::not_found(format!("component '{name}'")))
    }

    /// Re-initialize a component with a new configuration and remember it.
    /// The update takes effect on the component's next call.
    #[instrument(skip(self, config))]
    pub async fn update_component_config(&self, name: &str, config: ComponentConfig) -> Result<()> {
        let component = self
            .get_component(name)
            .await
            .ok_or_else(|| AdaptiveQueryError::not_found(format!("component '{name}'")))?;

        component.initialize(&config).await?;

        let mut components = self.components.write().await;
        if let Some(registered) = components.get_mut(name) {
            registered.config.extend(config);
        }
        info!(component = %name, "Component configuration updated");
        Ok(())
    }

    /// Names in the order they were last started.
    pub async fn start_order(&self) -> Vec<String> {
        self.started.read().await.clone()
    }

    /// Components in start order.
    async fn ordered(&self) -> Vec<(String, Arc<dyn Component>)> {
        let components = self.components.read().await;
        let mut entries: Vec<(&String, &Registered)> = components.iter().collect();
        entries.sort_by_key(|(_, r)| r.start_key());
        entries
            .into_iter()
            .map(|(name, r)| (name.clone(), Arc::clone(&r.component)))
            .collect()
    }

    /// Start every component in category order and launch the health monitor.
    ///
    /// When a component fails to start, the ones already started are stopped
    /// in reverse order and the error is returned.
    #[instrument(skip(self))]
    pub async fn start_all(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if self.is_running() {
            return Err(AdaptiveQueryError::already_started("component_registry"));
        }

        let ordered = self.ordered().await;
        let mut started: Vec<(String, Arc<dyn Component>)> = Vec::with_capacity(ordered.len());

        for (name, component) in &ordered {
            if let Err(e) = component.start().await {
                error!(component = %name, error = %e, "Component failed to start, rolling back");
                for (started_name, started_component) in started.iter().rev() {
                    if let Err(stop_err) = started_component.stop().await {
                        warn!(component = %started_name, error = %stop_err, "Rollback stop failed");
                    }
                }
                self.started.write().await.clear();
                return Err(AdaptiveQueryError::lifecycle(format!(
                    "failed to start component '{name}': {e}"
                )));
            }
            debug!(component = %name, "Component started");
            started.push((name.clone(), Arc::clone(component)));
        }

        *self.started.write().await = started.iter().map(|(name, _)| name.clone()).collect();
        *self.monitor.lock().await = Some(HealthMonitor::spawn(
            started,
            self.config.health_check_interval(),
        ));
        self.running.store(true, Ordering::SeqCst);
        info!(components = ordered.len(), "All components started");
        Ok(())
    }

    /// Stop the health monitor and every component in reverse start order.
    /// Stop failures are logged and do not interrupt the sequence.
    #[instrument(skip(self))]
    pub async fn stop_all(&self) -> Result<()> {
        let _guard = self.lifecycle.lock().await;
        if !self.is_running() {
            return Ok(());
        }

        if let Some(monitor) = self.monitor.lock().await.take() {
            monitor.shutdown().await;
        }

        let order = self.started.read().await.clone();
        let mut failures = 0usize;
        for name in order.iter().rev() {
            let Some(component) = self.get_component(name).await else {
                continue;
            };
            match component.stop().await {
                Ok(()) => debug!(component = %name, "Component stopped"),
                Err(e) => {
                    failures += 1;
                    warn!(component = %name, error = %e, "Component failed to stop");
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(components = order.len(), failures, "All components stopped");
        Ok(())
    }

    /// Poll every component now.
    pub async fn check_health(&self) -> HashMap<String, ComponentHealth> {
        let components = self.ordered().await;
        let statuses: HealthStatuses = Arc::default();
        poll_components(&components, &statuses)
            .await
            .into_iter()
            .collect()
    }

    /// Statuses recorded by the background monitor, empty while stopped.
    pub async fn monitored_statuses(&self) -> HashMap<String, HealthStatus> {
        match self.monitor.lock().await.as_ref() {
            Some(monitor) => monitor.statuses().await,
            None => HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_query_core::traits::{ContextLayer, IntentAnalyzer};
    use adaptive_query_core::types::{Domain, IntentType, QueryContext, QueryIntent};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex as StdMutex;

    type Log = Arc<StdMutex<Vec<String>>>;

    #[derive(Debug)]
    struct StubComponent {
        name: String,
        role: Option<Capability>,
        fail_start: bool,
        log: Log,
        initialized: StdMutex<Vec<ComponentConfig>>,
    }

    impl StubComponent {
        fn new(name: &str, role: Option<Capability>, log: &Log) -> Self {
            Self {
                name: name.to_string(),
                role,
                fail_start: false,
                log: Arc::clone(log),
                initialized: StdMutex::new(Vec::new()),
            }
        }

        fn failing(mut self) -> Self {
            self.fail_start = true;
            self
        }

        fn push(&self, event: &str) {
            self.log.lock().unwrap().push(format!("{event}:{}", self.name));
        }
    }

    #[async_trait]
    impl Component for StubComponent {
        fn name(&self) -> &str {
            &self.name
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        async fn initialize(&self, config: &ComponentConfig) -> Result<()> {
            if config.contains_key("invalid") {
                return Err(AdaptiveQueryError::configuration("invalid option"));
            }
            self.initialized.lock().unwrap().push(config.clone());
            Ok(())
        }

        async fn start(&self) -> Result<()> {
            if self.fail_start {
                return Err(AdaptiveQueryError::internal("boom"));
            }
            self.push("start");
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.push("stop");
            Ok(())
        }

        async fn health_check(&self) -> ComponentHealth {
            ComponentHealth::healthy("ok")
        }

        fn as_context_layer(self: Arc<Self>) -> Option<Arc<dyn ContextLayer>> {
            (self.role == Some(Capability::ContextLayer)).then_some(self as Arc<dyn ContextLayer>)
        }

        fn as_intent_analyzer(self: Arc<Self>) -> Option<Arc<dyn IntentAnalyzer>> {
            (self.role == Some(Capability::IntentAnalyzer))
                .then_some(self as Arc<dyn IntentAnalyzer>)
        }
    }

    #[async_trait]
    impl ContextLayer for StubComponent {
        async fn build_context(&self, session_id: &str, _query: &str) -> Result<QueryContext> {
            Ok(QueryContext::empty(session_id))
        }

        async fn record(&self, _session_id: &str, _query: &str, _domain: Option<Domain>) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl IntentAnalyzer for StubComponent {
        async fn analyze(&self, query: &str) -> Result<QueryIntent> {
            Ok(QueryIntent::new(query, IntentType::Technical, Domain::Programming))
        }
    }

    fn log() -> Log {
        Arc::new(StdMutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn test_start_order_by_category() {
        let log = log();
        let registry = ComponentRegistry::default();
        registry.register(Arc::new(StubComponent::new("generic", None, &log))).await.unwrap();
        registry
            .register(Arc::new(StubComponent::new("analyzer", Some(Capability::IntentAnalyzer), &log)))
            .await
            .unwrap();
        registry
            .register(Arc::new(StubComponent::new("context", Some(Capability::ContextLayer), &log)))
            .await
            .unwrap();

        registry.start_all().await.unwrap();
        assert_eq!(registry.start_order().await, vec!["context", "analyzer", "generic"]);
        registry.stop_all().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "start:context",
                "start:analyzer",
                "start:generic",
                "stop:generic",
                "stop:analyzer",
                "stop:context",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_start_rolls_back_in_reverse() {
        let log = log();
        let registry = ComponentRegistry::default();
        registry
            .register(Arc::new(StubComponent::new("context", Some(Capability::ContextLayer), &log)))
            .await
            .unwrap();
        registry
            .register(Arc::new(StubComponent::new("analyzer", Some(Capability::IntentAnalyzer), &log)))
            .await
            .unwrap();
        registry
            .register(Arc::new(StubComponent::new("generic", None, &log).failing()))
            .await
            .unwrap();

        let err = registry.start_all().await.unwrap_err();
        assert!(matches!(err, AdaptiveQueryError::Lifecycle { .. }));
        assert!(!registry.is_running());
        assert!(registry.start_order().await.is_empty());
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start:context", "start:analyzer", "stop:analyzer", "stop:context"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_and_lifecycle_errors() {
        let log = log();
        let registry = ComponentRegistry::default();
        registry.register(Arc::new(StubComponent::new("a", None, &log))).await.unwrap();
        let err = registry
            .register(Arc::new(StubComponent::new("a", None, &log)))
            .await
            .unwrap_err();
        assert!(matches!(err, AdaptiveQueryError::AlreadyRegistered { .. }));

        registry.start_all().await.unwrap();
        assert!(matches!(
            registry.start_all().await.unwrap_err(),
            AdaptiveQueryError::AlreadyStarted { .. }
        ));
        assert!(registry.unregister("a").await.is_err());
        registry.stop_all().await.unwrap();
        registry.stop_all().await.unwrap();
        registry.unregister("a").await.unwrap();
        assert!(registry.get_component("a").await.is_none());
    }

    #[tokio::test]
    async fn test_capability_listing() {
        let log = log();
        let registry = ComponentRegistry::default();
        registry
            .register(Arc::new(StubComponent::new("b", Some(Capability::ContextLayer), &log)))
            .await
            .unwrap();
        registry
            .register(Arc::new(StubComponent::new("a", Some(Capability::ContextLayer), &log)))
            .await
            .unwrap();
        registry.register(Arc::new(StubComponent::new("c", None, &log))).await.unwrap();

        assert_eq!(
            registry.list_by_capability(Capability::ContextLayer).await,
            vec!["a", "b"]
        );
        let all = registry.list_all_components().await;
        let names: Vec<_> = all.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(all[2].capabilities, Vec::<Capability>::new());
    }

    #[tokio::test]
    async fn test_config_update() {
        let log = log();
        let registry = ComponentRegistry::default();
        let mut initial = ComponentConfig::new();
        initial.insert("level".into(), serde_json::json!(1));
        registry
            .register_with_config(Arc::new(StubComponent::new("a", None, &log)), initial)
            .await
            .unwrap();

        let mut update = ComponentConfig::new();
        update.insert("level".into(), serde_json::json!(2));
        registry.update_component_config("a", update).await.unwrap();
        let config = registry.get_component_config("a").await.unwrap();
        assert_eq!(config["level"], serde_json::json!(2));

        let mut invalid = ComponentConfig::new();
        invalid.insert("invalid".into(), serde_json::json!(true));
        assert!(registry.update_component_config("a", invalid).await.is_err());
        assert!(!registry.get_component_config("a").await.unwrap().contains_key("invalid"));
        assert!(registry.update_component_config("missing", ComponentConfig::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_check_health() {
        let log = log();
        let registry = ComponentRegistry::default();
        registry.register(Arc::new(StubComponent::new("a", None, &log))).await.unwrap();
        let health = registry.check_health().await;
        assert_eq!(health["a"].status, HealthStatus::Healthy);
        assert!(registry.monitored_statuses().await.is_empty());
    }
}
