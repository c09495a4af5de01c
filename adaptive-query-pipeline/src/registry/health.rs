//! Background health monitoring.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use adaptive_query_core::traits::Component;
use adaptive_query_core::types::{ComponentHealth, HealthStatus};

/// Last observed status per component.
pub type HealthStatuses = Arc<RwLock<HashMap<String, HealthStatus>>>;

/// Periodic health poller running as a cancellable background task.
///
/// The first poll happens one interval after spawning. Dropping the monitor
/// also ends the task because the shutdown channel closes.
#[derive(Debug)]
pub struct HealthMonitor {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    statuses: HealthStatuses,
}

impl HealthMonitor {
    /// Spawn the monitor for a fixed set of components.
    pub fn spawn(components: Vec<(String, Arc<dyn Component>)>, interval: Duration) -> Self {
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let statuses: HealthStatuses = Arc::new(RwLock::new(HashMap::new()));
        let shared = Arc::clone(&statuses);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        poll_components(&components, &shared).await;
                    }
                }
            }
            debug!("Health monitor stopped");
        });

        info!(interval_ms = interval.as_millis(), "Health monitor started");
        Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
            statuses,
        }
    }

    /// Last observed status per component.
    pub async fn statuses(&self) -> HashMap<String, HealthStatus> {
        self.statuses.read().await.clone()
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Health monitor task ended abnormally");
            }
        }
    }
}

/// Poll every component once, record statuses and log transitions.
///
/// Returns the fresh health snapshots in input order.
pub async fn poll_components(
    components: &[(String, Arc<dyn Component>)],
    statuses: &HealthStatuses,
) -> Vec<(String, ComponentHealth)> {
    let mut snapshots = Vec::with_capacity(components.len());
    for (name, component) in components {
        snapshots.push((name.clone(), component.health_check().await));
    }

    let mut last = statuses.write().await;
    let mut degraded = 0usize;
    let mut unhealthy = 0usize;
    for (name, health) in &snapshots {
        let previous = last.insert(name.clone(), health.status);
        match health.status {
            HealthStatus::Degraded => degraded += 1,
            HealthStatus::Unhealthy => unhealthy += 1,
            HealthStatus::Healthy => {}
        }
        if previous == Some(health.status) {
            continue;
        }
        match (previous, health.status) {
            (None, HealthStatus::Healthy) => {}
            (_, HealthStatus::Healthy) => {
                info!(component = %name, "Component recovered");
            }
            (_, HealthStatus::Degraded) => {
                warn!(component = %name, message = %health.message, "Component degraded");
            }
            (_, HealthStatus::Unhealthy) => {
                error!(component = %name, message = %health.message, "Component unhealthy");
            }
        }
    }

    debug!(
        total = snapshots.len(),
        healthy = snapshots.len() - degraded - unhealthy,
        degraded,
        unhealthy,
        "Health check completed"
    );
    snapshots
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaptive_query_core::Result;
    use adaptive_query_core::traits::ComponentConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Default)]
    struct Flaky {
        broken: AtomicBool,
    }

    #[async_trait]
    impl Component for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn version(&self) -> &str {
            "0.0.0"
        }

        async fn initialize(&self, _config: &ComponentConfig) -> Result<()> {
            Ok(())
        }

        async fn start(&self) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }

        async fn health_check(&self) -> ComponentHealth {
            if self.broken.load(Ordering::SeqCst) {
                ComponentHealth::unhealthy("broken")
            } else {
                ComponentHealth::healthy("fine")
            }
        }
    }

    #[tokio::test]
    async fn test_poll_tracks_transitions() {
        let flaky = Arc::new(Flaky::default());
        let components: Vec<(String, Arc<dyn Component>)> =
            vec![("flaky".to_string(), Arc::clone(&flaky) as Arc<dyn Component>)];
        let statuses: HealthStatuses = Arc::default();

        poll_components(&components, &statuses).await;
        assert_eq!(statuses.read().await["flaky"], HealthStatus::Healthy);

        flaky.broken.store(true, Ordering::SeqCst);
        let snapshots = poll_components(&components, &statuses).await;
        assert_eq!(snapshots[0].1.status, HealthStatus::Unhealthy);
        assert_eq!(statuses.read().await["flaky"], HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_monitor_polls_and_shuts_down() {
        let components: Vec<(String, Arc<dyn Component>)> = vec![(
            "flaky".to_string(),
            Arc::new(Flaky::default()) as Arc<dyn Component>,
        )];
        let monitor = HealthMonitor::spawn(components, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(
            monitor.statuses().await.get("flaky"),
            Some(&HealthStatus::Healthy)
        );
        monitor.shutdown().await;
    }
}
