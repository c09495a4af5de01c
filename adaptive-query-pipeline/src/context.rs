//! Bounded per-session context.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use adaptive_query_core::config::{ServiceConfig, merge_overrides};
use adaptive_query_core::traits::{Component, ComponentConfig, ContextLayer};
use adaptive_query_core::types::{ComponentHealth, Domain, QueryContext};
use adaptive_query_core::{AdaptiveQueryError, Result};

/// Limits of the session context layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionLimits {
    /// Recent queries kept per session.
    pub session_window: usize,
    /// Maximum tracked sessions. The least recently active one is dropped
    /// first.
    pub max_sessions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for SessionLimits {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            session_window: config.session_window,
            max_sessions: config.max_sessions,
        }
    }
}

impl SessionLimits {
    fn validate(&self) -> Result<()> {
        if self.session_window == 0 || self.max_sessions == 0 {
            return Err(AdaptiveQueryError::configuration(
                "session_window and max_sessions must be greater than 0",
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Session {
    recent: VecDeque<(String, Option<Domain>)>,
    last_active: u64,
}

impl Session {
    fn dominant_domain(&self) -> Option<Domain> {
        let mut counts: Vec<(Domain, usize)> = Vec::new();
        for domain in self.recent.iter().filter_map(|(_, d)| *d) {
            match counts.iter_mut().find(|(d, _)| *d == domain) {
                Some((_, n)) => *n += 1,
                None => counts.push((domain, 1)),
            }
        }
        counts
            .into_iter()
            .fold(None, |best: Option<(Domain, usize)>, (d, n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((d, n)),
            })
            .map(|(d, _)| d)
    }
}

/// Keeps the last few queries of each session and hands them to the pipeline
/// as an explicit [`QueryContext`].
///
/// # Examples
///
/// ```rust
/// use adaptive_query_core::traits::ContextLayer;
/// use adaptive_query_core::types::Domain;
/// use adaptive_query_pipeline::context::SessionContextLayer;
///
/// # tokio_test::block_on(async {
/// let layer = SessionContextLayer::default();
/// layer.record("s1", "redis eviction", Some(Domain::Database)).await.unwrap();
///
/// let context = layer.build_context("s1", "and persistence?").await.unwrap();
/// assert_eq!(context.recent_queries, vec!["redis eviction".to_string()]);
/// assert_eq!(context.dominant_domain, Some(Domain::Database));
/// # });
/// ```
#[derive(Debug)]
pub struct SessionContextLayer {
    name: String,
    limits: RwLock<SessionLimits>,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    activity: AtomicU64,
}

impl Default for SessionContextLayer {
    fn default() -> Self {
        Self::new(SessionLimits::default())
    }
}

impl SessionContextLayer {
    /// Create a context layer.
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            name: "session_context".to_string(),
            limits: RwLock::new(limits),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            activity: AtomicU64::new(0),
        }
    }

    /// Number of tracked sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl ContextLayer for SessionContextLayer {
    async fn build_context(&self, session_id: &str, _query: &str) -> Result<QueryContext> {
        let sessions = self.sessions.read().await;
        let Some(session) = sessions.get(session_id) else {
            return Ok(QueryContext::empty(session_id));
        };
        Ok(QueryContext {
            session_id: session_id.to_string(),
            recent_queries: session.recent.iter().map(|(q, _)| q.clone()).collect(),
            dominant_domain: session.dominant_domain(),
            timestamp: Utc::now(),
        })
    }

    async fn record(&self, session_id: &str, query: &str, domain: Option<Domain>) -> Result<()> {
        let limits = self.limits.read().await.clone();
        let mut sessions = self.sessions.write().await;
        let tick = self.activity.fetch_add(1, Ordering::Relaxed);

        if !sessions.contains_key(session_id) && sessions.len() >= limits.max_sessions {
            if let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_active)
                .map(|(id, _)| id.clone())
            {
                sessions.remove(&oldest);
                debug!(session_id = %oldest, "Dropped least recently active session");
            }
        }

        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session {
                recent: VecDeque::with_capacity(limits.session_window),
                last_active: tick,
            });
        session.recent.push_back((query.to_string(), domain));
        while session.recent.len() > limits.session_window {
            session.recent.pop_front();
        }
        session.last_active = tick;
        Ok(())
    }
}

#[async_trait]
impl Component for SessionContextLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        crate::VERSION
    }

    async fn initialize(&self, config: &ComponentConfig) -> Result<()> {
        let mut current = self.limits.write().await;
        let updated: SessionLimits = merge_overrides(&*current, config)?;
        updated.validate()?;
        *current = updated;
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.sessions.write().await.clear();
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    async fn health_check(&self) -> ComponentHealth {
        ComponentHealth::healthy("session context ready")
            .with_metric("sessions", self.session_count().await as f64)
    }

    fn as_context_layer(self: Arc<Self>) -> Option<Arc<dyn ContextLayer>> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn limits(session_window: usize, max_sessions: usize) -> SessionLimits {
        SessionLimits {
            session_window,
            max_sessions,
        }
    }

    #[tokio::test]
    async fn test_unknown_session_is_empty() {
        let context = SessionContextLayer::default()
            .build_context("nobody", "query")
            .await
            .unwrap();
        assert!(context.recent_queries.is_empty());
        assert_eq!(context.dominant_domain, None);
    }

    #[tokio::test]
    async fn test_window_is_bounded() {
        let layer = SessionContextLayer::new(limits(2, 10));
        for query in ["one", "two", "three"] {
            layer.record("s", query, None).await.unwrap();
        }
        let context = layer.build_context("s", "four").await.unwrap();
        assert_eq!(context.recent_queries, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn test_dominant_domain_prefers_first_on_tie() {
        let layer = SessionContextLayer::default();
        layer.record("s", "a", Some(Domain::Frontend)).await.unwrap();
        layer.record("s", "b", Some(Domain::Database)).await.unwrap();
        let context = layer.build_context("s", "c").await.unwrap();
        assert_eq!(context.dominant_domain, Some(Domain::Frontend));

        layer.record("s", "d", Some(Domain::Database)).await.unwrap();
        let context = layer.build_context("s", "e").await.unwrap();
        assert_eq!(context.dominant_domain, Some(Domain::Database));
    }

    #[tokio::test]
    async fn test_oldest_session_is_dropped() {
        let layer = SessionContextLayer::new(limits(5, 2));
        layer.record("a", "q", None).await.unwrap();
        layer.record("b", "q", None).await.unwrap();
        layer.record("a", "q2", None).await.unwrap();
        layer.record("c", "q", None).await.unwrap();

        assert_eq!(layer.session_count().await, 2);
        let b = layer.build_context("b", "q").await.unwrap();
        assert!(b.recent_queries.is_empty());
        let a = layer.build_context("a", "q").await.unwrap();
        assert_eq!(a.recent_queries.len(), 2);
    }

    #[tokio::test]
    async fn test_initialize_rejects_zero_window() {
        let layer = SessionContextLayer::default();
        let mut patch = ComponentConfig::new();
        patch.insert("session_window".into(), serde_json::json!(0));
        assert!(layer.initialize(&patch).await.is_err());
    }
}
