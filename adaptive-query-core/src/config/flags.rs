//! Runtime feature flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Flag controlling adaptive processing as a whole.
pub const FLAG_ADAPTIVE: &str = "adaptive_processing";
/// Flag controlling the retrieval gate.
pub const FLAG_RETRIEVAL_GATE: &str = "retrieval_gate";
/// Flag controlling the iterative retrieval loop.
pub const FLAG_ITERATIVE: &str = "iterative_retrieval";
/// Flag controlling query rewriting.
pub const FLAG_REWRITE: &str = "query_rewrite";

/// A flag and its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    /// Flag name.
    pub name: String,
    /// Whether the flag is on.
    pub enabled: bool,
}

/// Read-mostly table of named feature flags.
///
/// Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct FeatureFlags {
    flags: Arc<RwLock<BTreeMap<String, bool>>>,
}

impl FeatureFlags {
    /// Create an empty flag table. Unknown flags read as disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with the pipeline flags enabled.
    pub fn with_defaults() -> Self {
        let flags = [FLAG_ADAPTIVE, FLAG_RETRIEVAL_GATE, FLAG_ITERATIVE, FLAG_REWRITE]
            .into_iter()
            .map(|name| (name.to_string(), true))
            .collect();
        Self {
            flags: Arc::new(RwLock::new(flags)),
        }
    }

    /// Whether a flag is on.
    pub async fn is_enabled(&self, name: &str) -> bool {
        self.flags.read().await.get(name).copied().unwrap_or(false)
    }

    /// Turn a flag on.
    pub async fn enable(&self, name: &str) {
        self.set(name, true).await;
    }

    /// Turn a flag off.
    pub async fn disable(&self, name: &str) {
        self.set(name, false).await;
    }

    /// Set a flag.
    pub async fn set(&self, name: &str, enabled: bool) {
        let previous = self.flags.write().await.insert(name.to_string(), enabled);
        if previous != Some(enabled) {
            info!(flag = name, enabled, "Feature flag changed");
        }
    }

    /// Snapshot of every flag, sorted by name.
    pub async fn list(&self) -> Vec<FeatureFlag> {
        self.flags
            .read()
            .await
            .iter()
            .map(|(name, enabled)| FeatureFlag {
                name: name.clone(),
                enabled: *enabled,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_flag_is_disabled() {
        let flags = FeatureFlags::new();
        assert!(!flags.is_enabled("anything").await);
    }

    #[tokio::test]
    async fn test_enable_disable_shared_between_clones() {
        let flags = FeatureFlags::with_defaults();
        let other = flags.clone();
        assert!(flags.is_enabled(FLAG_ITERATIVE).await);

        other.disable(FLAG_ITERATIVE).await;
        assert!(!flags.is_enabled(FLAG_ITERATIVE).await);

        let listed = flags.list().await;
        assert_eq!(listed.len(), 4);
        assert!(listed.windows(2).all(|w| w[0].name < w[1].name));
    }
}
