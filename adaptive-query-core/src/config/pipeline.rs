//! Aggregate pipeline configuration and layered loading.
//!
//! Configuration is read-mostly: it is loaded once (file plus environment
//! overlay), and individual components may later receive hot updates through
//! [`merge_overrides`], which take effect on the next request.

use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::{
    ClassifierConfig, DecisionConfig, IterativeConfig, PlannerConfig, RegistryConfig,
    RetrievalGateConfig, RewriteConfig, ServiceConfig,
};
use crate::traits::ComponentConfig;
use crate::{AdaptiveQueryError, Result};

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "ADAPTIVE_QUERY";

/// Configuration for every stage of the pipeline.
///
/// # Examples
///
/// ```rust
/// use adaptive_query_core::config::{IterativeConfig, PipelineConfig};
///
/// let config = PipelineConfig::default()
///     .with_iterative(IterativeConfig::default().with_max_iterations(5));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Intent classifier.
    pub classifier: ClassifierConfig,
    /// Decision engine.
    pub decision: DecisionConfig,
    /// Task planner.
    pub planner: PlannerConfig,
    /// Rewrite pipeline.
    pub rewrite: RewriteConfig,
    /// Iterative retriever.
    pub iterative: IterativeConfig,
    /// Retrieval gate.
    pub gate: RetrievalGateConfig,
    /// Component registry.
    pub registry: RegistryConfig,
    /// Query service.
    pub service: ServiceConfig,
}

impl PipelineConfig {
    /// Load configuration from a file with an environment overlay.
    ///
    /// The format is inferred from the extension (TOML, JSON, YAML, ...).
    /// Variables such as `ADAPTIVE_QUERY_ITERATIVE__MAX_ITERATIONS=5` override
    /// file values. A missing file yields defaults plus the overlay.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading pipeline configuration");
        let config: Self = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AdaptiveQueryError::configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AdaptiveQueryError::configuration(e.to_string()))
    }

    /// Replace the rewrite configuration.
    #[must_use]
    pub fn with_rewrite(mut self, rewrite: RewriteConfig) -> Self {
        self.rewrite = rewrite;
        self
    }

    /// Replace the iterative retriever configuration.
    #[must_use]
    pub fn with_iterative(mut self, iterative: IterativeConfig) -> Self {
        self.iterative = iterative;
        self
    }

    /// Replace the service configuration.
    #[must_use]
    pub fn with_service(mut self, service: ServiceConfig) -> Self {
        self.service = service;
        self
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.classifier.validate()?;
        self.decision.validate()?;
        self.planner.validate()?;
        self.rewrite.validate()?;
        self.iterative.validate()?;
        self.gate.validate()?;
        self.registry.validate()?;
        self.service.validate()
    }
}

fn merge_json(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_json(existing, value);
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Apply a hot-update patch to a typed configuration.
///
/// The current value is serialized, patched key by key (nested objects are
/// merged, everything else replaced) and deserialized again, so unknown keys
/// are ignored and missing keys keep their current value.
pub fn merge_overrides<T>(current: &T, overrides: &ComponentConfig) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(current)?;
    let patch = serde_json::Value::Object(
        overrides
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    merge_json(&mut value, &patch);
    Ok(serde_json::from_value(value)?)
}
