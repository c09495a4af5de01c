//! Component health and context types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{AsRefStr, Display, EnumString};

use super::intent::Domain;

/// Health state reported by a component.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HealthStatus {
    /// Working normally.
    Healthy,
    /// Working with reduced quality.
    Degraded,
    /// Not working.
    Unhealthy,
}

/// Polled health snapshot of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Current status.
    pub status: HealthStatus,
    /// Human readable message.
    pub message: String,
    /// Numeric metrics.
    pub metrics: HashMap<String, f64>,
    /// When the snapshot was taken.
    pub last_update: DateTime<Utc>,
}

impl ComponentHealth {
    /// Create a snapshot with the given status.
    pub fn new<S: Into<String>>(status: HealthStatus, message: S) -> Self {
        Self {
            status,
            message: message.into(),
            metrics: HashMap::new(),
            last_update: Utc::now(),
        }
    }

    /// Healthy snapshot.
    pub fn healthy<S: Into<String>>(message: S) -> Self {
        Self::new(HealthStatus::Healthy, message)
    }

    /// Unhealthy snapshot.
    pub fn unhealthy<S: Into<String>>(message: S) -> Self {
        Self::new(HealthStatus::Unhealthy, message)
    }

    /// Add a metric.
    #[must_use]
    pub fn with_metric<S: Into<String>>(mut self, key: S, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }
}

/// Session context passed explicitly through a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    /// Session id.
    pub session_id: String,
    /// Recent queries in the session, oldest first, excluding the current one.
    pub recent_queries: Vec<String>,
    /// Most frequent domain in the session, if any was recorded.
    pub dominant_domain: Option<Domain>,
    /// When the context was built.
    pub timestamp: DateTime<Utc>,
}

impl QueryContext {
    /// An empty context for a session.
    pub fn empty<S: Into<String>>(session_id: S) -> Self {
        Self {
            session_id: session_id.into(),
            recent_queries: Vec::new(),
            dominant_domain: None,
            timestamp: Utc::now(),
        }
    }
}
