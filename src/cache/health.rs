//! Health Checks
//!
//! Component health for the two tiers. The overall status is the worst of
//! the components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Evictions per check interval, as a multiple of capacity, reported as Warning
///
/// A full store is the steady state; turning the whole store over between
/// two checks is not.
pub const LOCAL_CHURN_WARNING: f64 = 1.0;

/// Health status, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Fully operational
    Healthy,
    /// Degraded but serving
    Warning,
    /// A component is down or exhausted
    Critical,
}

impl HealthStatus {
    /// Healthy or Warning
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Warning)
    }

    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }

    /// Numeric value for gauges (0 = healthy)
    pub fn as_gauge(&self) -> i64 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Critical => 2,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Health of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    pub fn warning(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Warning,
            message: Some(message.into()),
        }
    }

    pub fn critical(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Critical,
            message: Some(message.into()),
        }
    }

    /// Remote tier: not configured, reachable, or failing its probe
    pub fn remote(configured: bool, reachable: bool) -> Self {
        match (configured, reachable) {
            (false, _) => Self::warning("remote", "remote store not configured, running local-only"),
            (true, true) => Self::healthy("remote"),
            (true, false) => Self::critical("remote", "remote store unreachable"),
        }
    }

    /// Local tier, graded by eviction churn since the previous check
    ///
    /// Zero capacity retains nothing and is Critical.
    pub fn local(capacity: usize, utilization: f64, evicted: u64) -> Self {
        if capacity == 0 {
            return Self::critical("local", "local store has zero capacity");
        }
        let churn = evicted as f64 / capacity as f64;
        if churn >= LOCAL_CHURN_WARNING {
            return Self::warning(
                "local",
                format!(
                    "local store thrashing: {} evictions since last check ({:.0}% full)",
                    evicted,
                    utilization * 100.0
                ),
            );
        }
        Self {
            name: "local".into(),
            status: HealthStatus::Healthy,
            message: Some(format!("{:.0}% full", utilization * 100.0)),
        }
    }
}

/// Result of one health check pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    /// `None` until the first check has run
    pub checked_at: Option<DateTime<Utc>>,
    pub version: String,
}

impl HealthReport {
    pub fn new(components: Vec<ComponentHealth>) -> Self {
        let status = components
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            components,
            checked_at: Some(Utc::now()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Placeholder reported before the first check
    pub fn pending() -> Self {
        Self {
            status: HealthStatus::Healthy,
            components: Vec::new(),
            checked_at: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components.iter().find(|c| c.name == name)
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::pending()
    }
}
