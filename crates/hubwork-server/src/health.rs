//! Liveness and readiness reports for the private listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hubwork_core::Hub;
use serde::{Deserialize, Serialize};

/// Body of `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    /// Always `"healthy"` while the process answers.
    pub status: String,
    /// Application name.
    pub application: String,
    /// Application version, when declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Seconds since the server started.
    pub uptime_seconds: u64,
}

/// Body of `/ready`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessStatus {
    /// Whether traffic should be sent.
    pub ready: bool,
    /// Number of registered services.
    pub service_count: usize,
    /// Registered routing keys, sorted.
    pub services: Vec<String>,
}

/// Liveness and readiness state of one server.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    started: Instant,
    ready: Arc<AtomicBool>,
}

impl HealthCheck {
    /// Starts the uptime clock; not ready until [`set_ready`](Self::set_ready).
    #[must_use]
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flips readiness.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Current readiness flag.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Time since construction.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Liveness report for `hub`.
    #[must_use]
    pub fn health(&self, hub: &Hub) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            application: hub.application_name().to_string(),
            version: hub.application_version().map(ToString::to_string),
            uptime_seconds: self.uptime().as_secs(),
        }
    }

    /// Readiness report for `hub`.
    #[must_use]
    pub fn readiness(&self, hub: &Hub) -> ReadinessStatus {
        let mut services = hub.routing_keys();
        services.sort();
        ReadinessStatus {
            ready: self.is_ready(),
            service_count: hub.service_count(),
            services,
        }
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubwork_core::Service;

    #[test]
    fn test_reports() {
        let hub = Hub::new("recipes").with_version("2.0.0");
        hub.add_service(Service::new("kitchen", "soups"));
        hub.add_service(Service::new("Kitchen", "Bread"));

        let check = HealthCheck::new();
        let health = check.health(&hub);
        assert_eq!(health.status, "healthy");
        assert_eq!(health.application, "recipes");
        assert_eq!(health.version.as_deref(), Some("2.0.0"));

        let readiness = check.readiness(&hub);
        assert!(!readiness.ready);
        assert_eq!(readiness.service_count, 2);
        assert_eq!(readiness.services, ["kitchen/bread", "kitchen/soups"]);

        check.set_ready(true);
        assert!(check.readiness(&hub).ready);
    }

    #[test]
    fn test_wire_names() {
        let status = ReadinessStatus {
            ready: true,
            service_count: 0,
            services: Vec::new(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["serviceCount"], 0);
    }
}
