//! The health report served on `/healthz`.
use crate::amqp::{is_connected, Connection};
use axum::http::StatusCode;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// The overall health of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    #[serde(rename = "OK")]
    Ok,
    /// A non-critical check failed.
    #[serde(rename = "Partially Available")]
    PartiallyAvailable,
    /// A critical check failed.
    #[serde(rename = "Unavailable")]
    Unavailable,
}

impl HealthStatus {
    /// `200` unless the service is unavailable.
    pub fn status_code(&self) -> StatusCode {
        match self {
            HealthStatus::Ok | HealthStatus::PartiallyAvailable => StatusCode::OK,
            HealthStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Identifies the running build in the health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub name: String,
    pub version: String,
}

impl Component {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// A single check contributing to the health report.
#[async_trait::async_trait]
pub trait HealthCheck: Send + Sync + 'static {
    /// The key used for this check in the `failures` section of the report.
    fn name(&self) -> &str;

    /// A failing critical check makes the whole service unavailable.
    fn critical(&self) -> bool {
        true
    }

    async fn check(&self) -> Result<(), anyhow::Error>;
}

/// Reports whether the connection with the broker is still open.
pub struct BrokerConnectionCheck {
    connection: Arc<Connection>,
}

impl BrokerConnectionCheck {
    pub fn new(connection: Arc<Connection>) -> Self {
        Self { connection }
    }
}

#[async_trait::async_trait]
impl HealthCheck for BrokerConnectionCheck {
    fn name(&self) -> &str {
        "rabbitmq"
    }

    async fn check(&self) -> Result<(), anyhow::Error> {
        if is_connected(&self.connection) {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "connection is {:?}",
                self.connection.status().state()
            ))
        }
    }
}

/// The process serving the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub pid: u32,
    /// The parallelism available to the process.
    pub cpus: usize,
    pub started_at: String,
    pub uptime_seconds: i64,
}

impl SystemInfo {
    fn at(started_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            os: std::env::consts::OS,
            arch: std::env::consts::ARCH,
            pid: std::process::id(),
            cpus: available_cpus(),
            started_at: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            uptime_seconds: (now - started_at).num_seconds().max(0),
        }
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// The body of a `/healthz` response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: String,
    pub component: Component,
    pub system: SystemInfo,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<String, String>,
}

/// Runs every registered [`HealthCheck`] and aggregates their outcome.
#[derive(Clone)]
pub struct Health {
    component: Component,
    checks: Vec<Arc<dyn HealthCheck>>,
    started_at: DateTime<Utc>,
}

impl Health {
    /// Uptime in the report is counted from this call.
    pub fn new(component: Component) -> Self {
        Self {
            component,
            checks: Vec::new(),
            started_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_check<C: HealthCheck>(mut self, check: C) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Run all checks, one after the other.
    pub async fn measure(&self) -> HealthReport {
        self.measure_at(Utc::now()).await
    }

    async fn measure_at(&self, now: DateTime<Utc>) -> HealthReport {
        let mut status = HealthStatus::Ok;
        let mut failures = BTreeMap::new();
        for check in &self.checks {
            if let Err(e) = check.check().await {
                tracing::warn!(check = check.name(), error = %e, "health check failed");
                failures.insert(check.name().to_owned(), e.to_string());
                status = match (status, check.critical()) {
                    (_, true) | (HealthStatus::Unavailable, _) => HealthStatus::Unavailable,
                    _ => HealthStatus::PartiallyAvailable,
                };
            }
        }

        HealthReport {
            status,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            component: self.component.clone(),
            system: SystemInfo::at(self.started_at, now),
            failures,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{available_cpus, Component, Health, HealthCheck, HealthStatus};
    use axum::http::StatusCode;
    use chrono::{Duration, TimeZone, Utc};

    /// A check with a fixed outcome.
    pub(crate) struct Stub {
        pub(crate) name: &'static str,
        pub(crate) healthy: bool,
        pub(crate) critical: bool,
    }

    #[async_trait::async_trait]
    impl HealthCheck for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn critical(&self) -> bool {
            self.critical
        }

        async fn check(&self) -> Result<(), anyhow::Error> {
            if self.healthy {
                Ok(())
            } else {
                Err(anyhow::anyhow!("{} is down", self.name))
            }
        }
    }

    fn health() -> Health {
        Health::new(Component::new("usvc-message-consumer - abc123", "1.0.0"))
    }

    #[tokio::test]
    async fn no_failures_means_ok() {
        let health = health().with_check(Stub {
            name: "rabbitmq",
            healthy: true,
            critical: true,
        });

        let report = health.measure().await;

        assert_eq!(report.status, HealthStatus::Ok);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn a_failing_non_critical_check_means_partially_available() {
        let health = health()
            .with_check(Stub {
                name: "rabbitmq",
                healthy: true,
                critical: true,
            })
            .with_check(Stub {
                name: "cache",
                healthy: false,
                critical: false,
            });

        let report = health.measure().await;

        assert_eq!(report.status, HealthStatus::PartiallyAvailable);
        assert_eq!(report.status.status_code(), StatusCode::OK);
        assert_eq!(report.failures["cache"], "cache is down");
    }

    #[tokio::test]
    async fn a_failing_critical_check_means_unavailable() {
        let health = health()
            .with_check(Stub {
                name: "rabbitmq",
                healthy: false,
                critical: true,
            })
            .with_check(Stub {
                name: "cache",
                healthy: false,
                critical: false,
            });

        let report = health.measure().await;

        assert_eq!(report.status, HealthStatus::Unavailable);
        assert_eq!(report.status.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.failures.len(), 2);
    }

    #[tokio::test]
    async fn the_report_is_rendered_as_json() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let mut health = health();
        health.started_at = now - Duration::seconds(90);

        let report = health.measure_at(now).await;

        assert_eq!(
            serde_json::to_value(report).unwrap(),
            serde_json::json!({
                "status": "OK",
                "timestamp": "2024-05-01T12:30:00Z",
                "component": {
                    "name": "usvc-message-consumer - abc123",
                    "version": "1.0.0"
                },
                "system": {
                    "os": std::env::consts::OS,
                    "arch": std::env::consts::ARCH,
                    "pid": std::process::id(),
                    "cpus": available_cpus(),
                    "started_at": "2024-05-01T12:28:30Z",
                    "uptime_seconds": 90
                }
            })
        );
    }

    #[tokio::test]
    async fn uptime_is_never_negative() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let mut health = health();
        health.started_at = now + Duration::seconds(5);

        let report = health.measure_at(now).await;

        assert_eq!(report.system.uptime_seconds, 0);
    }
}
