//! Liveness reporting for the consumer loops.
//!
//! Each loop registers under a name with a heartbeat interval and reports
//! over a channel. `/_liveness` is green only while every registered loop has
//! a heartbeat that has not yet expired.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parking_lot::RwLock;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::warn;

const REPORT_BUFFER: usize = 16;

#[derive(Default, Debug)]
pub struct HealthStatus {
    pub healthy: bool,
    pub components: HashMap<String, ComponentStatus>,
}

impl IntoResponse for HealthStatus {
    fn into_response(self) -> Response {
        let code = if self.healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (code, format!("{self:?}")).into_response()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ComponentStatus {
    /// No heartbeat yet.
    Starting,
    HealthyUntil(OffsetDateTime),
    Unhealthy,
    /// Heartbeat expired.
    Stalled,
}

impl ComponentStatus {
    /// The status as seen at `now`; an expired heartbeat reads as stalled.
    fn at(&self, now: OffsetDateTime) -> Self {
        match self {
            Self::HealthyUntil(until) if *until <= now => Self::Stalled,
            other => other.clone(),
        }
    }

    fn is_healthy(&self) -> bool {
        matches!(self, Self::HealthyUntil(_))
    }
}

struct Report {
    component: String,
    status: ComponentStatus,
}

/// Reporting side given to one consumer loop.
#[derive(Clone)]
pub struct HealthHandle {
    component: String,
    interval: Duration,
    reports: mpsc::Sender<Report>,
}

impl HealthHandle {
    /// Extends the heartbeat by one interval from now.
    pub async fn report_healthy(&self) {
        let until = OffsetDateTime::now_utc() + self.interval;
        self.report_status(ComponentStatus::HealthyUntil(until)).await
    }

    pub async fn report_status(&self, status: ComponentStatus) {
        let report = Report {
            component: self.component.clone(),
            status,
        };
        if let Err(err) = self.reports.send(report).await {
            warn!(component = %self.component, error = %err, "Dropped health report");
        }
    }
}

#[derive(Clone)]
pub struct HealthRegistry {
    name: String,
    statuses: Arc<RwLock<HashMap<String, ComponentStatus>>>,
    reports: mpsc::Sender<Report>,
}

impl HealthRegistry {
    /// Spawns the task that applies reports, so it needs a tokio runtime.
    pub fn new(name: &str) -> Self {
        let (reports, mut incoming) = mpsc::channel::<Report>(REPORT_BUFFER);
        let statuses: Arc<RwLock<HashMap<String, ComponentStatus>>> = Default::default();

        let applied = statuses.clone();
        tokio::spawn(async move {
            while let Some(Report { component, status }) = incoming.recv().await {
                applied.write().insert(component, status);
            }
        });

        Self {
            name: name.to_owned(),
            statuses,
            reports,
        }
    }

    pub async fn register(&self, component: String, interval: Duration) -> HealthHandle {
        let handle = HealthHandle {
            component,
            interval,
            reports: self.reports.clone(),
        };
        handle.report_status(ComponentStatus::Starting).await;
        handle
    }

    /// Snapshot of every component. An empty registry is not healthy.
    pub fn get_status(&self) -> HealthStatus {
        let now = OffsetDateTime::now_utc();
        let components: HashMap<String, ComponentStatus> = self
            .statuses
            .read()
            .iter()
            .map(|(name, status)| (name.clone(), status.at(now)))
            .collect();
        let healthy =
            !components.is_empty() && components.values().all(ComponentStatus::is_healthy);

        if !healthy {
            warn!(registry = %self.name, components = ?components, "Health check failed");
        }
        HealthStatus {
            healthy,
            components,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ops::Sub;

    use super::*;

    async fn assert_or_retry<F>(check: F)
    where
        F: Fn() -> bool,
    {
        let deadline = OffsetDateTime::now_utc() + Duration::from_secs(5);
        while !check() && OffsetDateTime::now_utc() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(check())
    }

    #[tokio::test]
    async fn defaults_to_unhealthy() {
        let registry = HealthRegistry::new("liveness");
        assert!(!registry.get_status().healthy);
    }

    #[tokio::test]
    async fn component_lifecycle() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry
            .register("analytics".to_string(), Duration::from_secs(30))
            .await;
        assert_or_retry(|| registry.get_status().components.len() == 1).await;
        assert_eq!(
            registry.get_status().components.get("analytics"),
            Some(&ComponentStatus::Starting)
        );

        handle.report_healthy().await;
        assert_or_retry(|| registry.get_status().healthy).await;

        handle.report_status(ComponentStatus::Unhealthy).await;
        assert_or_retry(|| !registry.get_status().healthy).await;
    }

    #[tokio::test]
    async fn missed_deadline_is_stalled() {
        let registry = HealthRegistry::new("liveness");
        let handle = registry
            .register("analytics".to_string(), Duration::from_secs(30))
            .await;
        handle
            .report_status(ComponentStatus::HealthyUntil(
                OffsetDateTime::now_utc().sub(Duration::from_secs(1)),
            ))
            .await;
        assert_or_retry(|| {
            registry.get_status().components.get("analytics") == Some(&ComponentStatus::Stalled)
        })
        .await;
        assert!(!registry.get_status().healthy);
    }

    #[tokio::test]
    async fn one_stalled_component_fails_liveness() {
        let registry = HealthRegistry::new("liveness");
        let analytics = registry
            .register("analytics".to_string(), Duration::from_secs(30))
            .await;
        let service = registry
            .register("service".to_string(), Duration::from_secs(30))
            .await;

        analytics.report_healthy().await;
        assert_or_retry(|| {
            registry.get_status().components.get("analytics") != Some(&ComponentStatus::Starting)
        })
        .await;
        assert!(!registry.get_status().healthy);

        service.report_healthy().await;
        assert_or_retry(|| registry.get_status().healthy).await;
    }

    #[tokio::test]
    async fn unhealthy_maps_to_503() {
        let response = HealthStatus::default().into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = HealthStatus {
            healthy: true,
            components: HashMap::new(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
