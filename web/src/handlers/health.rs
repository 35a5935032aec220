//! Health check endpoints.
//!
//! `/health` answers as long as the process serves HTTP. `/ready` is built by
//! each service from a [`ReadinessReport`] listing its dependencies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Liveness body: `{"status":"ok","service":"<name>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Service name.
    pub service: &'static str,
}

/// Liveness response for `service`.
///
/// Does not check dependencies.
#[must_use]
pub fn health_check(service: &'static str) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service,
    })
}

/// State of one dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentCheck {
    /// Dependency name (`database`, `vendor_sync`, ...).
    pub name: &'static str,
    /// Whether the dependency is usable.
    pub healthy: bool,
    /// State or error text.
    pub detail: String,
}

/// Readiness of a service: ready when every component is healthy.
///
/// Renders 200 when ready and 503 otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    /// Service name.
    pub service: &'static str,
    /// Whether every component is healthy.
    pub ready: bool,
    /// Individual checks.
    pub checks: Vec<ComponentCheck>,
}

impl ReadinessReport {
    /// An empty, ready report.
    #[must_use]
    pub const fn new(service: &'static str) -> Self {
        Self {
            service,
            ready: true,
            checks: Vec::new(),
        }
    }

    /// Add a check.
    #[must_use]
    pub fn check(mut self, name: &'static str, healthy: bool, detail: impl Into<String>) -> Self {
        self.ready &= healthy;
        self.checks.push(ComponentCheck {
            name,
            healthy,
            detail: detail.into(),
        });
        self
    }
}

impl IntoResponse for ReadinessReport {
    fn into_response(self) -> Response {
        let status = if self.ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_names_the_service() {
        let Json(body) = health_check("vendors");
        assert_eq!(
            body,
            HealthResponse {
                status: "ok",
                service: "vendors"
            }
        );
    }

    #[test]
    fn one_unhealthy_check_fails_readiness() {
        let report = ReadinessReport::new("vendors")
            .check("database", true, "ok")
            .check("vendor_sync", false, "stopped");
        assert!(!report.ready);
        assert_eq!(report.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let report = ReadinessReport::new("auth").check("database", true, "ok");
        assert_eq!(report.into_response().status(), StatusCode::OK);
    }
}
