//! Handlers shared by every service.

pub mod health;
pub mod metrics;

pub use health::{ComponentCheck, HealthResponse, ReadinessReport, health_check};
pub use metrics::render_metrics;
