//! Auth service.
//!
//! Owns users and credentials. Registering with the `vendor` role announces
//! the new user on `user.vendor.registered`, where the vendors service picks
//! it up; the two services never call each other.
//!
//! - [`config`] - environment configuration
//! - [`registration`] - registration service, event publisher, outbox relay
//! - [`api`] - HTTP handlers
//! - [`server`] - router, state and health checks
//! - [`app`] - wiring and lifecycle of the whole service

pub mod api;
pub mod app;
pub mod config;
pub mod registration;
pub mod server;

pub use app::{AuthApp, StartupError};
pub use config::Config;
