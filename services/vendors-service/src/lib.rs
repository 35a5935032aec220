//! Vendors service.
//!
//! Owns vendor records. Listens on `user.vendor.registered` and makes sure
//! every registered vendor ends up with exactly one record: a new linked one,
//! or an admin-created placeholder with the same email claimed by the user.
//!
//! - [`config`] - environment configuration
//! - [`sync`] - reconciliation and the sync consumer
//! - [`api`] - vendor CRUD and dead-letter administration
//! - [`server`] - router, state and health checks
//! - [`app`] - wiring and lifecycle of the whole service

pub mod api;
pub mod app;
pub mod config;
pub mod server;
pub mod sync;

pub use app::{StartupError, VendorsApp};
pub use config::Config;
