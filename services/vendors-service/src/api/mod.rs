//! HTTP handlers.
//!
//! Every handler except `ping` takes a [`CurrentUser`](eventhub_web::CurrentUser)
//! and resolves the caller's scope through [`eventhub_auth::authorize`] before
//! touching a store.

pub mod dead_letters;
pub mod vendors;
