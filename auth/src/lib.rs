//! # Eventhub Auth
//!
//! Authentication and authorization primitives for the eventhub services.
//!
//! - [`token`]: HS256 access tokens carrying `sub`, `email`, `role`
//! - [`password`]: Argon2id hashing
//! - [`authz`]: the role × operation capability table
//! - [`validation`]: input shape checks
//!
//! The identity service issues tokens; the vendors service only verifies
//! them with the same shared secret.
//!
//! ## Example
//!
//! ```
//! use eventhub_auth::authz::{Access, Operation, authorize};
//! use eventhub_core::identity::Role;
//!
//! let access = authorize(Role::Vendor, Operation::ReadVendor).unwrap();
//! assert_eq!(access, Access::Own);
//! assert!(authorize(Role::Vendor, Operation::DeleteVendor).is_err());
//! ```

pub mod authz;
pub mod error;
pub mod password;
pub mod token;
pub mod validation;

pub use authz::{Access, Operation, authorize};
pub use error::{AuthError, Result};
pub use token::{Claims, JwtKeys};
