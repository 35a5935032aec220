//! Role capabilities.
//!
//! One table answers "may this role do this operation, and on which
//! records". Handlers call [`authorize`] once per request and then apply the
//! returned [`Access`] to the record(s) they touch.
//!
//! | Operation          | admin | organizer | vendor | attendee |
//! |--------------------|-------|-----------|--------|----------|
//! | list vendors       | all   | all       | own    | own      |
//! | read vendor        | all   | all       | own    | own      |
//! | create vendor      | all   | all       | deny   | deny     |
//! | update vendor      | all   | all       | own    | deny     |
//! | delete vendor      | all   | deny      | deny   | deny     |
//! | manage dead letters| all   | deny      | deny   | deny     |

use crate::error::{AuthError, Result};
use eventhub_core::identity::Role;
use std::fmt;

/// Operations guarded by the capability table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// List vendor records.
    ListVendors,
    /// Read one vendor record.
    ReadVendor,
    /// Create a placeholder vendor record.
    CreateVendor,
    /// Edit a vendor record.
    UpdateVendor,
    /// Delete a vendor record.
    DeleteVendor,
    /// List, replay or discard parked messages.
    ManageDeadLetters,
}

impl Operation {
    /// Every operation.
    pub const ALL: [Self; 6] = [
        Self::ListVendors,
        Self::ReadVendor,
        Self::CreateVendor,
        Self::UpdateVendor,
        Self::DeleteVendor,
        Self::ManageDeadLetters,
    ];

    /// Stable name used in logs and error messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ListVendors => "vendors:list",
            Self::ReadVendor => "vendors:read",
            Self::CreateVendor => "vendors:create",
            Self::UpdateVendor => "vendors:update",
            Self::DeleteVendor => "vendors:delete",
            Self::ManageDeadLetters => "dead_letters:manage",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scope a role is granted for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Not allowed.
    Deny,
    /// Allowed on records linked to the caller.
    Own,
    /// Allowed on every record.
    All,
}

impl Access {
    /// Whether a record linked to `owner` is in scope for `subject`.
    #[must_use]
    pub fn covers(self, owner: Option<&str>, subject: &str) -> bool {
        match self {
            Self::All => true,
            Self::Own => owner == Some(subject),
            Self::Deny => false,
        }
    }
}

/// The capability table.
#[must_use]
pub const fn capability(role: Role, operation: Operation) -> Access {
    use Access::{All, Deny, Own};
    use Operation::{CreateVendor, DeleteVendor, ListVendors, ManageDeadLetters, ReadVendor, UpdateVendor};

    match (role, operation) {
        (Role::Admin, _) => All,
        (Role::Organizer, ListVendors | ReadVendor | CreateVendor | UpdateVendor) => All,
        (Role::Organizer, DeleteVendor | ManageDeadLetters) => Deny,
        (Role::Vendor, ListVendors | ReadVendor | UpdateVendor) => Own,
        (Role::Vendor, CreateVendor | DeleteVendor | ManageDeadLetters) => Deny,
        (Role::Attendee, ListVendors | ReadVendor) => Own,
        (Role::Attendee, CreateVendor | UpdateVendor | DeleteVendor | ManageDeadLetters) => Deny,
    }
}

/// Look up `role` × `operation`, refusing outright on [`Access::Deny`].
///
/// # Errors
///
/// Returns `AuthError::InsufficientPermissions` when the role has no access.
pub fn authorize(role: Role, operation: Operation) -> Result<Access> {
    match capability(role, operation) {
        Access::Deny => {
            tracing::debug!(role = %role, operation = %operation, "Operation denied");
            Err(AuthError::InsufficientPermissions {
                required: operation.to_string(),
            })
        }
        access => Ok(access),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn admin_has_everything() {
        for op in Operation::ALL {
            assert_eq!(capability(Role::Admin, op), Access::All);
        }
    }

    #[test]
    fn only_admin_deletes_or_manages_dead_letters() {
        for role in [Role::Organizer, Role::Vendor, Role::Attendee] {
            assert!(authorize(role, Operation::DeleteVendor).is_err());
            assert!(authorize(role, Operation::ManageDeadLetters).is_err());
        }
    }

    #[test]
    fn vendor_is_scoped_to_own_record() {
        assert_eq!(authorize(Role::Vendor, Operation::UpdateVendor).unwrap(), Access::Own);
        assert_eq!(authorize(Role::Attendee, Operation::ReadVendor).unwrap(), Access::Own);
        assert_eq!(
            authorize(Role::Attendee, Operation::UpdateVendor).unwrap_err(),
            AuthError::InsufficientPermissions {
                required: "vendors:update".into()
            }
        );
        assert_eq!(authorize(Role::Organizer, Operation::CreateVendor).unwrap(), Access::All);
    }

    #[test]
    fn placeholders_are_nobodys_own() {
        assert!(!Access::Own.covers(None, "42"));
        assert!(Access::All.covers(None, "42"));
    }

    proptest! {
        #[test]
        fn own_covers_exactly_the_subject(owner in 1_i64..100, subject in 1_i64..100) {
            let owner = owner.to_string();
            let subject = subject.to_string();
            prop_assert_eq!(Access::Own.covers(Some(&owner), &subject), owner == subject);
            prop_assert!(!Access::Deny.covers(Some(&owner), &subject));
        }
    }
}
