//! Input checks shared by the registration and vendor endpoints.

/// Basic shape check for an email address: one `@`, a non-empty local part,
/// and a dotted domain made of non-empty labels.
///
/// # Examples
///
/// ```
/// use eventhub_auth::validation::is_valid_email;
///
/// assert!(is_valid_email("user@example.com"));
/// assert!(is_valid_email("user+tag@sub.example.com"));
/// assert!(!is_valid_email("invalid"));
/// assert!(!is_valid_email("@example.com"));
/// assert!(!is_valid_email("user@localhost"));
/// ```
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > 255 {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return false;
    }

    let local_ok = local
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'));
    let domain_ok = domain
        .split('.')
        .all(|label| !label.is_empty() && label.chars().all(|c| c.is_alphanumeric() || c == '-'));

    local_ok && domain_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_addresses() {
        for email in ["a@b@c.com", "a@.com", "a@com.", "sp ace@test.com", "", "a@b"] {
            assert!(!is_valid_email(email), "{email} should be rejected");
        }
    }

    #[test]
    fn accepts_ordinary_addresses() {
        for email in ["v@test.com", "first.last@mail.example.org", "x_y-z@a-b.io"] {
            assert!(is_valid_email(email), "{email} should be accepted");
        }
    }
}
