//! User records as seen by the engine.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A user of a tenant/realm.
///
/// The engine only reads users: flows bind them to sessions and the issuance
/// manager maps their attributes into token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable user id, used as the `sub` claim.
    pub id: String,

    /// Owning tenant.
    pub tenant: String,

    /// Owning realm.
    pub realm: String,

    /// Login name.
    pub username: String,

    /// Primary email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the email address has been verified.
    #[serde(default)]
    pub email_verified: bool,

    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Whether the phone number has been verified.
    #[serde(default)]
    pub phone_verified: bool,

    /// Group memberships.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    /// Assigned roles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    /// Disabled users cannot be issued new tokens.
    #[serde(default)]
    pub disabled: bool,

    /// When the user was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// Creates a minimal enabled user.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        tenant: impl Into<String>,
        realm: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            tenant: tenant.into(),
            realm: realm.into(),
            username: username.into(),
            email: None,
            email_verified: false,
            given_name: None,
            family_name: None,
            phone: None,
            phone_verified: false,
            groups: Vec::new(),
            roles: Vec::new(),
            disabled: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Full display name built from given and family names.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        match (&self.given_name, &self.family_name) {
            (Some(given), Some(family)) => Some(format!("{given} {family}")),
            (Some(given), None) => Some(given.clone()),
            (None, Some(family)) => Some(family.clone()),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        let mut user = User::new("u1", "acme", "staff", "alice");
        assert_eq!(user.display_name(), None);

        user.given_name = Some("Alice".into());
        assert_eq!(user.display_name().as_deref(), Some("Alice"));

        user.family_name = Some("Liddell".into());
        assert_eq!(user.display_name().as_deref(), Some("Alice Liddell"));
    }
}
