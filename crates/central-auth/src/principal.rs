//! Principal records.
//!
//! A [`Principal`] is an account that can authenticate: an administrator or
//! a client. Its `last_password_change` timestamp is the generation marker
//! every issued token is bound to.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// The kind of account a principal represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// Staff account used for the admin console.
    Administrator,
    /// End-user account authenticating through the API.
    Client,
}

/// Fields that can be persisted individually through
/// [`PrincipalStore::save`](crate::store::PrincipalStore::save).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrincipalField {
    Email,
    FirstName,
    LastName,
    Password,
    IsActive,
    LastLogin,
    LastPasswordChange,
}

/// An account that can authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Store-assigned identifier. Zero until the principal is inserted.
    pub id: i64,
    pub kind: PrincipalKind,
    /// Normalized login identifier, unique per store.
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Encoded password hash. Empty or `!`-prefixed values never verify.
    pub password: String,
    /// Inactive principals are rejected by every status-checking operation.
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    /// When the password was last set. `None` if never recorded.
    pub last_password_change: Option<DateTime<Utc>>,
}

impl Principal {
    /// Creates an active principal with an unusable password.
    pub fn new(kind: PrincipalKind, email: &str) -> Self {
        Self {
            id: 0,
            kind,
            email: normalize_email(email),
            first_name: String::new(),
            last_name: String::new(),
            password: String::new(),
            is_active: true,
            last_login: None,
            last_password_change: None,
        }
    }

    /// Sets first and last name.
    #[must_use]
    pub fn with_names(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    /// Returns the password generation marker embedded in tokens.
    ///
    /// RFC 3339 with microseconds and a `Z` suffix, or the empty string when
    /// no password change was ever recorded.
    pub fn generation(&self) -> String {
        self.last_password_change
            .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Micros, true))
            .unwrap_or_default()
    }

    /// Returns "first last", trimmed.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    /// Looks up a textual attribute by name, for attribute similarity checks.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            "email" => Some(&self.email),
            "first_name" => Some(&self.first_name),
            "last_name" => Some(&self.last_name),
            _ => None,
        }
    }
}

/// Normalizes an email address for lookup and storage.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_new_principal_defaults() {
        let p = Principal::new(PrincipalKind::Client, "  Alice@Example.COM ");
        assert_eq!(p.email, "alice@example.com");
        assert!(p.is_active);
        assert!(p.password.is_empty());
        assert_eq!(p.generation(), "");
    }

    #[test]
    fn test_generation_format() {
        let mut p = Principal::new(PrincipalKind::Client, "a@x.com");
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
            + chrono::Duration::microseconds(42);
        p.last_password_change = Some(ts);
        assert_eq!(p.generation(), "2024-03-01T12:30:00.000042Z");
    }

    #[test]
    fn test_full_name() {
        let p = Principal::new(PrincipalKind::Administrator, "a@x.com").with_names("Ada", "Lovelace");
        assert_eq!(p.full_name(), "Ada Lovelace");
        let p = Principal::new(PrincipalKind::Administrator, "a@x.com").with_names("Ada", "");
        assert_eq!(p.full_name(), "Ada");
    }

    #[test]
    fn test_attribute_lookup() {
        let p = Principal::new(PrincipalKind::Client, "a@x.com").with_names("Ada", "L");
        assert_eq!(p.attribute("email"), Some("a@x.com"));
        assert_eq!(p.attribute("first_name"), Some("Ada"));
        assert_eq!(p.attribute("password"), None);
    }

    #[test]
    fn test_serde_kind_snake_case() {
        let json = serde_json::to_string(&PrincipalKind::Administrator).unwrap();
        assert_eq!(json, "\"administrator\"");
    }
}
