//! Account forms: login, token check, password change and recovery.
//!
//! Each form is deserialized from a request body, cleans its fields
//! (required, trimmed, length-limited) and then runs one flow against an
//! [`AuthCore`]. Field problems surface as a [`ValidationError`] keyed by
//! input name so every message can be shown next to its input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use central_core::error::{CentralError, CentralResult, ValidationError};
use central_core::logging::AUTH_TARGET;
use central_core::mail::{DeliveryMode, EmailDispatcher};

use crate::principal::Principal;
use crate::service::{AuthCore, AuthenticateOptions};

pub const EMAIL_MAX_LENGTH: usize = 250;
pub const PASSWORD_MAX_LENGTH: usize = 250;
pub const TOKEN_MAX_LENGTH: usize = 2048;

pub const OLD_PASSWORD_INVALID: &str = "Old password is invalid";
pub const PASSWORD_UNCHANGED: &str = "New password must be different from old password.";

pub const RECOVERY_EMAIL_SUBJECT: &str = "Password Recovery";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").expect("valid regex")
});

/// Plain text body of the recovery email.
pub fn recovery_email_text(token: &str) -> String {
    format!(
        "\nPlease use the below token on the password recovery form. \
         If you did not request this, ignore this email.\n\n{token}\n"
    )
}

/// HTML body of the recovery email. `token` is a JWS and needs no escaping.
pub fn recovery_email_html(token: &str) -> String {
    format!(
        "<html><body>\n<p>Please use the below token on the password recovery form. \
         <span style='color:red'>If you did not request this, ignore this email.</span></p><br/>\n\
         <b>{token}</b>\n</body></html>\n"
    )
}

/// Public profile returned by the login and token flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserData {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub token: String,
}

impl UserData {
    fn new(principal: &Principal, token: String) -> Self {
        Self {
            id: principal.id,
            email: principal.email.clone(),
            first_name: principal.first_name.clone(),
            last_name: principal.last_name.clone(),
            token,
        }
    }
}

/// Collects field errors while cleaning raw inputs.
#[derive(Default)]
struct Cleaner {
    errors: ValidationError,
}

impl Cleaner {
    /// A required, whitespace-trimmed text input of at most `max_length`
    /// characters.
    fn char_field(&mut self, name: &str, raw: Option<&str>, max_length: usize) -> String {
        let value = raw.map(str::trim).unwrap_or_default();
        if value.is_empty() {
            self.errors.add_field_error(name, "This field is required.");
            return String::new();
        }
        if value.chars().count() > max_length {
            self.errors.add_field_error(
                name,
                format!("Ensure this field has no more than {max_length} characters."),
            );
        }
        value.to_string()
    }

    fn email_field(&mut self, name: &str, raw: Option<&str>) -> String {
        let value = self.char_field(name, raw, EMAIL_MAX_LENGTH);
        if !value.is_empty() && !EMAIL_RE.is_match(&value) {
            self.errors.add_field_error(name, "Enter a valid email address.");
        }
        value
    }

    fn finish(self) -> CentralResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors.into())
        }
    }
}

/// Re-keys a policy failure under `field`; other errors pass through.
fn policy_error_for(field: &str, err: CentralError) -> CentralError {
    match err {
        CentralError::ValidationError(e) => e.into_field(field).into(),
        other => other,
    }
}

// ── Login ────────────────────────────────────────────────────────────

/// Email and password login.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsForm {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl CredentialsForm {
    /// Authenticates, records the login time and issues a session token.
    /// Locked principals are rejected.
    pub async fn login(&self, core: &AuthCore) -> CentralResult<UserData> {
        let mut cleaner = Cleaner::default();
        let email = cleaner.char_field("email", self.email.as_deref(), EMAIL_MAX_LENGTH);
        let password = cleaner.char_field("password", self.password.as_deref(), PASSWORD_MAX_LENGTH);
        cleaner.finish()?;

        let options = AuthenticateOptions {
            check_active: true,
            touch_last_login: true,
        };
        let principal = core.authenticate(&email, &password, options).await?;
        let token = core.issue_default_session_token(&principal)?;
        Ok(UserData::new(&principal, token))
    }
}

/// Session token check.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenForm {
    pub token: Option<String>,
}

impl TokenForm {
    /// Validates the token for an active principal and echoes it back with
    /// the profile.
    pub async fn authenticate(&self, core: &AuthCore) -> CentralResult<UserData> {
        let mut cleaner = Cleaner::default();
        let token = cleaner.char_field("token", self.token.as_deref(), TOKEN_MAX_LENGTH);
        cleaner.finish()?;

        let (principal, _) = core.validate_session_token(&token, true).await?;
        Ok(UserData::new(&principal, token))
    }
}

// ── Password change ──────────────────────────────────────────────────

/// Password change by an authenticated principal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PasswordChangeForm {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

impl PasswordChangeForm {
    /// Changes the password of `principal` and returns a fresh session
    /// token. Every token issued before is revoked.
    pub async fn save(&self, core: &AuthCore, principal: &mut Principal) -> CentralResult<String> {
        let mut cleaner = Cleaner::default();
        let old_password =
            cleaner.char_field("old_password", self.old_password.as_deref(), PASSWORD_MAX_LENGTH);
        let new_password =
            cleaner.char_field("new_password", self.new_password.as_deref(), PASSWORD_MAX_LENGTH);
        cleaner.finish()?;

        if !core.check_password(principal, &old_password).await? {
            return Err(ValidationError::for_field("old_password", OLD_PASSWORD_INVALID).into());
        }
        core.validate_new_password(principal, &new_password)
            .map_err(|e| policy_error_for("new_password", e))?;
        if old_password == new_password {
            return Err(ValidationError::for_field("new_password", PASSWORD_UNCHANGED).into());
        }

        core.set_password(principal, &new_password).await?;
        core.issue_default_session_token(principal)
    }
}

// ── Recovery ─────────────────────────────────────────────────────────

/// Request for a password recovery email.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PasswordRecoveryRequestForm {
    pub email: Option<String>,
}

impl PasswordRecoveryRequestForm {
    /// Queues a recovery email when the address belongs to a principal.
    ///
    /// Unknown addresses succeed without sending anything, so the response
    /// never reveals which emails are registered.
    pub async fn save(&self, core: &AuthCore, mailer: &EmailDispatcher) -> CentralResult<()> {
        let mut cleaner = Cleaner::default();
        let email = cleaner.email_field("email", self.email.as_deref());
        cleaner.finish()?;

        let Some(principal) = core.find_principal_by_email(&email).await? else {
            tracing::info!(target: AUTH_TARGET, "Password recovery requested for unknown email.");
            return Ok(());
        };

        let token = core.issue_password_recovery_token(&principal)?;
        let message = mailer.compose(
            RECOVERY_EMAIL_SUBJECT,
            &recovery_email_text(&token),
            Some(&recovery_email_html(&token)),
            vec![principal.email.clone()],
        );
        tracing::info!(target: AUTH_TARGET, principal = principal.id, "Password recovery email queued.");
        mailer.send(message, DeliveryMode::Background).await
    }
}

/// Password reset with a recovery token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecoveryPasswordChangeForm {
    pub token: Option<String>,
    pub password: Option<String>,
}

impl RecoveryPasswordChangeForm {
    /// Sets a new password for the principal the token was issued to. The
    /// token, and every session token, stops validating afterwards.
    pub async fn save(&self, core: &AuthCore) -> CentralResult<Principal> {
        let mut cleaner = Cleaner::default();
        let token = cleaner.char_field("token", self.token.as_deref(), TOKEN_MAX_LENGTH);
        let password = cleaner.char_field("password", self.password.as_deref(), PASSWORD_MAX_LENGTH);
        cleaner.finish()?;

        let mut principal = core.validate_recovery_token(&token).await?;
        core.validate_new_password(&principal, &password)
            .map_err(|e| policy_error_for("password", e))?;
        core.set_password(&mut principal, &password).await?;
        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_errors(err: CentralError) -> ValidationError {
        match err {
            CentralError::ValidationError(e) => e,
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn test_char_field_required_and_trimmed() {
        let mut cleaner = Cleaner::default();
        assert_eq!(cleaner.char_field("a", Some("  x  "), 10), "x");
        cleaner.char_field("b", None, 10);
        cleaner.char_field("c", Some("   "), 10);
        let errors = field_errors(cleaner.finish().unwrap_err());
        assert!(errors.field("a").is_none());
        assert_eq!(errors.field("b").unwrap(), ["This field is required."]);
        assert_eq!(errors.field("c").unwrap(), ["This field is required."]);
    }

    #[test]
    fn test_char_field_max_length_counts_chars() {
        let mut cleaner = Cleaner::default();
        cleaner.char_field("ok", Some("ééé"), 3);
        cleaner.char_field("long", Some("abcd"), 3);
        let errors = field_errors(cleaner.finish().unwrap_err());
        assert!(errors.field("ok").is_none());
        assert_eq!(
            errors.field("long").unwrap(),
            ["Ensure this field has no more than 3 characters."]
        );
    }

    #[test]
    fn test_email_field() {
        let mut cleaner = Cleaner::default();
        cleaner.email_field("good", Some("user@example.com"));
        cleaner.email_field("bad", Some("not-an-email"));
        let errors = field_errors(cleaner.finish().unwrap_err());
        assert!(errors.field("good").is_none());
        assert_eq!(errors.field("bad").unwrap(), ["Enter a valid email address."]);
    }

    #[test]
    fn test_recovery_email_bodies() {
        let text = recovery_email_text("abc.def.ghi");
        assert!(text.contains("If you did not request this, ignore this email.\n\nabc.def.ghi"));
        let html = recovery_email_html("abc.def.ghi");
        assert!(html.contains("<span style='color:red'>"));
        assert!(html.contains("<b>abc.def.ghi</b>"));
    }

    #[test]
    fn test_policy_error_rekeyed() {
        let err = policy_error_for(
            "password",
            ValidationError::from_messages(vec!["one".into(), "two".into()]).into(),
        );
        assert_eq!(field_errors(err).field("password").unwrap(), ["one", "two"]);

        let err = policy_error_for("password", CentralError::DatabaseError("down".into()));
        assert!(matches!(err, CentralError::DatabaseError(_)));
    }

    #[test]
    fn test_forms_deserialize_partial_bodies() {
        let form: CredentialsForm = serde_json::from_str(r#"{"email": "a@b.co"}"#).unwrap();
        assert_eq!(form.email.as_deref(), Some("a@b.co"));
        assert!(form.password.is_none());
    }
}
