//! Runtime settings for central.
//!
//! A [`Settings`] value is built once at startup (see
//! [`settings_loader`](crate::settings_loader)) and handed to the components
//! that need it. Nothing reads settings from a global.

use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{CentralError, CentralResult};

/// Password policy configuration, mirroring the validators applied to every
/// new password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordPolicySettings {
    /// Minimum number of characters.
    pub min_length: usize,
    /// Principal attributes a password must not resemble (e.g. "email").
    pub user_attributes: Vec<String>,
    /// Maximum similarity ratio tolerated against an attribute.
    pub max_similarity: f64,
    /// Whether to reject passwords from the common-password list.
    pub reject_common: bool,
    /// Whether to reject passwords made only of digits.
    pub reject_numeric: bool,
}

impl Default for PasswordPolicySettings {
    fn default() -> Self {
        Self {
            min_length: 6,
            user_attributes: vec!["email".to_string()],
            max_similarity: 0.7,
            reject_common: true,
            reject_numeric: true,
        }
    }
}

/// Longest accepted token lifetime: ten years, in minutes.
pub const MAX_TOKEN_LIFETIME_MINS: i64 = 10 * 365 * 24 * 60;

/// Longest accepted token cache timeout: one day, in seconds.
pub const MAX_TOKEN_CACHE_TIMEOUT_SECS: u64 = 24 * 60 * 60;

/// Central configuration.
///
/// # Examples
///
/// ```
/// use central_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.token_expiration_mins, 360);
/// assert_eq!(settings.password_recovery_token_expiration_mins, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled.
    pub debug: bool,
    /// The log filter directive (e.g. "info", "central=debug").
    pub log_level: String,

    // ── Tokens ───────────────────────────────────────────────────────

    /// Secret used to sign session tokens.
    pub secret_key: String,
    /// Secret used to sign password recovery tokens. Must differ from `secret_key`.
    pub reset_token_secret_key: String,
    /// Default session token lifetime in minutes.
    pub token_expiration_mins: i64,
    /// Recovery token lifetime in minutes.
    pub password_recovery_token_expiration_mins: i64,
    /// How long a validated session token is cached, in seconds.
    pub token_cache_timeout_secs: u64,
    /// Token cache backend name: "locmem" or "dummy" (no caching).
    pub cache_backend: String,

    // ── Passwords ────────────────────────────────────────────────────

    /// Hasher algorithms in order of preference. The first one hashes new passwords.
    pub password_hashers: Vec<String>,
    /// Policy applied to new passwords.
    pub password_policy: PasswordPolicySettings,

    // ── Email ────────────────────────────────────────────────────────

    /// Email backend name: "console" or "locmem".
    pub email_backend: String,
    /// Sender address used when a message does not name one.
    pub default_from_email: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),

            secret_key: String::new(),
            reset_token_secret_key: String::new(),
            token_expiration_mins: 360,
            password_recovery_token_expiration_mins: 10,
            token_cache_timeout_secs: 15,
            cache_backend: "locmem".to_string(),

            password_hashers: vec![
                "argon2".to_string(),
                "bcrypt".to_string(),
                "pbkdf2_sha256".to_string(),
            ],
            password_policy: PasswordPolicySettings::default(),

            email_backend: "console".to_string(),
            default_from_email: "webmaster@localhost".to_string(),
        }
    }
}

impl Settings {
    /// Checks that the settings can back a running auth core.
    ///
    /// Both signing secrets must be set and must differ, and every lifetime
    /// must be positive.
    pub fn validate(&self) -> CentralResult<()> {
        if self.secret_key.is_empty() {
            return Err(CentralError::ConfigurationError(
                "secret_key must not be empty".to_string(),
            ));
        }
        if self.reset_token_secret_key.is_empty() {
            return Err(CentralError::ConfigurationError(
                "reset_token_secret_key must not be empty".to_string(),
            ));
        }
        if self.secret_key == self.reset_token_secret_key {
            return Err(CentralError::ConfigurationError(
                "secret_key and reset_token_secret_key must differ".to_string(),
            ));
        }
        let lifetimes = [
            self.token_expiration_mins,
            self.password_recovery_token_expiration_mins,
        ];
        if lifetimes.iter().any(|&mins| mins <= 0 || mins > MAX_TOKEN_LIFETIME_MINS) {
            return Err(CentralError::ConfigurationError(format!(
                "token lifetimes must be between 1 and {MAX_TOKEN_LIFETIME_MINS} minutes"
            )));
        }
        if self.token_cache_timeout_secs > MAX_TOKEN_CACHE_TIMEOUT_SECS {
            return Err(CentralError::ConfigurationError(format!(
                "token_cache_timeout_secs must not exceed {MAX_TOKEN_CACHE_TIMEOUT_SECS}"
            )));
        }
        if self.password_hashers.is_empty() {
            return Err(CentralError::ConfigurationError(
                "password_hashers must name at least one algorithm".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.password_policy.max_similarity) {
            return Err(CentralError::ConfigurationError(
                "password_policy.max_similarity must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Generates a random signing secret: `length` random bytes, base64 encoded.
pub fn generate_secret_key(length: usize) -> String {
    let mut bytes = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
