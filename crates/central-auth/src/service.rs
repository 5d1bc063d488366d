//! The authentication core.
//!
//! [`AuthCore`] verifies credentials, issues and validates session tokens,
//! and runs the password change and recovery lifecycle. It keeps no mutable
//! state of its own: every check is recomputed from the principal store and
//! the token presented.
//!
//! Tokens are bound to the principal's password generation marker
//! ([`Principal::generation`]). Setting a password moves the marker, which
//! invalidates every token issued before.

use std::sync::Arc;

use chrono::{DateTime, Duration, SubsecRound, Utc};

use central_core::error::{CentralError, CentralResult};
use central_core::logging::AUTH_TARGET;
use central_core::settings::Settings;

use crate::hashers::PasswordHashers;
use crate::password_validation::PasswordValidators;
use crate::principal::{normalize_email, Principal, PrincipalField, PrincipalKind};
use crate::store::PrincipalStore;
use crate::tokens::{expiry_in, BoundClaims, RecoveryClaims, SessionClaims, TokenError, TokenSigner};

pub const INVALID_CREDENTIALS: &str = "Invalid credentials.";
pub const USER_LOCKED: &str = "User Locked.";
pub const INVALID_USER_TOKEN: &str = "Invalid user token.";
pub const INVALID_RECOVERY_TOKEN: &str = "Password recovery token is invalid.";

/// Options for [`AuthCore::authenticate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticateOptions {
    /// Reject inactive principals with [`USER_LOCKED`].
    pub check_active: bool,
    /// Record the login time on success.
    pub touch_last_login: bool,
}

impl Default for AuthenticateOptions {
    fn default() -> Self {
        Self {
            check_active: true,
            touch_last_login: false,
        }
    }
}

/// Credential and token operations over a [`PrincipalStore`].
#[derive(Clone)]
pub struct AuthCore {
    store: Arc<dyn PrincipalStore>,
    hashers: PasswordHashers,
    validators: PasswordValidators,
    session_signer: TokenSigner,
    recovery_signer: TokenSigner,
    token_expiration_mins: i64,
    recovery_expiration_mins: i64,
}

impl std::fmt::Debug for AuthCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCore")
            .field("hashers", &self.hashers)
            .field("validators", &self.validators)
            .field("token_expiration_mins", &self.token_expiration_mins)
            .field("recovery_expiration_mins", &self.recovery_expiration_mins)
            .finish_non_exhaustive()
    }
}

fn invalid_credentials() -> CentralError {
    CentralError::AuthenticationFailed(INVALID_CREDENTIALS.to_string())
}

fn user_locked() -> CentralError {
    CentralError::AuthenticationFailed(USER_LOCKED.to_string())
}

fn invalid_user_token() -> CentralError {
    CentralError::AuthenticationFailed(INVALID_USER_TOKEN.to_string())
}

fn invalid_recovery_token() -> CentralError {
    CentralError::PermissionDenied(INVALID_RECOVERY_TOKEN.to_string())
}

fn signing_error(e: TokenError) -> CentralError {
    CentralError::SigningError(e.to_string())
}

/// The next generation marker: now at microsecond precision, strictly after
/// `previous`.
fn next_generation(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(6);
    match previous {
        Some(prev) if prev >= now => prev.trunc_subsecs(6) + Duration::microseconds(1),
        _ => now,
    }
}

impl AuthCore {
    /// Builds a core from validated settings.
    ///
    /// Fails with [`CentralError::ConfigurationError`] when the secrets are
    /// missing or shared, or a hasher name is unknown.
    pub fn from_settings(store: Arc<dyn PrincipalStore>, settings: &Settings) -> CentralResult<Self> {
        let hashers = PasswordHashers::from_names(&settings.password_hashers)?;
        let validators = PasswordValidators::from_settings(&settings.password_policy);
        Self::new(store, hashers, validators, settings)
    }

    /// Builds a core from explicit collaborators. Only the secrets and
    /// lifetimes are read from `settings`.
    pub fn new(
        store: Arc<dyn PrincipalStore>,
        hashers: PasswordHashers,
        validators: PasswordValidators,
        settings: &Settings,
    ) -> CentralResult<Self> {
        settings.validate()?;
        Ok(Self {
            store,
            hashers,
            validators,
            session_signer: TokenSigner::new(settings.secret_key.as_bytes()),
            recovery_signer: TokenSigner::new(settings.reset_token_secret_key.as_bytes()),
            token_expiration_mins: settings.token_expiration_mins,
            recovery_expiration_mins: settings.password_recovery_token_expiration_mins,
        })
    }

    /// Replaces the hasher registry.
    #[must_use]
    pub fn with_hashers(mut self, hashers: PasswordHashers) -> Self {
        self.hashers = hashers;
        self
    }

    /// Replaces the password policy.
    #[must_use]
    pub fn with_validators(mut self, validators: PasswordValidators) -> Self {
        self.validators = validators;
        self
    }

    /// Mutable access to the policy, to register extra rules.
    pub fn validators_mut(&mut self) -> &mut PasswordValidators {
        &mut self.validators
    }

    /// Default session token lifetime in minutes.
    pub const fn token_expiration_mins(&self) -> i64 {
        self.token_expiration_mins
    }

    /// Looks up a principal by email without any credential check.
    pub async fn find_principal_by_email(&self, email: &str) -> CentralResult<Option<Principal>> {
        self.store.find_by_email(&normalize_email(email)).await
    }

    // ── Credentials ──────────────────────────────────────────────────

    /// Verifies an email and password pair.
    ///
    /// An unknown email and a wrong password fail identically with
    /// [`INVALID_CREDENTIALS`]. With `check_active`, an inactive principal
    /// fails with [`USER_LOCKED`].
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
        options: AuthenticateOptions,
    ) -> CentralResult<Principal> {
        let email = normalize_email(email);

        let Some(mut principal) = self.store.find_by_email(&email).await? else {
            self.hashers.harden_runtime(password).await;
            tracing::warn!(target: AUTH_TARGET, email = %email, "Failed login.");
            return Err(invalid_credentials());
        };

        if !self.hashers.check_password(password, &principal.password).await? {
            if principal.kind == PrincipalKind::Administrator {
                tracing::warn!(target: AUTH_TARGET, email = %email, "Failed admin login.");
            } else {
                tracing::warn!(target: AUTH_TARGET, email = %email, "Failed login.");
            }
            return Err(invalid_credentials());
        }

        if options.check_active && !principal.is_active {
            tracing::warn!(target: AUTH_TARGET, email = %email, "Login attempt on locked account.");
            return Err(user_locked());
        }

        if self.hashers.must_update(&principal.password) {
            self.upgrade_hash(&mut principal, password).await;
        }

        if options.touch_last_login {
            principal.last_login = Some(Utc::now());
            if let Err(e) = self.store.save(&principal, &[PrincipalField::LastLogin]).await {
                tracing::warn!(target: AUTH_TARGET, principal = principal.id, error = %e, "Could not record last login.");
            }
        }

        Ok(principal)
    }

    /// Re-encodes a verified password with the preferred hasher. The
    /// generation marker is left alone, so issued tokens stay valid.
    async fn upgrade_hash(&self, principal: &mut Principal, password: &str) {
        let encoded = match self.hashers.make_password(password).await {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(target: AUTH_TARGET, principal = principal.id, error = %e, "Password rehash failed.");
                return;
            }
        };
        let previous = std::mem::replace(&mut principal.password, encoded);
        if let Err(e) = self.store.save(principal, &[PrincipalField::Password]).await {
            tracing::warn!(target: AUTH_TARGET, principal = principal.id, error = %e, "Password rehash not saved.");
            principal.password = previous;
        }
    }

    /// Returns whether `password` matches the principal's stored hash.
    pub async fn check_password(&self, principal: &Principal, password: &str) -> CentralResult<bool> {
        self.hashers.check_password(password, &principal.password).await
    }

    // ── Password policy and changes ──────────────────────────────────

    /// Runs `candidate` through every policy rule.
    ///
    /// Fails with a [`CentralError::ValidationError`] listing every violated
    /// rule.
    pub fn validate_new_password(&self, principal: &Principal, candidate: &str) -> CentralResult<()> {
        self.validators.validate(candidate, Some(principal))
    }

    /// Help texts describing the password policy.
    pub fn password_policy(&self) -> Vec<String> {
        self.validators.help_texts()
    }

    /// Stores a new password and moves the generation marker.
    ///
    /// Hash and marker are persisted in one store update, so every token
    /// issued before this call stops validating. `principal` is updated only
    /// once the store accepted the change.
    ///
    /// This does **not** apply the password policy. Call
    /// [`validate_new_password`](Self::validate_new_password) first; the
    /// account forms always do.
    pub async fn set_password(&self, principal: &mut Principal, new_password: &str) -> CentralResult<()> {
        let mut updated = principal.clone();
        updated.password = self.hashers.make_password(new_password).await?;
        updated.last_password_change = Some(next_generation(principal.last_password_change));

        self.store
            .save(
                &updated,
                &[PrincipalField::Password, PrincipalField::LastPasswordChange],
            )
            .await?;

        tracing::info!(target: AUTH_TARGET, principal = updated.id, "Password changed.");
        *principal = updated;
        Ok(())
    }

    // ── Session tokens ───────────────────────────────────────────────

    /// Issues a session token valid for `ttl_minutes`.
    pub fn issue_session_token(&self, principal: &Principal, ttl_minutes: i64) -> CentralResult<String> {
        let claims = SessionClaims {
            id: principal.id,
            exp: expiry_in(ttl_minutes).map_err(signing_error)?,
            generation: principal.generation(),
        };
        self.session_signer.encode(&claims).map_err(signing_error)
    }

    /// Issues a session token with the configured default lifetime.
    pub fn issue_default_session_token(&self, principal: &Principal) -> CentralResult<String> {
        self.issue_session_token(principal, self.token_expiration_mins)
    }

    /// Validates a session token and loads its principal.
    ///
    /// Every rejection (empty, bad signature, malformed claims, expired,
    /// unknown principal, password changed since issuance) fails with
    /// [`INVALID_USER_TOKEN`]. With `check_active`, an inactive principal
    /// fails with [`USER_LOCKED`].
    pub async fn validate_session_token(
        &self,
        token: &str,
        check_active: bool,
    ) -> CentralResult<(Principal, SessionClaims)> {
        let claims: SessionClaims = self.session_signer.decode(token).map_err(|e| {
            tracing::debug!(target: AUTH_TARGET, error = %e, "Session token rejected.");
            invalid_user_token()
        })?;

        let principal = self
            .bound_principal(&claims)
            .await?
            .ok_or_else(invalid_user_token)?;

        if check_active && !principal.is_active {
            return Err(user_locked());
        }
        Ok((principal, claims))
    }

    // ── Recovery tokens ──────────────────────────────────────────────

    /// Issues a password recovery token signed with the recovery secret.
    pub fn issue_password_recovery_token(&self, principal: &Principal) -> CentralResult<String> {
        let claims = RecoveryClaims {
            id: principal.id,
            generation: principal.generation(),
            exp: expiry_in(self.recovery_expiration_mins).map_err(signing_error)?,
        };
        self.recovery_signer.encode(&claims).map_err(signing_error)
    }

    /// Validates a recovery token and loads its principal.
    ///
    /// Inactive principals are accepted. Any rejection fails with
    /// [`CentralError::PermissionDenied`].
    pub async fn validate_recovery_token(&self, token: &str) -> CentralResult<Principal> {
        let claims: RecoveryClaims = self.recovery_signer.decode(token).map_err(|e| {
            tracing::debug!(target: AUTH_TARGET, error = %e, "Recovery token rejected.");
            invalid_recovery_token()
        })?;

        self.bound_principal(&claims)
            .await?
            .ok_or_else(invalid_recovery_token)
    }

    /// Loads the principal named by `claims` if its generation still matches.
    async fn bound_principal<C: BoundClaims + Sync>(&self, claims: &C) -> CentralResult<Option<Principal>> {
        let principal = self.store.find_by_id(claims.principal_id()).await?;
        Ok(principal.filter(|p| {
            let current = p.generation();
            if current == claims.generation() {
                true
            } else {
                tracing::debug!(target: AUTH_TARGET, principal = p.id, "Token generation is stale.");
                false
            }
        }))
    }
}
