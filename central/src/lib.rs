//! # central
//!
//! Authentication core for central: credential checks, revocable session
//! tokens, password changes and password recovery.
//!
//! This is the meta-crate that re-exports the sub-crates and wires them
//! together from a [`Settings`](core::settings::Settings) value.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use central::auth::InMemoryPrincipalStore;
//! use central::core::settings_loader;
//!
//! # async fn run() -> central::core::CentralResult<()> {
//! let settings = settings_loader::from_toml_file_with_env("central.toml")?;
//! let services = central::bootstrap(&settings, Arc::new(InMemoryPrincipalStore::new()))?;
//! let policy = services.core.password_policy();
//! # let _ = policy;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use central_auth::{AuthCore, PrincipalStore, SessionAuthenticator, TokenCache};
use central_core::cache::{CacheBackend, DummyCache, InMemoryCache};
use central_core::error::{CentralError, CentralResult};
use central_core::mail::{ConsoleBackend, EmailBackend, EmailDispatcher, InMemoryBackend};
use central_core::settings::Settings;

/// Errors, settings, logging, cache and mail.
pub use central_core as core;

/// Principals, hashing, password policy, tokens and account forms.
pub use central_auth as auth;

/// Everything a request layer needs, built from one settings value.
#[derive(Debug, Clone)]
pub struct Services {
    pub core: Arc<AuthCore>,
    pub authenticator: SessionAuthenticator,
    pub mailer: EmailDispatcher,
    /// Messages sent through the `locmem` email backend. `None` for every
    /// other backend.
    pub outbox: Option<InMemoryBackend>,
}

/// Builds the token cache backend named by `settings.cache_backend`.
pub fn cache_backend(settings: &Settings) -> CentralResult<Arc<dyn CacheBackend>> {
    match settings.cache_backend.as_str() {
        "locmem" => Ok(Arc::new(InMemoryCache::new())),
        "dummy" => Ok(Arc::new(DummyCache)),
        other => Err(CentralError::ConfigurationError(format!(
            "Unknown cache backend '{other}'. Expected 'locmem' or 'dummy'."
        ))),
    }
}

/// Builds the email backend named by `settings.email_backend`.
pub fn email_backend(settings: &Settings) -> CentralResult<Arc<dyn EmailBackend>> {
    match settings.email_backend.as_str() {
        "console" => Ok(Arc::new(ConsoleBackend)),
        "locmem" => Ok(Arc::new(InMemoryBackend::new())),
        other => Err(CentralError::ConfigurationError(format!(
            "Unknown email backend '{other}'. Expected 'console' or 'locmem'."
        ))),
    }
}

/// Validates `settings`, installs logging and builds the services over
/// `store`.
pub fn bootstrap(settings: &Settings, store: Arc<dyn PrincipalStore>) -> CentralResult<Services> {
    settings.validate()?;
    central_core::logging::setup_logging(settings);

    let core = Arc::new(AuthCore::from_settings(store, settings)?);
    let cache = TokenCache::from_settings(cache_backend(settings)?, settings);

    // The locmem outbox is kept so callers can read delivered messages.
    let (backend, outbox): (Arc<dyn EmailBackend>, _) = if settings.email_backend == "locmem" {
        let outbox = InMemoryBackend::new();
        (Arc::new(outbox.clone()), Some(outbox))
    } else {
        (email_backend(settings)?, None)
    };
    let mailer = EmailDispatcher::new(backend, settings.default_from_email.clone());

    tracing::info!(
        target: central_core::logging::AUTH_TARGET,
        hashers = ?settings.password_hashers,
        email_backend = %settings.email_backend,
        cache_backend = %settings.cache_backend,
        "Auth core ready."
    );

    Ok(Services {
        authenticator: SessionAuthenticator::new(Arc::clone(&core), cache),
        core,
        mailer,
        outbox,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_backend_selection() {
        let mut settings = Settings::default();
        assert!(email_backend(&settings).is_ok());
        settings.email_backend = "locmem".into();
        assert!(email_backend(&settings).is_ok());
        settings.email_backend = "smtp".into();
        assert!(matches!(
            email_backend(&settings),
            Err(CentralError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_cache_backend_selection() {
        let mut settings = Settings::default();
        assert_eq!(settings.cache_backend, "locmem");
        assert!(cache_backend(&settings).is_ok());
        settings.cache_backend = "dummy".into();
        assert!(cache_backend(&settings).is_ok());
        settings.cache_backend = "redis".into();
        assert!(matches!(
            cache_backend(&settings),
            Err(CentralError::ConfigurationError(_))
        ));
    }

    fn configured(email: &str, cache: &str) -> Settings {
        Settings {
            secret_key: "facade-secret".into(),
            reset_token_secret_key: "facade-recovery-secret".into(),
            email_backend: email.into(),
            cache_backend: cache.into(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_outbox_only_for_locmem_email() {
        let store = Arc::new(central_auth::InMemoryPrincipalStore::new());
        let services = bootstrap(&configured("locmem", "locmem"), store.clone()).unwrap();
        assert!(services.outbox.is_some());
        let services = bootstrap(&configured("console", "locmem"), store).unwrap();
        assert!(services.outbox.is_none());
    }

    #[test]
    fn test_bootstrap_rejects_unknown_cache_backend() {
        let store = Arc::new(central_auth::InMemoryPrincipalStore::new());
        let err = bootstrap(&configured("console", "memcached"), store).unwrap_err();
        assert!(matches!(err, CentralError::ConfigurationError(_)));
    }

    #[tokio::test]
    async fn test_outbox_receives_dispatched_mail() {
        let store = Arc::new(central_auth::InMemoryPrincipalStore::new());
        let services = bootstrap(&configured("locmem", "dummy"), store).unwrap();
        let message = services
            .mailer
            .compose("Subject", "body", None, vec!["user@example.com".into()]);
        services
            .mailer
            .send(message, central_core::mail::DeliveryMode::Immediate)
            .await
            .unwrap();
        let outbox = services.outbox.unwrap();
        assert_eq!(outbox.message_count().await, 1);
    }

    #[test]
    fn test_bootstrap_rejects_missing_secrets() {
        let store = Arc::new(central_auth::InMemoryPrincipalStore::new());
        assert!(bootstrap(&Settings::default(), store).is_err());
    }
}
