//! Integration tests for configuration, caching and mail delivery.

use std::sync::Arc;
use std::time::Duration;

use central_core::cache::{CacheBackend, CacheValue, InMemoryCache};
use central_core::mail::{DeliveryMode, EmailDispatcher, InMemoryBackend, EMAIL_SENDING_ERROR};
use central_core::settings::{generate_secret_key, Settings};
use central_core::settings_loader;
use central_core::CentralError;

fn temp_config(name: &str, contents: &str) -> std::path::PathBuf {
    let path = std::env::temp_dir().join(format!("central-{}-{name}", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

// ── Settings ─────────────────────────────────────────────────────────

#[test]
fn test_toml_file_loads_and_validates() {
    let path = temp_config(
        "settings.toml",
        r#"
secret_key = "file-secret"
reset_token_secret_key = "file-recovery-secret"
token_expiration_mins = 60
password_hashers = ["bcrypt", "argon2"]

[password_policy]
min_length = 10
"#,
    );
    let settings = settings_loader::from_toml_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(settings.token_expiration_mins, 60);
    assert_eq!(settings.password_hashers, vec!["bcrypt", "argon2"]);
    assert_eq!(settings.password_policy.min_length, 10);
    assert!((settings.password_policy.max_similarity - 0.7).abs() < f64::EPSILON);
    assert_eq!(settings.password_recovery_token_expiration_mins, 10);
    settings.validate().unwrap();
}

#[test]
fn test_json_file_loads() {
    let path = temp_config(
        "settings.json",
        r#"{"secret_key": "a", "reset_token_secret_key": "b", "email_backend": "locmem"}"#,
    );
    let settings = settings_loader::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(settings.email_backend, "locmem");
    assert!(settings.validate().is_ok());
}

#[test]
fn test_missing_file_is_an_error() {
    let err = settings_loader::from_toml_file("/nonexistent/central.toml").unwrap_err();
    assert_eq!(err.status_code(), 500);
}

#[test]
fn test_default_settings_need_secrets() {
    let err = Settings::default().validate().unwrap_err();
    assert!(matches!(err, CentralError::ConfigurationError(_)));

    let settings = Settings {
        secret_key: generate_secret_key(32),
        reset_token_secret_key: generate_secret_key(32),
        ..Settings::default()
    };
    settings.validate().unwrap();
}

// ── Cache ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_cache_shared_between_handles() {
    let cache = Arc::new(InMemoryCache::new());
    let writer: Arc<dyn CacheBackend> = cache.clone();
    let reader: Arc<dyn CacheBackend> = cache;

    writer
        .set("tk_abc", CacheValue::Json(serde_json::json!({"id": 1})), Some(Duration::from_secs(15)))
        .await
        .unwrap();
    let hit = reader.get("tk_abc").await.unwrap().unwrap();
    assert_eq!(hit.as_json().unwrap()["id"], 1);

    tokio::time::advance(Duration::from_secs(15)).await;
    assert!(!reader.has_key("tk_abc").await.unwrap());
}

// ── Mail ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_dispatcher_immediate_delivery() {
    let outbox = Arc::new(InMemoryBackend::new());
    let dispatcher = EmailDispatcher::new(outbox.clone(), "noreply@central.test");

    let message = dispatcher.compose(
        "Password Recovery",
        "plain",
        Some("<b>html</b>"),
        vec!["user@example.com".into()],
    );
    dispatcher.send(message, DeliveryMode::Immediate).await.unwrap();

    let sent = outbox.get_messages().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from_email, "noreply@central.test");
    assert_eq!(sent[0].html_body.as_deref(), Some("<b>html</b>"));
}

#[tokio::test]
async fn test_dispatcher_immediate_without_recipient_fails() {
    let outbox = Arc::new(InMemoryBackend::new());
    let dispatcher = EmailDispatcher::new(outbox, "noreply@central.test");
    let message = dispatcher.compose("Subject", "plain", None, Vec::new());

    let err = dispatcher.send(message, DeliveryMode::Immediate).await.unwrap_err();
    assert_eq!(err.error_code(), EMAIL_SENDING_ERROR);
    assert_eq!(err.status_code(), 400);
}
