//! Short-lived cache of validated session tokens, and the `Authorization`
//! header authenticator built on it.
//!
//! A validated token is remembered for a few seconds so bursts of requests
//! carrying the same token skip the store lookup. A password change becomes
//! visible to cached tokens once their entry expires.

use std::sync::Arc;
use std::time::Duration;

use central_core::cache::{CacheBackend, CacheValue};
use central_core::error::{CentralError, CentralResult};
use central_core::logging::AUTH_TARGET;
use central_core::settings::Settings;

use crate::principal::Principal;
use crate::service::AuthCore;
use crate::tokens::SessionClaims;

/// Scheme expected in the `Authorization` header.
pub const TOKEN_SCHEME: &str = "Token";

const CACHE_KEY_PREFIX: &str = "tk_";

/// Caches `(Principal, SessionClaims)` pairs by raw token.
#[derive(Clone)]
pub struct TokenCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// Uses `token_cache_timeout_secs` from `settings`.
    pub fn from_settings(backend: Arc<dyn CacheBackend>, settings: &Settings) -> Self {
        Self::new(backend, Duration::from_secs(settings.token_cache_timeout_secs))
    }

    fn key(token: &str) -> String {
        format!("{CACHE_KEY_PREFIX}{token}")
    }

    /// Returns the cached pair for `token`. An entry that no longer decodes
    /// counts as a miss.
    pub async fn get(&self, token: &str) -> CentralResult<Option<(Principal, SessionClaims)>> {
        let Some(value) = self.backend.get(&Self::key(token)).await? else {
            return Ok(None);
        };
        let Some(json) = value.as_json() else {
            return Ok(None);
        };
        match serde_json::from_value(json.clone()) {
            Ok(pair) => Ok(Some(pair)),
            Err(e) => {
                tracing::debug!(target: AUTH_TARGET, error = %e, "Discarding unreadable token cache entry.");
                Ok(None)
            }
        }
    }

    pub async fn set(&self, token: &str, principal: &Principal, claims: &SessionClaims) -> CentralResult<()> {
        let json = serde_json::to_value((principal, claims))
            .map_err(|e| CentralError::InternalServerError(e.to_string()))?;
        self.backend
            .set(&Self::key(token), CacheValue::Json(json), Some(self.ttl))
            .await
    }
}

/// Resolves a session from an `Authorization: Token <jwt>` header.
#[derive(Debug, Clone)]
pub struct SessionAuthenticator {
    core: Arc<AuthCore>,
    cache: TokenCache,
}

impl SessionAuthenticator {
    pub fn new(core: Arc<AuthCore>, cache: TokenCache) -> Self {
        Self { core, cache }
    }

    /// Extracts the token from a header value.
    ///
    /// Returns `None` unless the header is exactly `Token <token>` with a
    /// non-empty token.
    pub fn parse_header(header: &str) -> Option<&str> {
        let mut parts = header.split(' ');
        let (Some(scheme), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
            return None;
        };
        (scheme == TOKEN_SCHEME && !token.is_empty()).then_some(token)
    }

    /// Authenticates a request by its `Authorization` header.
    ///
    /// `Ok(None)` means no token credentials were supplied. A token that is
    /// present but invalid fails like
    /// [`AuthCore::validate_session_token`].
    pub async fn authenticate(
        &self,
        header: Option<&str>,
    ) -> CentralResult<Option<(Principal, SessionClaims)>> {
        let Some(token) = header.and_then(Self::parse_header) else {
            return Ok(None);
        };

        if let Some(hit) = self.cache.get(token).await? {
            return Ok(Some(hit));
        }

        let (principal, claims) = self.core.validate_session_token(token, true).await?;
        self.cache.set(token, &principal, &claims).await?;
        Ok(Some((principal, claims)))
    }

    /// The challenge scheme for `WWW-Authenticate`.
    pub const fn authenticate_header(&self) -> &'static str {
        TOKEN_SCHEME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use central_core::cache::InMemoryCache;

    #[test]
    fn test_parse_header() {
        assert_eq!(SessionAuthenticator::parse_header("Token abc"), Some("abc"));
        assert_eq!(SessionAuthenticator::parse_header("Bearer abc"), None);
        assert_eq!(SessionAuthenticator::parse_header("token abc"), None);
        assert_eq!(SessionAuthenticator::parse_header("Token"), None);
        assert_eq!(SessionAuthenticator::parse_header("Token "), None);
        assert_eq!(SessionAuthenticator::parse_header("Token a b"), None);
        assert_eq!(SessionAuthenticator::parse_header(""), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entry_expires() {
        let cache = TokenCache::new(Arc::new(InMemoryCache::new()), Duration::from_secs(15));
        let principal = Principal::new(crate::principal::PrincipalKind::Client, "a@example.com");
        let claims = SessionClaims {
            id: 1,
            exp: 0,
            generation: String::new(),
        };
        cache.set("tok", &principal, &claims).await.unwrap();
        let (cached, cached_claims) = cache.get("tok").await.unwrap().unwrap();
        assert_eq!(cached, principal);
        assert_eq!(cached_claims, claims);

        tokio::time::advance(Duration::from_secs(16)).await;
        assert!(cache.get("tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_foreign_entry_is_a_miss() {
        let backend = Arc::new(InMemoryCache::new());
        backend
            .set("tk_tok", CacheValue::String("junk".into()), None)
            .await
            .unwrap();
        let cache = TokenCache::new(backend, Duration::from_secs(15));
        assert!(cache.get("tok").await.unwrap().is_none());
    }
}
