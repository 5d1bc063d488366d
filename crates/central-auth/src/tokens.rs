//! Signed token encoding.
//!
//! Session and recovery tokens are compact HS256 JWS strings. Each kind has
//! its own claims struct and its own [`TokenSigner`], built from a distinct
//! secret, so a token of one kind never decodes as the other.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Principal id.
    pub id: i64,
    /// Expiry as Unix seconds.
    pub exp: i64,
    /// Password generation marker at issuance.
    #[serde(rename = "l")]
    pub generation: String,
}

/// Claims carried by a password recovery token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryClaims {
    /// Principal id.
    pub id: i64,
    /// Password generation marker at issuance.
    #[serde(rename = "last")]
    pub generation: String,
    /// Expiry as Unix seconds.
    pub exp: i64,
}

/// Common view over both claim kinds.
pub trait BoundClaims: Serialize + DeserializeOwned {
    /// The principal the token was issued to.
    fn principal_id(&self) -> i64;
    /// The generation marker the token is bound to.
    fn generation(&self) -> &str;
}

impl BoundClaims for SessionClaims {
    fn principal_id(&self) -> i64 {
        self.id
    }

    fn generation(&self) -> &str {
        &self.generation
    }
}

impl BoundClaims for RecoveryClaims {
    fn principal_id(&self) -> i64 {
        self.id
    }

    fn generation(&self) -> &str {
        &self.generation
    }
}

/// Reasons a token could not be produced or accepted.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token string was empty.
    #[error("token is empty")]
    Empty,
    /// Signing failed.
    #[error("failed to encode token: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),
    /// Signature, algorithm, expiry or claim shape was rejected.
    #[error("failed to decode token: {0}")]
    Decoding(#[source] jsonwebtoken::errors::Error),
    /// The requested lifetime does not fit a timestamp.
    #[error("token lifetime out of range: {0} minutes")]
    Lifetime(i64),
}

/// Returns the Unix expiry `ttl_minutes` from now. Negative values produce
/// an already expired timestamp.
pub fn expiry_in(ttl_minutes: i64) -> Result<i64, TokenError> {
    Duration::try_minutes(ttl_minutes)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .map(|at| at.timestamp())
        .ok_or(TokenError::Lifetime(ttl_minutes))
}

/// HS256 signer/verifier for one token namespace.
#[derive(Clone)]
pub struct TokenSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Creates a signer from a shared secret.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Signs `claims` into a compact token.
    pub fn encode<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(TokenError::Encoding)
    }

    /// Verifies signature, algorithm and expiry, then decodes the claims.
    pub fn decode<C: DeserializeOwned>(&self, token: &str) -> Result<C, TokenError> {
        if token.is_empty() {
            return Err(TokenError::Empty);
        }
        jsonwebtoken::decode::<C>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::Decoding)
    }
}
