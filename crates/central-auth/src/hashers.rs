//! Password hashing.
//!
//! Hashing and verification are CPU bound and run on
//! `tokio::task::spawn_blocking`. [`PasswordHashers`] is the ordered registry
//! AuthCore uses: the first hasher encodes new passwords, the others only
//! verify hashes written by older deployments.
//!
//! # Hashers
//!
//! - [`Argon2Hasher`] - Argon2id (preferred)
//! - [`BcryptHasher`] - bcrypt
//! - [`Pbkdf2Hasher`] - PBKDF2-HMAC-SHA256 in the Django `pbkdf2_sha256$...` layout

use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::Sha256;

use central_core::error::{CentralError, CentralResult};

/// Prefix marking a password that can never verify.
const UNUSABLE_PASSWORD_PREFIX: &str = "!";
const UNUSABLE_PASSWORD_SUFFIX_LENGTH: usize = 40;

/// A password hashing algorithm.
#[async_trait]
pub trait PasswordHasher: Send + Sync {
    /// Returns the algorithm identifier (e.g. "argon2", "bcrypt", "`pbkdf2_sha256`").
    fn algorithm(&self) -> &str;

    /// Returns `true` if `encoded` was produced by this algorithm.
    fn recognizes(&self, encoded: &str) -> bool;

    /// Hashes a password into a self-describing encoded string.
    async fn hash(&self, password: &str) -> CentralResult<String>;

    /// Verifies a password against an encoded hash.
    async fn verify(&self, password: &str, encoded: &str) -> CentralResult<bool>;

    /// Returns `true` if the hash was produced with weaker parameters than
    /// this hasher currently uses.
    fn must_update(&self, encoded: &str) -> bool;
}

fn join_error(e: &tokio::task::JoinError) -> CentralError {
    CentralError::InternalServerError(format!("Task join error: {e}"))
}

/// Argon2id hasher with the `argon2` crate defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

#[async_trait]
impl PasswordHasher for Argon2Hasher {
    fn algorithm(&self) -> &'static str {
        "argon2"
    }

    fn recognizes(&self, encoded: &str) -> bool {
        encoded.starts_with("$argon2")
    }

    async fn hash(&self, password: &str) -> CentralResult<String> {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || {
            use argon2::password_hash::{rand_core::OsRng, PasswordHasher as _, SaltString};
            use argon2::Argon2;

            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(password.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| CentralError::InternalServerError(format!("Argon2 hash error: {e}")))
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn verify(&self, password: &str, encoded: &str) -> CentralResult<bool> {
        let password = password.to_string();
        let encoded = encoded.to_string();
        tokio::task::spawn_blocking(move || {
            use argon2::password_hash::{PasswordHash, PasswordVerifier};
            use argon2::Argon2;

            let parsed = PasswordHash::new(&encoded)
                .map_err(|e| CentralError::InternalServerError(format!("Invalid hash: {e}")))?;
            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    fn must_update(&self, encoded: &str) -> bool {
        !encoded.starts_with("$argon2id$")
    }
}

/// Bcrypt hasher.
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    /// The bcrypt cost parameter (default: 12).
    pub cost: u32,
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self { cost: 12 }
    }
}

#[async_trait]
impl PasswordHasher for BcryptHasher {
    fn algorithm(&self) -> &'static str {
        "bcrypt"
    }

    fn recognizes(&self, encoded: &str) -> bool {
        ["$2a$", "$2b$", "$2y$"]
            .iter()
            .any(|prefix| encoded.starts_with(prefix))
    }

    async fn hash(&self, password: &str) -> CentralResult<String> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || {
            bcrypt::hash(password, cost)
                .map_err(|e| CentralError::InternalServerError(format!("Bcrypt hash error: {e}")))
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn verify(&self, password: &str, encoded: &str) -> CentralResult<bool> {
        let password = password.to_string();
        let encoded = encoded.to_string();
        tokio::task::spawn_blocking(move || {
            bcrypt::verify(password, &encoded)
                .map_err(|e| CentralError::InternalServerError(format!("Bcrypt verify error: {e}")))
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    fn must_update(&self, encoded: &str) -> bool {
        // $2b$XX$... carries the cost in the third segment
        encoded
            .split('$')
            .nth(2)
            .and_then(|cost| cost.parse::<u32>().ok())
            .is_some_and(|stored| stored < self.cost)
    }
}

/// PBKDF2-HMAC-SHA256 hasher reading and writing
/// `pbkdf2_sha256$<iterations>$<salt>$<base64 hash>`.
#[derive(Debug, Clone, Copy)]
pub struct Pbkdf2Hasher {
    /// The number of PBKDF2 iterations (default: `600_000`).
    pub iterations: u32,
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self {
            iterations: 600_000,
        }
    }
}

const PBKDF2_PREFIX: &str = "pbkdf2_sha256";

#[async_trait]
impl PasswordHasher for Pbkdf2Hasher {
    fn algorithm(&self) -> &'static str {
        PBKDF2_PREFIX
    }

    fn recognizes(&self, encoded: &str) -> bool {
        encoded
            .strip_prefix(PBKDF2_PREFIX)
            .is_some_and(|rest| rest.starts_with('$'))
    }

    async fn hash(&self, password: &str) -> CentralResult<String> {
        let password = password.to_string();
        let iterations = self.iterations;
        tokio::task::spawn_blocking(move || {
            use base64::Engine;

            let salt: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(22)
                .map(char::from)
                .collect();
            let mut dk = [0u8; 32];
            pbkdf2_hmac_sha256(password.as_bytes(), salt.as_bytes(), iterations, &mut dk)?;
            let hash_b64 = base64::engine::general_purpose::STANDARD.encode(dk);
            Ok(format!("{PBKDF2_PREFIX}${iterations}${salt}${hash_b64}"))
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    async fn verify(&self, password: &str, encoded: &str) -> CentralResult<bool> {
        let password = password.to_string();
        let encoded = encoded.to_string();
        tokio::task::spawn_blocking(move || {
            use base64::Engine;

            let parts: Vec<&str> = encoded.splitn(4, '$').collect();
            if parts.len() != 4 || parts[0] != PBKDF2_PREFIX {
                return Ok(false);
            }
            let iterations: u32 = parts[1].parse().map_err(|_| {
                CentralError::InternalServerError("Invalid iterations in hash".to_string())
            })?;

            let mut dk = [0u8; 32];
            pbkdf2_hmac_sha256(password.as_bytes(), parts[2].as_bytes(), iterations, &mut dk)?;
            let computed = base64::engine::general_purpose::STANDARD.encode(dk);
            Ok(constant_time_eq(computed.as_bytes(), parts[3].as_bytes()))
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    fn must_update(&self, encoded: &str) -> bool {
        encoded
            .split('$')
            .nth(1)
            .and_then(|iterations| iterations.parse::<u32>().ok())
            .is_some_and(|stored| stored < self.iterations)
    }
}

/// PBKDF2 (RFC 8018) with HMAC-SHA256 as the PRF.
fn pbkdf2_hmac_sha256(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    output: &mut [u8],
) -> CentralResult<()> {
    let prf = Hmac::<Sha256>::new_from_slice(password)
        .map_err(|e| CentralError::InternalServerError(format!("HMAC key error: {e}")))?;

    for (index, chunk) in output.chunks_mut(32).enumerate() {
        let block = u32::try_from(index + 1)
            .map_err(|_| CentralError::InternalServerError("PBKDF2 output too long".to_string()))?;

        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&block.to_be_bytes());
        let mut u = mac.finalize().into_bytes();
        let mut acc = u.to_vec();

        for _ in 1..iterations {
            let mut mac = prf.clone();
            mac.update(&u);
            u = mac.finalize().into_bytes();
            for (a, b) in acc.iter_mut().zip(u.iter()) {
                *a ^= b;
            }
        }

        chunk.copy_from_slice(&acc[..chunk.len()]);
    }
    Ok(())
}

/// Constant-time byte comparison.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

/// Returns `true` if the encoded hash can ever verify.
pub fn is_password_usable(encoded: &str) -> bool {
    !encoded.is_empty() && !encoded.starts_with(UNUSABLE_PASSWORD_PREFIX)
}

/// Returns an encoded value that never verifies.
pub fn make_unusable_password() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(UNUSABLE_PASSWORD_SUFFIX_LENGTH)
        .map(char::from)
        .collect();
    format!("{UNUSABLE_PASSWORD_PREFIX}{suffix}")
}

/// Ordered hasher registry. The first hasher is preferred.
#[derive(Clone)]
pub struct PasswordHashers {
    hashers: Vec<Arc<dyn PasswordHasher>>,
}

impl std::fmt::Debug for PasswordHashers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hashers.iter().map(|h| h.algorithm().to_string()))
            .finish()
    }
}

impl Default for PasswordHashers {
    fn default() -> Self {
        Self {
            hashers: vec![
                Arc::new(Argon2Hasher),
                Arc::new(BcryptHasher::default()),
                Arc::new(Pbkdf2Hasher::default()),
            ],
        }
    }
}

impl PasswordHashers {
    /// Builds a registry from explicit hashers.
    ///
    /// Fails with [`CentralError::ConfigurationError`] if `hashers` is empty.
    pub fn new(hashers: Vec<Arc<dyn PasswordHasher>>) -> CentralResult<Self> {
        if hashers.is_empty() {
            return Err(CentralError::ConfigurationError(
                "at least one password hasher is required".to_string(),
            ));
        }
        Ok(Self { hashers })
    }

    /// Builds a registry from algorithm names ("argon2", "bcrypt", "`pbkdf2_sha256`").
    pub fn from_names(names: &[String]) -> CentralResult<Self> {
        let hashers = names
            .iter()
            .map(|name| -> CentralResult<Arc<dyn PasswordHasher>> {
                match name.as_str() {
                    "argon2" => Ok(Arc::new(Argon2Hasher)),
                    "bcrypt" => Ok(Arc::new(BcryptHasher::default())),
                    PBKDF2_PREFIX => Ok(Arc::new(Pbkdf2Hasher::default())),
                    other => Err(CentralError::ConfigurationError(format!(
                        "unknown password hasher '{other}'"
                    ))),
                }
            })
            .collect::<CentralResult<Vec<_>>>()?;
        Self::new(hashers)
    }

    /// The hasher used for new passwords.
    pub fn preferred(&self) -> &dyn PasswordHasher {
        self.hashers[0].as_ref()
    }

    /// Finds the registered hasher that produced `encoded`.
    pub fn identify(&self, encoded: &str) -> Option<&dyn PasswordHasher> {
        self.hashers
            .iter()
            .find(|h| h.recognizes(encoded))
            .map(|h| &**h)
    }

    /// Hashes a password with the preferred hasher.
    pub async fn make_password(&self, password: &str) -> CentralResult<String> {
        self.preferred().hash(password).await
    }

    /// Checks a password against an encoded hash.
    ///
    /// Unusable hashes return `Ok(false)`. A hash no registered hasher
    /// recognizes is an error.
    pub async fn check_password(&self, password: &str, encoded: &str) -> CentralResult<bool> {
        if !is_password_usable(encoded) {
            return Ok(false);
        }
        let hasher = self.identify(encoded).ok_or_else(|| {
            CentralError::InternalServerError(format!(
                "Unknown password hashing algorithm for hash: {}",
                encoded.chars().take(20).collect::<String>()
            ))
        })?;
        hasher.verify(password, encoded).await
    }

    /// Returns `true` if `encoded` should be replaced by a preferred-hasher hash.
    pub fn must_update(&self, encoded: &str) -> bool {
        if !is_password_usable(encoded) {
            return false;
        }
        match self.identify(encoded) {
            Some(hasher) if hasher.algorithm() == self.preferred().algorithm() => {
                hasher.must_update(encoded)
            }
            _ => true,
        }
    }

    /// Runs the preferred hasher once and discards the result.
    ///
    /// Used when no principal matched so the failure takes as long as a
    /// wrong password would.
    pub async fn harden_runtime(&self, password: &str) {
        let _ = self.preferred().hash(password).await;
    }
}
