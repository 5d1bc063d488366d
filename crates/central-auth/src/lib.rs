//! # central-auth
//!
//! Authentication and credential lifecycle for central.
//!
//! ## Modules
//!
//! - [`principal`] - Principal records and password generation markers
//! - [`store`] - The principal store seam and an in-memory store
//! - [`hashers`] - Argon2, bcrypt and PBKDF2 password hashers
//! - [`password_validation`] - Password policy rules
//! - [`tokens`] - Session and recovery token claims and signing
//! - [`service`] - [`AuthCore`], the credential and token operations
//! - [`token_cache`] - Cached `Authorization: Token` authentication
//! - [`forms`] - Login, password change and recovery flows

pub mod forms;
pub mod hashers;
pub mod password_validation;
pub mod principal;
pub mod service;
pub mod store;
pub mod token_cache;
pub mod tokens;

pub use principal::{Principal, PrincipalField, PrincipalKind};
pub use service::{AuthCore, AuthenticateOptions};
pub use store::{InMemoryPrincipalStore, PrincipalStore};
pub use token_cache::{SessionAuthenticator, TokenCache};
pub use tokens::{RecoveryClaims, SessionClaims};
