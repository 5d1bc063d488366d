//! # central-core
//!
//! Infrastructure shared by the central crates. It has no knowledge of
//! principals or tokens.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and result alias
//! - [`settings`] - Runtime settings and secret generation
//! - [`settings_loader`] - TOML/JSON loading with environment overrides
//! - [`logging`] - Tracing subscriber setup and log targets
//! - [`cache`] - Cache backends with TTL
//! - [`mail`] - Email messages, backends and the dispatcher

pub mod cache;
pub mod error;
pub mod logging;
pub mod mail;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{CentralError, CentralResult, ValidationError};
pub use settings::Settings;
