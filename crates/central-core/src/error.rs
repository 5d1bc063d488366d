//! Error types shared by every central crate.
//!
//! [`CentralError`] is a fixed taxonomy: each operation fails with one kind,
//! and the boundary layer maps kinds to transport codes through
//! [`CentralError::status_code`] and [`CentralError::error_code`].

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// A validation failure carrying every violated rule.
///
/// Messages that belong to no particular input live in `messages`; the rest
/// are grouped by field name so a form can render all of them at once.
///
/// # Examples
///
/// ```
/// use central_core::error::ValidationError;
///
/// let err = ValidationError::for_field("new_password", "This password is too common.");
/// assert_eq!(err.field("new_password").unwrap().len(), 1);
///
/// let err = ValidationError::from_messages(vec![
///     "This password is too short.".to_string(),
///     "This password is entirely numeric.".to_string(),
/// ]);
/// assert_eq!(err.messages.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    /// Messages not tied to a field.
    pub messages: Vec<String>,
    /// Per-field messages, keyed by field name.
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    /// Creates a `ValidationError` with a single non-field message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            messages: vec![message.into()],
            field_errors: BTreeMap::new(),
        }
    }

    /// Creates a `ValidationError` from a list of non-field messages.
    pub fn from_messages(messages: Vec<String>) -> Self {
        Self {
            messages,
            field_errors: BTreeMap::new(),
        }
    }

    /// Creates a `ValidationError` with one message attached to `field`.
    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut err = Self::default();
        err.add_field_error(field, message);
        err
    }

    /// Creates a `ValidationError` from already grouped field errors.
    pub const fn with_field_errors(field_errors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            messages: Vec::new(),
            field_errors,
        }
    }

    /// Appends a message to the given field.
    pub fn add_field_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.field_errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Moves every message (field and non-field) under `field`.
    ///
    /// Used when a rule-level error surfaces through a form input.
    #[must_use]
    pub fn into_field(self, field: &str) -> Self {
        let mut out = Self::default();
        for message in self.messages {
            out.add_field_error(field, message);
        }
        for (_, messages) in self.field_errors {
            for message in messages {
                out.add_field_error(field, message);
            }
        }
        out
    }

    /// Returns the messages recorded for `field`, if any.
    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.field_errors.get(field).map(Vec::as_slice)
    }

    /// Returns `true` when no message was recorded.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.field_errors.values().all(Vec::is_empty)
    }

    /// Iterates over every message, non-field ones first.
    pub fn all_messages(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .chain(self.field_errors.values().flatten())
            .map(String::as_str)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for message in &self.messages {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{message}")?;
            first = false;
        }
        for (field, messages) in &self.field_errors {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// The primary error type for central.
#[derive(Error, Debug)]
pub enum CentralError {
    // ── Authentication ───────────────────────────────────────────────

    /// Bad credentials, a locked account, or an unusable session token.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The caller is not allowed to perform the operation (e.g. a bad recovery token).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    // ── Validation ───────────────────────────────────────────────────

    /// One or more inputs failed validation.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    // ── Persistence ──────────────────────────────────────────────────

    /// The requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The principal store failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    // ── Operations ───────────────────────────────────────────────────

    /// A named operation failed in a way the caller should see (e.g. email delivery).
    #[error("{message}")]
    OperationError {
        /// Human-readable detail.
        message: String,
        /// Machine-readable code such as `emailSendingError`.
        code: String,
    },

    /// Token encoding failed.
    #[error("Signing error: {0}")]
    SigningError(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Unexpected failure (hasher errors, task join errors).
    #[error("Internal server error: {0}")]
    InternalServerError(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CentralError {
    /// Returns the HTTP status code associated with this error.
    ///
    /// - `ValidationError`, `OperationError` -> 400
    /// - `AuthenticationFailed` -> 401
    /// - `PermissionDenied` -> 403
    /// - `NotFound` -> 404
    /// - `Conflict` -> 409
    /// - Everything else -> 500
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError(_) | Self::OperationError { .. } => 400,
            Self::AuthenticationFailed(_) => 401,
            Self::PermissionDenied(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::DatabaseError(_)
            | Self::SigningError(_)
            | Self::ConfigurationError(_)
            | Self::InternalServerError(_)
            | Self::IoError(_) => 500,
        }
    }

    /// Returns the machine-readable code reported to API clients.
    pub fn error_code(&self) -> &str {
        match self {
            Self::ValidationError(_) => "validationError",
            Self::AuthenticationFailed(_) => "authenticationError",
            Self::PermissionDenied(_) => "permissionError",
            Self::NotFound(_) => "notFound",
            Self::Conflict(_) => "dataError",
            Self::DatabaseError(_) => "dbError",
            Self::OperationError { code, .. } => code,
            Self::SigningError(_)
            | Self::ConfigurationError(_)
            | Self::InternalServerError(_)
            | Self::IoError(_) => "unknownError",
        }
    }

    /// Builds an [`CentralError::OperationError`].
    pub fn operation(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::OperationError {
            message: message.into(),
            code: code.into(),
        }
    }
}

impl From<ValidationError> for CentralError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationError(err)
    }
}

/// A convenience type alias for `Result<T, CentralError>`.
pub type CentralResult<T> = Result<T, CentralError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_messages() {
        let err = ValidationError::from_messages(vec!["Too short.".into(), "Numeric.".into()]);
        assert_eq!(err.to_string(), "Too short.; Numeric.");
    }

    #[test]
    fn test_validation_error_display_field_errors() {
        let err = ValidationError::for_field("email", "Enter a valid email address.");
        assert_eq!(err.to_string(), "email: Enter a valid email address.");
    }

    #[test]
    fn test_validation_error_add_field_error_accumulates() {
        let mut err = ValidationError::default();
        assert!(err.is_empty());
        err.add_field_error("password", "first");
        err.add_field_error("password", "second");
        err.add_field_error("email", "third");
        assert_eq!(err.field("password").unwrap(), ["first", "second"]);
        assert_eq!(err.all_messages().count(), 3);
        assert!(!err.is_empty());
    }

    #[test]
    fn test_validation_error_into_field() {
        let err = ValidationError::from_messages(vec!["a".into(), "b".into()]).into_field("new_password");
        assert!(err.messages.is_empty());
        assert_eq!(err.field("new_password").unwrap(), ["a", "b"]);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(CentralError::AuthenticationFailed("x".into()).status_code(), 401);
        assert_eq!(CentralError::PermissionDenied("x".into()).status_code(), 403);
        assert_eq!(
            CentralError::ValidationError(ValidationError::new("x")).status_code(),
            400
        );
        assert_eq!(CentralError::NotFound("x".into()).status_code(), 404);
        assert_eq!(CentralError::Conflict("x".into()).status_code(), 409);
        assert_eq!(CentralError::DatabaseError("x".into()).status_code(), 500);
        assert_eq!(CentralError::SigningError("x".into()).status_code(), 500);
        assert_eq!(CentralError::operation("x", "emailSendingError").status_code(), 400);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CentralError::AuthenticationFailed("x".into()).error_code(),
            "authenticationError"
        );
        assert_eq!(CentralError::PermissionDenied("x".into()).error_code(), "permissionError");
        assert_eq!(CentralError::from(ValidationError::new("x")).error_code(), "validationError");
        assert_eq!(
            CentralError::operation("mail down", "emailSendingError").error_code(),
            "emailSendingError"
        );
        assert_eq!(CentralError::DatabaseError("x".into()).error_code(), "dbError");
    }

    #[test]
    fn test_error_display() {
        let err = CentralError::AuthenticationFailed("Invalid credentials.".into());
        assert_eq!(err.to_string(), "Authentication failed: Invalid credentials.");
        let err = CentralError::operation("Email could not be sent.", "emailSendingError");
        assert_eq!(err.to_string(), "Email could not be sent.");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: CentralError = io_err.into();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("file missing"));
    }
}
