//! Outgoing email.
//!
//! [`EmailBackend`] is the transport seam. [`EmailDispatcher`] sits in front
//! of it and decides whether a message is delivered inline or queued on the
//! runtime, where failures are only logged.
//!
//! ## Backends
//!
//! - [`ConsoleBackend`] - Logs messages through tracing (for development)
//! - [`InMemoryBackend`] - Collects messages in memory (for testing)

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CentralError;
use crate::logging::EMAIL_TARGET;

/// Code reported when a message could not be delivered.
pub const EMAIL_SENDING_ERROR: &str = "emailSendingError";

/// An email message with a plain text body and an optional HTML alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    /// The subject line, always a single line.
    pub subject: String,
    /// The plain text body.
    pub body: String,
    /// The sender's address.
    pub from_email: String,
    /// The recipients.
    pub to: Vec<String>,
    /// Optional HTML alternative of `body`.
    pub html_body: Option<String>,
}

impl EmailMessage {
    /// Creates a new message. Line breaks in `subject` are removed.
    pub fn new(
        subject: impl Into<String>,
        body: impl Into<String>,
        from_email: impl Into<String>,
        to: Vec<String>,
    ) -> Self {
        let subject: String = subject.into();
        Self {
            subject: subject.replace(['\r', '\n'], ""),
            body: body.into(),
            from_email: from_email.into(),
            to,
            html_body: None,
        }
    }

    /// Sets the HTML alternative for this message.
    #[must_use]
    pub fn with_html_body(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    /// Formats the message as a human-readable string.
    pub fn format_message(&self) -> String {
        use std::fmt::Write;
        let mut output = String::new();
        let _ = writeln!(output, "From: {}", self.from_email);
        let _ = writeln!(output, "To: {}", self.to.join(", "));
        let _ = writeln!(output, "Subject: {}", self.subject);
        let _ = writeln!(output);
        let _ = writeln!(output, "{}", self.body);
        if let Some(html) = &self.html_body {
            let _ = writeln!(output, "\n--- HTML ---\n{html}");
        }
        output
    }
}

/// A transport for email messages.
#[async_trait]
pub trait EmailBackend: Send + Sync {
    /// Sends a single message.
    async fn send(&self, message: &EmailMessage) -> Result<(), CentralError>;

    /// Sends several messages, returning how many were sent.
    async fn send_many(&self, messages: &[EmailMessage]) -> Result<usize, CentralError> {
        let mut count = 0;
        for message in messages {
            self.send(message).await?;
            count += 1;
        }
        Ok(count)
    }
}

fn require_recipient(message: &EmailMessage) -> Result<(), CentralError> {
    if message.to.is_empty() {
        return Err(CentralError::operation(
            "Email must have at least one recipient",
            EMAIL_SENDING_ERROR,
        ));
    }
    Ok(())
}

/// Writes every message to the log instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleBackend;

#[async_trait]
impl EmailBackend for ConsoleBackend {
    async fn send(&self, message: &EmailMessage) -> Result<(), CentralError> {
        require_recipient(message)?;
        tracing::info!(target: "central::mail", "\n{}", message.format_message());
        Ok(())
    }
}

/// Collects messages in memory so tests can inspect them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    messages: Arc<RwLock<Vec<EmailMessage>>>,
}

impl InMemoryBackend {
    /// Creates a new in-memory email backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all sent messages.
    pub async fn get_messages(&self) -> Vec<EmailMessage> {
        self.messages.read().await.clone()
    }

    /// Returns the number of sent messages.
    pub async fn message_count(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Clears all stored messages.
    pub async fn clear(&self) {
        self.messages.write().await.clear();
    }
}

#[async_trait]
impl EmailBackend for InMemoryBackend {
    async fn send(&self, message: &EmailMessage) -> Result<(), CentralError> {
        require_recipient(message)?;
        self.messages.write().await.push(message.clone());
        Ok(())
    }
}

/// How [`EmailDispatcher::send`] delivers a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Queue on the runtime and return immediately. Failures are logged.
    #[default]
    Background,
    /// Deliver before returning. Failures become an `OperationError`.
    Immediate,
}

/// Fronts an [`EmailBackend`] with a default sender and delivery mode.
#[derive(Clone)]
pub struct EmailDispatcher {
    backend: Arc<dyn EmailBackend>,
    default_from_email: String,
}

impl std::fmt::Debug for EmailDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailDispatcher")
            .field("default_from_email", &self.default_from_email)
            .finish_non_exhaustive()
    }
}

impl EmailDispatcher {
    /// Creates a dispatcher over `backend`.
    pub fn new(backend: Arc<dyn EmailBackend>, default_from_email: impl Into<String>) -> Self {
        Self {
            backend,
            default_from_email: default_from_email.into(),
        }
    }

    /// The sender used by [`compose`](Self::compose).
    pub fn default_from_email(&self) -> &str {
        &self.default_from_email
    }

    /// Builds a message from the default sender.
    pub fn compose(
        &self,
        subject: &str,
        plain_text: &str,
        html: Option<&str>,
        to: Vec<String>,
    ) -> EmailMessage {
        let message = EmailMessage::new(subject, plain_text, &self.default_from_email, to);
        match html {
            Some(html) => message.with_html_body(html),
            None => message,
        }
    }

    /// Delivers `message` according to `mode`.
    ///
    /// Background delivery must be called from within a tokio runtime.
    pub async fn send(&self, message: EmailMessage, mode: DeliveryMode) -> Result<(), CentralError> {
        match mode {
            DeliveryMode::Immediate => self.backend.send(&message).await.map_err(|e| {
                tracing::error!(target: EMAIL_TARGET, error = %e, subject = %message.subject, "Failed to send email.");
                CentralError::operation(format!("Email could not be sent: {e}"), EMAIL_SENDING_ERROR)
            }),
            DeliveryMode::Background => {
                let backend = Arc::clone(&self.backend);
                tokio::spawn(async move {
                    if let Err(e) = backend.send(&message).await {
                        tracing::error!(
                            target: EMAIL_TARGET,
                            error = %e,
                            subject = %message.subject,
                            recipients = %message.to.join(", "),
                            "Failed to send email."
                        );
                    }
                });
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingBackend;

    #[async_trait]
    impl EmailBackend for FailingBackend {
        async fn send(&self, _message: &EmailMessage) -> Result<(), CentralError> {
            Err(CentralError::InternalServerError("smtp down".into()))
        }
    }

    async fn wait_for_messages(backend: &InMemoryBackend, expected: usize) {
        for _ in 0..100 {
            if backend.message_count().await >= expected {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_subject_line_breaks_removed() {
        let msg = EmailMessage::new("Password\r\n Recovery", "body", "a@x.com", vec!["b@x.com".into()]);
        assert_eq!(msg.subject, "Password Recovery");
    }

    #[test]
    fn test_format_message_includes_html() {
        let msg = EmailMessage::new("Hi", "plain", "a@x.com", vec!["b@x.com".into()])
            .with_html_body("<b>html</b>");
        let formatted = msg.format_message();
        assert!(formatted.contains("Subject: Hi"));
        assert!(formatted.contains("plain"));
        assert!(formatted.contains("<b>html</b>"));
    }

    #[tokio::test]
    async fn test_in_memory_backend_collects() {
        let backend = InMemoryBackend::new();
        let msg = EmailMessage::new("s", "b", "a@x.com", vec!["b@x.com".into()]);
        assert_eq!(backend.send_many(&[msg.clone(), msg]).await.unwrap(), 2);
        assert_eq!(backend.message_count().await, 2);
        backend.clear().await;
        assert_eq!(backend.message_count().await, 0);
    }

    #[tokio::test]
    async fn test_in_memory_backend_requires_recipient() {
        let backend = InMemoryBackend::new();
        let msg = EmailMessage::new("s", "b", "a@x.com", vec![]);
        assert!(backend.send(&msg).await.is_err());
    }

    #[tokio::test]
    async fn test_console_backend() {
        let msg = EmailMessage::new("s", "b", "a@x.com", vec!["b@x.com".into()]);
        assert!(ConsoleBackend.send(&msg).await.is_ok());
    }

    #[tokio::test]
    async fn test_dispatcher_background_delivers() {
        let backend = InMemoryBackend::new();
        let dispatcher = EmailDispatcher::new(Arc::new(backend.clone()), "noreply@central.test");
        let msg = dispatcher.compose("Subject", "plain", Some("<p>html</p>"), vec!["u@x.com".into()]);
        assert_eq!(msg.from_email, "noreply@central.test");

        dispatcher.send(msg, DeliveryMode::Background).await.unwrap();
        wait_for_messages(&backend, 1).await;

        let sent = backend.get_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].html_body.as_deref(), Some("<p>html</p>"));
    }

    #[tokio::test]
    async fn test_dispatcher_background_swallows_failure() {
        let dispatcher = EmailDispatcher::new(Arc::new(FailingBackend), "noreply@central.test");
        let msg = dispatcher.compose("s", "b", None, vec!["u@x.com".into()]);
        assert!(dispatcher.send(msg, DeliveryMode::Background).await.is_ok());
    }

    #[tokio::test]
    async fn test_dispatcher_immediate_surfaces_failure() {
        let dispatcher = EmailDispatcher::new(Arc::new(FailingBackend), "noreply@central.test");
        let msg = dispatcher.compose("s", "b", None, vec!["u@x.com".into()]);
        let err = dispatcher.send(msg, DeliveryMode::Immediate).await.unwrap_err();
        assert_eq!(err.error_code(), EMAIL_SENDING_ERROR);
        assert_eq!(err.status_code(), 400);
    }
}
