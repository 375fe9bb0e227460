//! Out-of-band token delivery.
//!
//! A [`Notifier`] hands a token to the user (mail relay, SMS gateway, ...).
//! The [`NotificationDispatcher`] wraps one with a timeout and turns every
//! outcome into a [`DeliveryStatus`], so a slow or failing notifier can never
//! fail the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use enrol_db::TokenPurpose;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;

use crate::models::DeliveryStatus;

#[derive(Debug, Clone, Error)]
pub enum NotifierError {
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("delivery rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// What is handed to the notifier for one token.
#[derive(Clone, Serialize)]
pub struct TokenMessage {
    pub email: String,
    pub token: String,
    /// Activation link built from the frontend base URL.
    pub link: String,
    pub purpose: TokenPurpose,
}

impl std::fmt::Debug for TokenMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenMessage")
            .field("email", &self.email)
            .field("token", &"[REDACTED]")
            .field("purpose", &self.purpose)
            .finish_non_exhaustive()
    }
}

/// Delivers a token to its user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_token(&self, message: &TokenMessage) -> Result<(), NotifierError>;
}

/// Development notifier: records that a token went out, never its value.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_token(&self, message: &TokenMessage) -> Result<(), NotifierError> {
        tracing::info!(
            email = %message.email,
            purpose = message.purpose.as_str(),
            "Token dispatched (log notifier)"
        );
        Ok(())
    }
}

/// POSTs `{email, token, link, purpose}` as JSON to a mail relay.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    /// # Errors
    ///
    /// Returns `NotifierError::Transport` if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifierError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("enrol/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| NotifierError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_token(&self, message: &TokenMessage) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| NotifierError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifierError::Rejected(format!("relay answered {status}")))
        }
    }
}

/// Sends tokens through a notifier with a bounded wait.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    frontend_base_url: String,
}

impl NotificationDispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        timeout: Duration,
        frontend_base_url: impl Into<String>,
    ) -> Self {
        Self {
            notifier,
            timeout,
            frontend_base_url: frontend_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Link the user follows to verify `token`.
    #[must_use]
    pub fn activation_link(&self, token: &str) -> String {
        format!("{}/activate?token={token}", self.frontend_base_url)
    }

    /// Deliver a token. Failures are logged and returned as a status.
    pub async fn dispatch(&self, email: &str, token: &str, purpose: TokenPurpose) -> DeliveryStatus {
        let message = TokenMessage {
            email: email.to_string(),
            token: token.to_string(),
            link: self.activation_link(token),
            purpose,
        };

        let result = match tokio::time::timeout(self.timeout, self.notifier.send_token(&message))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(NotifierError::Timeout(self.timeout)),
        };

        match result {
            Ok(()) => DeliveryStatus::Sent,
            Err(e) => {
                tracing::warn!(
                    email = %email,
                    purpose = purpose.as_str(),
                    error = %e,
                    "Token notification failed"
                );
                DeliveryStatus::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("timeout", &self.timeout)
            .field("frontend_base_url", &self.frontend_base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stalling;

    #[async_trait]
    impl Notifier for Stalling {
        async fn send_token(&self, _message: &TokenMessage) -> Result<(), NotifierError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    struct Refusing;

    #[async_trait]
    impl Notifier for Refusing {
        async fn send_token(&self, _message: &TokenMessage) -> Result<(), NotifierError> {
            Err(NotifierError::Rejected("mailbox full".into()))
        }
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        let dispatcher =
            NotificationDispatcher::new(Arc::new(LogNotifier), Duration::from_secs(1), "http://x");
        let status = dispatcher
            .dispatch("alice@u.edu", "tok", TokenPurpose::Access)
            .await;
        assert_eq!(status, DeliveryStatus::Sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_notifier_times_out() {
        let dispatcher =
            NotificationDispatcher::new(Arc::new(Stalling), Duration::from_secs(5), "http://x");
        let status = dispatcher
            .dispatch("alice@u.edu", "tok", TokenPurpose::Invitation)
            .await;
        assert!(matches!(status, DeliveryStatus::Failed { reason } if reason.contains("timed out")));
    }

    #[tokio::test]
    async fn test_refusal_becomes_failed_status() {
        let dispatcher =
            NotificationDispatcher::new(Arc::new(Refusing), Duration::from_secs(5), "http://x");
        let status = dispatcher
            .dispatch("alice@u.edu", "tok", TokenPurpose::Access)
            .await;
        assert!(status.is_failed());
    }

    #[test]
    fn test_activation_link_trims_trailing_slash() {
        let dispatcher = NotificationDispatcher::new(
            Arc::new(LogNotifier),
            Duration::from_secs(1),
            "https://portal.u.edu/",
        );
        assert_eq!(
            dispatcher.activation_link("abc"),
            "https://portal.u.edu/activate?token=abc"
        );
    }

    #[test]
    fn test_message_debug_hides_token() {
        let message = TokenMessage {
            email: "alice@u.edu".into(),
            token: "very-secret".into(),
            link: "x".into(),
            purpose: TokenPurpose::Access,
        };
        assert!(!format!("{message:?}").contains("very-secret"));
    }
}
