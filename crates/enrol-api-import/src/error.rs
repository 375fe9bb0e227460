//! Error types for the provisioning API.
//!
//! Uses RFC 7807 Problem Details for HTTP APIs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use enrol_auth::{AuthError, PasswordValidationResult};
use enrol_db::{StoreError, TransitionRejected};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Base URL for error type URIs.
const ERROR_BASE_URL: &str = "https://enrol.dev/errors";

/// RFC 7807 Problem Details structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// URI identifying the problem type.
    #[serde(rename = "type")]
    pub error_type: String,

    /// Short human-readable summary.
    pub title: String,

    /// HTTP status code.
    pub status: u16,

    /// Human-readable explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Names of violated password rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
}

impl ProblemDetails {
    #[must_use]
    pub fn new(error_type: &str, title: &str, status: StatusCode) -> Self {
        Self {
            error_type: format!("{ERROR_BASE_URL}/{error_type}"),
            title: title.to_string(),
            status: status.as_u16(),
            detail: None,
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    #[must_use]
    pub fn with_violations(mut self, violations: Vec<String>) -> Self {
        self.violations = violations;
        self
    }
}

/// Provisioning errors.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// The upload could not be parsed as a CSV batch. Nothing was written.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Upload exceeds the configured size.
    #[error("File too large: {0}")]
    FileTooLarge(String),

    /// Upload has more data rows than allowed.
    #[error("Too many rows: {0}")]
    TooManyRows(String),

    /// No eligible user has this email. Never rendered to clients.
    #[error("Unknown user")]
    UnknownUser,

    #[error("Token not found")]
    TokenNotFound,

    #[error("Token expired")]
    TokenExpired,

    /// Consumed, or superseded by a newer token.
    #[error("Token already used")]
    TokenAlreadyUsed,

    #[error("Token not verified")]
    TokenNotVerified,

    /// Password rejected by the policy.
    #[error("Weak password: {}", .0.error_message())]
    WeakPassword(PasswordValidationResult),

    /// A store could not complete the call. Safe to retry.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProvisioningError {
    /// Convert to `ProblemDetails`.
    pub fn to_problem_details(&self) -> ProblemDetails {
        let status = self.status_code();
        match self {
            ProvisioningError::MalformedInput(msg) => {
                ProblemDetails::new("malformed-input", "Malformed Input", status)
                    .with_detail(msg.clone())
            }

            ProvisioningError::FileTooLarge(msg) => {
                ProblemDetails::new("file-too-large", "File Too Large", status)
                    .with_detail(msg.clone())
            }

            ProvisioningError::TooManyRows(msg) => {
                ProblemDetails::new("too-many-rows", "Too Many Rows", status)
                    .with_detail(msg.clone())
            }

            ProvisioningError::UnknownUser => {
                // Handlers map this to 202; reaching here is a handler bug.
                tracing::error!("Unknown user error reached the HTTP boundary");
                ProblemDetails::new("internal-error", "Internal Server Error", status)
                    .with_detail("An internal error occurred. Please try again later.")
            }

            ProvisioningError::TokenNotFound => {
                ProblemDetails::new("token-not-found", "Token Not Found", status)
                    .with_detail("The token is invalid.")
            }

            ProvisioningError::TokenExpired => {
                ProblemDetails::new("token-expired", "Token Expired", status)
                    .with_detail("The token has expired. Please request a new one.")
            }

            ProvisioningError::TokenAlreadyUsed => {
                ProblemDetails::new("token-already-used", "Token Already Used", status)
                    .with_detail("This token has already been used or was replaced by a newer one.")
            }

            ProvisioningError::TokenNotVerified => {
                ProblemDetails::new("token-not-verified", "Token Not Verified", status)
                    .with_detail("The token must be verified before a password can be set.")
            }

            ProvisioningError::WeakPassword(result) => {
                ProblemDetails::new("weak-password", "Weak Password", status)
                    .with_detail(result.error_message())
                    .with_violations(result.rules().into_iter().map(String::from).collect())
            }

            ProvisioningError::StoreUnavailable(msg) => {
                tracing::error!(error = %msg, "Store unavailable");
                ProblemDetails::new("store-unavailable", "Service Unavailable", status)
                    .with_detail("A backing store is unavailable. Please retry.")
            }

            ProvisioningError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal provisioning error");
                ProblemDetails::new("internal-error", "Internal Server Error", status)
                    .with_detail("An internal error occurred. Please try again later.")
            }
        }
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProvisioningError::MalformedInput(_) => StatusCode::BAD_REQUEST,
            ProvisioningError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProvisioningError::TooManyRows(_) => StatusCode::BAD_REQUEST,
            ProvisioningError::UnknownUser => StatusCode::INTERNAL_SERVER_ERROR,
            ProvisioningError::TokenNotFound => StatusCode::NOT_FOUND,
            ProvisioningError::TokenExpired => StatusCode::GONE,
            ProvisioningError::TokenAlreadyUsed => StatusCode::CONFLICT,
            ProvisioningError::TokenNotVerified => StatusCode::CONFLICT,
            ProvisioningError::WeakPassword(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ProvisioningError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProvisioningError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ProvisioningError {
    fn from(err: StoreError) -> Self {
        ProvisioningError::StoreUnavailable(err.to_string())
    }
}

impl From<TransitionRejected> for ProvisioningError {
    fn from(err: TransitionRejected) -> Self {
        match err {
            TransitionRejected::Expired => ProvisioningError::TokenExpired,
            TransitionRejected::AlreadyUsed => ProvisioningError::TokenAlreadyUsed,
            TransitionRejected::NotVerified => ProvisioningError::TokenNotVerified,
        }
    }
}

impl From<AuthError> for ProvisioningError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::WeakPassword(result) => ProvisioningError::WeakPassword(result),
            other => ProvisioningError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ProvisioningError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let problem = self.to_problem_details();

        let mut response = (status, Json(problem)).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );

        response
    }
}
