//! Token endpoints (no authentication; the token is the credential).
//!
//! - POST /token/request: always 202, whether or not the email is known
//! - POST /token/verify:  `{token}` -> `{user_id}`
//! - POST /token/commit:  `{token, new_password}` -> `{user_id}`

use axum::{http::StatusCode, Extension, Json};

use crate::error::ProvisioningError;
use crate::models::{
    CommitPasswordRequest, TokenRequest, TokenRequestAccepted, UserIdResponse, VerifyTokenRequest,
};
use crate::router::ProvisioningState;

/// POST /token/request
///
/// Also serves as resend for imported users whose invitation never arrived.
pub async fn request_token(
    Extension(state): Extension<ProvisioningState>,
    Json(request): Json<TokenRequest>,
) -> Result<(StatusCode, Json<TokenRequestAccepted>), ProvisioningError> {
    match state.lifecycle.request_token(&request.email).await {
        Ok(_) => {}
        Err(ProvisioningError::UnknownUser) => {
            tracing::info!("Token requested for unknown or disabled account");
        }
        Err(e) => return Err(e),
    }

    Ok((StatusCode::ACCEPTED, Json(TokenRequestAccepted::default())))
}

/// POST /token/verify
pub async fn verify_token(
    Extension(state): Extension<ProvisioningState>,
    Json(request): Json<VerifyTokenRequest>,
) -> Result<Json<UserIdResponse>, ProvisioningError> {
    let user_id = state.lifecycle.verify_token(&request.token).await?;
    Ok(Json(UserIdResponse { user_id }))
}

/// POST /token/commit
pub async fn commit_password(
    Extension(state): Extension<ProvisioningState>,
    Json(request): Json<CommitPasswordRequest>,
) -> Result<Json<UserIdResponse>, ProvisioningError> {
    let user_id = state
        .lifecycle
        .commit_password(&request.token, &request.new_password)
        .await?;
    Ok(Json(UserIdResponse { user_id }))
}
