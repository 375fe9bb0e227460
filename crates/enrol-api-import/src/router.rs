//! Router and state for the provisioning API.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};

use crate::handlers;
use crate::services::{IngestPipeline, TokenLifecycleManager};

/// Room for multipart framing and the `delimiter` field on top of the file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared state for provisioning routes.
#[derive(Clone)]
pub struct ProvisioningState {
    pub pipeline: Arc<IngestPipeline>,
    pub lifecycle: Arc<TokenLifecycleManager>,
}

impl ProvisioningState {
    pub fn new(pipeline: Arc<IngestPipeline>, lifecycle: Arc<TokenLifecycleManager>) -> Self {
        Self {
            pipeline,
            lifecycle,
        }
    }
}

/// Create the provisioning router.
///
/// - POST /bulk-import    (multipart CSV upload)
/// - POST /token/request
/// - POST /token/verify
/// - POST /token/commit
/// - GET  /healthz
pub fn provisioning_router(state: ProvisioningState) -> Router {
    let upload_limit = state.pipeline.config().max_file_bytes + MULTIPART_OVERHEAD_BYTES;

    let import_routes = Router::new()
        .route("/bulk-import", post(handlers::import::bulk_import))
        .layer(DefaultBodyLimit::max(upload_limit));

    let token_routes = Router::new()
        .route("/token/request", post(handlers::tokens::request_token))
        .route("/token/verify", post(handlers::tokens::verify_token))
        .route("/token/commit", post(handlers::tokens::commit_password));

    Router::new()
        .merge(import_routes)
        .merge(token_routes)
        .route("/healthz", get(handlers::health::healthz))
        .layer(Extension(state))
}
