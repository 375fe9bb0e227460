//! Bulk university onboarding and token provisioning.
//!
//! This crate provides:
//! - CSV bulk import that creates `pending` users and reports every row
//! - Single-use, time-bounded tokens: request, verify, commit a password
//! - A notifier seam for out-of-band token delivery
//!
//! # Example
//!
//! ```rust,ignore
//! use enrol_api_import::{provisioning_router, ProvisioningState};
//!
//! let state = ProvisioningState::new(pipeline, lifecycle);
//! let app = axum::Router::new().merge(provisioning_router(state));
//! ```

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod validation;

pub use error::{ProblemDetails, ProvisioningError};
pub use models::{
    CsvDelimiter, DeliveryStatus, DuplicateSource, ImportConfig, ImportReport, ImportSummary,
    RowOutcome, RowReport, TokenConfig,
};
pub use router::{provisioning_router, ProvisioningState};
pub use services::{
    Clock, IngestPipeline, LogNotifier, NotificationDispatcher, Notifier, NotifierError,
    SystemClock, TokenLifecycleManager, TokenMessage, WebhookNotifier,
};
