//! Business logic for the provisioning API.

pub mod csv_parser;
pub mod ingest;
pub mod notifier;
pub mod report_csv;
pub mod token_lifecycle;

pub use ingest::IngestPipeline;
pub use notifier::{
    LogNotifier, NotificationDispatcher, Notifier, NotifierError, TokenMessage, WebhookNotifier,
};
pub use token_lifecycle::{Clock, Dispatched, IssuedToken, SystemClock, TokenLifecycleManager};
