//! HTTP handlers for the provisioning API.

pub mod health;
pub mod import;
pub mod tokens;
