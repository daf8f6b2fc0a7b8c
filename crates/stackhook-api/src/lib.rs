//! Webhook server for stackhook.
//!
//! Accepts GitHub webhooks, hands them to the lifecycle orchestrator and
//! serves the secret bundle upload form.

pub mod error;
pub mod routes;
pub mod state;

pub use state::{AppState, build_lifecycle};
