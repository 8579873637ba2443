//! Signature Request Service
//!
//! Lets a sender ask one or more recipients to sign a document, tracks who
//! has signed, and keeps every signed PDF as a numbered version.
//!
//! ## Architecture
//!
//! - **Lifecycle**: pure state transitions of a signature request
//! - **Store**: in-memory requests, snapshotted to disk, one lock per request
//! - **Collaborators**: user directory, blob store and notifier behind traits
//! - **API**: axum routes; the caller identity comes from the auth gateway

pub mod api;
pub mod auth;
pub mod blob;
pub mod config;
pub mod directory;
pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod state;
pub mod store;
pub mod types;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
