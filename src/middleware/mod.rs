//! Middleware for the QuickCash API
//!
//! Request tracing, security headers, and actor-identity extraction.
//! Authentication itself (tokens, sessions) is owned by the identity
//! service in front of this API; by the time a request lands here the
//! actor headers are trusted.

pub mod actor;
mod security;
mod tracing;

pub use actor::{ActorContext, ActorRole, AdminActor};
pub use security::security_headers;
pub use tracing::request_tracing;
