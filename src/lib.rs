//! Session gateway library.
//!
//! Request admission (per-route token buckets) and session security
//! (access tokens, rotating refresh secrets, revocation) for an HTTP API.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod session;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
pub use security::AdmissionController;
pub use session::SessionManager;
