//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, timeouts, body limit, CORS)
//!     → request.rs (request id, metrics)
//!     → security (authentication, admission)
//!     → handlers.rs (auth endpoints)
//!     → error.rs / cookies.rs (response shaping)
//! ```

pub mod cookies;
pub mod error;
pub mod handlers;
pub mod request;
pub mod server;

pub use cookies::CookieSettings;
pub use error::ApiError;
pub use request::X_REQUEST_ID;
pub use server::{AppState, GatewayServer};
