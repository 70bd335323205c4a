//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Protected request:
//!     → access_control.rs (access token + live session → AuthContext)
//!     → rate_limit.rs (policy lookup, identity, token bucket)
//!     → handler
//!
//! Public request:
//!     → rate_limit.rs (keyed by client address)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Fail closed on authentication: any failed check rejects
//! - Admission state lives in memory; nothing here blocks on I/O

pub mod access_control;
pub mod bucket;
pub mod client_ip;
pub mod policy;
pub mod rate_limit;

pub use access_control::{access_control_middleware, AccessControlState};
pub use bucket::{BucketProbe, TokenBucket};
pub use policy::{normalize_path, PolicyTable, RouteKey, RouteLimitPolicy};
pub use rate_limit::{rate_limit_middleware, Admission, AdmissionController, MatchedRoute, RateLimitStatus};
