//! Session security subsystem.
//!
//! # Data Flow
//! ```text
//! login / register
//!     → password.rs (Argon2id check)
//!     → manager.rs (create session, sign access token)
//!     → store.rs (persist refresh hash)
//!
//! authenticated request
//!     → tokens.rs (signature, issuer, expiry)
//!     → manager.rs (session still live, owner matches subject)
//!     → context.rs (AuthContext in request extensions)
//!
//! refresh
//!     → secrets.rs (hash presented secret)
//!     → store.rs (compare-and-replace hash)
//! ```

pub mod context;
pub mod manager;
pub mod memory;
pub mod password;
pub mod postgres;
pub mod secrets;
pub mod store;
pub mod tokens;

pub use context::AuthContext;
pub use manager::{
    AuthSnapshot, IssuedCredentials, NewSession, RotatedSession, SessionManager, UserProfile,
};
pub use memory::{MemorySessionStore, MemoryUserStore};
pub use postgres::{PgSessionStore, PgUserStore};
pub use store::{SessionRecord, SessionStore, UserRecord, UserStore};
pub use tokens::{IssuedAccessToken, TokenSigner, VerifiedAccess};
