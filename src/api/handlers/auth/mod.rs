//! Auth handlers and supporting modules.
//!
//! Registration, login, logout, token refresh, signed-link email
//! verification, and password reset all live here, together with the role
//! policy they share.
//!
//! ## Tokens
//!
//! Access tokens and password reset tokens are 32 random bytes, base64url
//! encoded. The database only ever sees their SHA-256 hashes.
//!
//! ## Roles
//!
//! `Admin` and `Super Admin` are restricted roles: only an authenticated
//! administrator may assign them, and never mixed with other roles. Route
//! guards match role names case-insensitively.

pub(crate) mod guard;
pub(crate) mod login;
pub(crate) mod password;
mod password_reset;
mod rate_limit;
pub(crate) mod register;
mod roles;
pub(crate) mod session;
mod signed_link;
mod state;
mod storage;
mod tokens;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use guard::RequiredRoles;
pub use rate_limit::NoopRateLimiter;
pub use session::{require_auth, AuthedUser};
pub use state::{AuthConfig, AuthState};
