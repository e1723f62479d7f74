//! # Sesamo
//!
//! `sesamo` is a user authentication and authorization API for single-page
//! and mobile frontends. It covers registration with role assignment, login
//! and logout via opaque bearer tokens, email verification through signed
//! links, and single-use password reset tokens.
//!
//! ## Tokens
//!
//! Bearer tokens are opaque random values; the database only stores a
//! SHA-256 fingerprint. A user holds one "current" token per device; the
//! refresh flow revokes the presented token before minting a replacement.
//!
//! ## Roles
//!
//! Roles (`Super Admin`, `Admin`, `Subscriber`, `User`) attach to users via
//! a join table. `Admin` and `Super Admin` are restricted: only an existing
//! administrator may grant them, and they cannot be mixed with other roles
//! at registration time.
//!
//! ## Enumeration resistance
//!
//! Login failures return a single generic message for both unknown emails
//! and wrong passwords, and forgot-password always answers 200 whether or
//! not the address exists.

pub mod api;
pub mod cli;
