//! Route handlers.

pub mod auth;
pub mod demo;
pub mod health;
