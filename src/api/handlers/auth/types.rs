//! Request payloads for the auth endpoints.

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

// Every field defaults so a body with fields omitted still deserializes and
// the handlers can answer 422 with per-field errors instead of a bare 400.

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    /// Role names to attach; defaults to `User` when empty.
    pub roles: Vec<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub token: String,
    pub password: String,
    pub password_confirmation: String,
}

/// Query half of a signed verification link.
#[derive(Debug, Deserialize, IntoParams)]
pub struct SignedLinkParams {
    pub expires: i64,
    pub signature: String,
}
