//! Forgot-password and reset-password endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::password_reset::{request_reset, reset_password as apply_reset, ForgotOutcome, ResetOutcome};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::types::{ForgotPasswordRequest, ResetPasswordRequest};
use super::utils::{extract_client_ip, normalize_email, valid_email};
use crate::api::response::{error, success};

const MIN_PASSWORD_LENGTH: usize = 8;

/// Sent for every accepted forgot-password request, known address or not.
const FORGOT_ACCEPTED: &str =
    "If your email address exists in our system, a password reset link has been sent to it.";

const TOO_MANY_ATTEMPTS: &str = "Too many password reset attempts. Please try again later.";

/// Used for both unknown users and bad tokens so callers cannot tell the
/// two apart.
const RESET_REJECTED: &str = "The password reset token is invalid or has expired.";

#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset link queued if the account exists", body = crate::api::response::ApiResponse),
        (status = 422, description = "Validation failed"),
        (status = 429, description = "Throttled")
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(payload)) = payload else {
        return error("Invalid request payload.", StatusCode::BAD_REQUEST, None);
    };

    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return error(
            "Validation failed.",
            StatusCode::UNPROCESSABLE_ENTITY,
            Some(json!({"email": ["The email field is required."]})),
        );
    }
    if !valid_email(&email) {
        return error(
            "Validation failed.",
            StatusCode::UNPROCESSABLE_ENTITY,
            Some(json!({"email": ["The email field must be a valid email address."]})),
        );
    }

    let client_ip = extract_client_ip(&headers);
    let limiter = auth_state.rate_limiter();
    if limiter.check_ip(client_ip.as_deref(), RateLimitAction::ForgotPassword)
        == RateLimitDecision::Limited
        || limiter.check_email(&email, RateLimitAction::ForgotPassword)
            == RateLimitDecision::Limited
    {
        return error(TOO_MANY_ATTEMPTS, StatusCode::TOO_MANY_REQUESTS, None);
    }

    match request_reset(&pool, auth_state.config(), &email).await {
        Ok(ForgotOutcome::Sent) => success(FORGOT_ACCEPTED, StatusCode::OK, None),
        Ok(ForgotOutcome::Throttled) => {
            error(TOO_MANY_ATTEMPTS, StatusCode::TOO_MANY_REQUESTS, None)
        }
        Err(err) => {
            error!("Failed to process forgot-password request: {err}");
            error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            )
        }
    }
}

fn reset_field_errors(payload: &ResetPasswordRequest, email: &str) -> Map<String, Value> {
    let mut errors = Map::new();

    if email.is_empty() {
        errors.insert(
            "email".to_string(),
            json!(["The email field is required."]),
        );
    } else if !valid_email(email) {
        errors.insert(
            "email".to_string(),
            json!(["The email field must be a valid email address."]),
        );
    }

    if payload.token.trim().is_empty() {
        errors.insert(
            "token".to_string(),
            json!(["The token field is required."]),
        );
    }

    if payload.password.is_empty() {
        errors.insert(
            "password".to_string(),
            json!(["The password field is required."]),
        );
    } else if payload.password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.insert(
            "password".to_string(),
            json!(["The password field must be at least 8 characters."]),
        );
    } else if payload.password != payload.password_confirmation {
        errors.insert(
            "password".to_string(),
            json!(["The password field confirmation does not match."]),
        );
    }

    errors
}

#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password replaced", body = crate::api::response::ApiResponse),
        (status = 403, description = "Token invalid, expired, or user unknown"),
        (status = 422, description = "Validation failed"),
        (status = 429, description = "Throttled")
    ),
    tag = "auth"
)]
pub async fn reset_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> impl IntoResponse {
    let Some(Json(payload)) = payload else {
        return error("Invalid request payload.", StatusCode::BAD_REQUEST, None);
    };

    let email = normalize_email(&payload.email);
    let errors = reset_field_errors(&payload, &email);
    if !errors.is_empty() {
        return error(
            "Validation failed.",
            StatusCode::UNPROCESSABLE_ENTITY,
            Some(Value::Object(errors)),
        );
    }

    let client_ip = extract_client_ip(&headers);
    let limiter = auth_state.rate_limiter();
    if limiter.check_ip(client_ip.as_deref(), RateLimitAction::ResetPassword)
        == RateLimitDecision::Limited
        || limiter.check_email(&email, RateLimitAction::ResetPassword)
            == RateLimitDecision::Limited
    {
        return error(TOO_MANY_ATTEMPTS, StatusCode::TOO_MANY_REQUESTS, None);
    }

    match apply_reset(
        &pool,
        auth_state.config(),
        &email,
        &payload.token,
        &payload.password,
    )
    .await
    {
        Ok(ResetOutcome::Ok) => success(
            "Your password has been reset successfully.",
            StatusCode::OK,
            None,
        ),
        Ok(ResetOutcome::InvalidToken | ResetOutcome::InvalidUser) => {
            error(RESET_REJECTED, StatusCode::FORBIDDEN, None)
        }
        Err(err) => {
            error!("Failed to reset password: {err}");
            error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::NoopRateLimiter;
    use axum::body::to_bytes;
    use axum::response::Response;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;

    use super::super::state::AuthConfig;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://sesamo@127.0.0.1:1/sesamo")
            .unwrap()
    }

    fn state() -> Arc<AuthState> {
        Arc::new(AuthState::new(
            AuthConfig::new(SecretString::from("unit-test-key")),
            Arc::new(NoopRateLimiter),
        ))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn payload(email: &str, token: &str, password: &str, confirmation: &str) -> ResetPasswordRequest {
        ResetPasswordRequest {
            email: email.to_string(),
            token: token.to_string(),
            password: password.to_string(),
            password_confirmation: confirmation.to_string(),
        }
    }

    #[test]
    fn reset_field_errors_empty_for_valid_payload() {
        let payload = payload("alice@example.com", "token", "password123", "password123");
        assert!(reset_field_errors(&payload, "alice@example.com").is_empty());
    }

    #[test]
    fn reset_field_errors_flag_each_field() {
        let payload = payload("nope", "", "short", "short");
        let errors = reset_field_errors(&payload, "nope");

        assert_eq!(
            errors["email"][0],
            "The email field must be a valid email address."
        );
        assert_eq!(errors["token"][0], "The token field is required.");
        assert_eq!(
            errors["password"][0],
            "The password field must be at least 8 characters."
        );
    }

    #[test]
    fn reset_field_errors_flag_confirmation_mismatch() {
        let payload = payload(
            "alice@example.com",
            "token",
            "password123",
            "different123",
        );
        let errors = reset_field_errors(&payload, "alice@example.com");
        assert_eq!(
            errors["password"][0],
            "The password field confirmation does not match."
        );
    }

    #[tokio::test]
    async fn forgot_password_without_payload_is_rejected() {
        let response = forgot_password(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(state()),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forgot_password_with_omitted_email_returns_field_errors() {
        let payload: ForgotPasswordRequest = serde_json::from_str("{}").unwrap();
        let response = forgot_password(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(state()),
            Some(Json(payload)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["errors"]["email"][0], "The email field is required.");
    }

    #[tokio::test]
    async fn reset_password_with_omitted_token_returns_field_errors() {
        let payload: ResetPasswordRequest = serde_json::from_str(
            r#"{"email": "alice@example.com", "password": "password123",
                "password_confirmation": "password123"}"#,
        )
        .unwrap();
        let response = reset_password(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(state()),
            Some(Json(payload)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["errors"]["token"][0], "The token field is required.");
    }
}
