//! Login and token refresh.

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

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::{AuthedUser, CurrentToken};
use super::state::AuthState;
use super::storage::{find_user_by_email, roles_of};
use super::tokens::{issue_token, revoke_token};
use super::types::LoginRequest;
use super::utils::{extract_client_ip, normalize_email, valid_email, verify_password};
use crate::api::response::{error, success};

const REFRESH_FAILED: &str =
    "An unexpected error occurred during refresh token generation. Please try again later.";

fn field_errors(payload: &LoginRequest, email_normalized: &str) -> Map<String, Value> {
    let mut errors = Map::new();

    if email_normalized.is_empty() {
        errors.insert(
            "email".to_string(),
            json!(["The email field is required."]),
        );
    } else if !valid_email(email_normalized) {
        errors.insert(
            "email".to_string(),
            json!(["The email field must be a valid email address."]),
        );
    }

    if payload.password.is_empty() {
        errors.insert(
            "password".to_string(),
            json!(["The password field is required."]),
        );
    }

    errors
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = crate::api::response::ApiResponse),
        (status = 401, description = "Unknown email or wrong password"),
        (status = 403, description = "Email not verified"),
        (status = 422, description = "Validation failed"),
        (status = 429, description = "Too many attempts"),
        (status = 500, description = "Login could not be completed")
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let Some(Json(payload)) = payload else {
        return error("Invalid request payload.", StatusCode::BAD_REQUEST, None);
    };

    let email = normalize_email(&payload.email);
    let errors = field_errors(&payload, &email);
    if !errors.is_empty() {
        return error(
            "Validation failed.",
            StatusCode::UNPROCESSABLE_ENTITY,
            Some(Value::Object(errors)),
        );
    }

    let client_ip = extract_client_ip(&headers);
    let limiter = auth_state.rate_limiter();
    if limiter.check_ip(client_ip.as_deref(), RateLimitAction::Login) == RateLimitDecision::Limited
        || limiter.check_email(&email, RateLimitAction::Login) == RateLimitDecision::Limited
    {
        return error(
            "Too many login attempts. Please try again later.",
            StatusCode::TOO_MANY_REQUESTS,
            None,
        );
    }

    // Unknown email and wrong password share one message so the endpoint
    // cannot be used to probe for accounts.
    let user = match find_user_by_email(&pool, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return error("Invalid credentials.", StatusCode::UNAUTHORIZED, None);
        }
        Err(err) => {
            error!("Failed to lookup user for login: {err}");
            return error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };

    match verify_password(&payload.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => {
            return error("Invalid credentials.", StatusCode::UNAUTHORIZED, None);
        }
        Err(err) => {
            error!("Failed to verify password: {err}");
            return error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    }

    if !user.email_verified {
        return error(
            "Please verify your email first.",
            StatusCode::FORBIDDEN,
            None,
        );
    }

    let access_token = match issue_token(&pool, user.id).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue access token: {err}");
            return error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };

    let role_names = match roles_of(&pool, user.id).await {
        Ok(roles) => roles,
        Err(err) => {
            error!("Failed to load user roles: {err}");
            return error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };

    success(
        "Login successful.",
        StatusCode::OK,
        Some(json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": auth_state.config().token_ttl_seconds(),
            "user": {
                "id": user.id,
                "name": user.name,
                "email": user.email,
                "role_names": role_names,
            },
        })),
    )
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh-token",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Replacement token issued", body = crate::api::response::ApiResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 500, description = "Refresh could not be completed")
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    Extension(pool): Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    user: Extension<AuthedUser>,
    Extension(CurrentToken(current)): Extension<CurrentToken>,
) -> impl IntoResponse {
    // Revoke first so the presented token dies even if minting fails; the
    // client can always log in again.
    if let Err(err) = revoke_token(&pool, &current).await {
        error!("Failed to revoke token during refresh: {err}");
        return error(REFRESH_FAILED, StatusCode::INTERNAL_SERVER_ERROR, None);
    }

    let access_token = match issue_token(&pool, user.id).await {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to issue replacement token: {err}");
            return error(REFRESH_FAILED, StatusCode::INTERNAL_SERVER_ERROR, None);
        }
    };

    success(
        "Refresh token created successfully.",
        StatusCode::OK,
        Some(json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": auth_state.config().token_ttl_seconds(),
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::NoopRateLimiter;
    use axum::body::to_bytes;
    use axum::response::Response;
    use secrecy::SecretString;
    use sqlx::postgres::PgPoolOptions;
    use uuid::Uuid;

    use super::super::state::AuthConfig;

    // Pool pointing at a closed port; validation paths never touch it and
    // storage paths fail fast with a connection error.
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

    #[test]
    fn field_errors_flag_missing_credentials() {
        let errors = field_errors(&LoginRequest::default(), "");
        assert_eq!(errors["email"][0], "The email field is required.");
        assert_eq!(errors["password"][0], "The password field is required.");

        let payload = LoginRequest {
            email: "not-an-email".to_string(),
            password: "secret".to_string(),
        };
        let errors = field_errors(&payload, "not-an-email");
        assert_eq!(
            errors["email"][0],
            "The email field must be a valid email address."
        );
        assert!(errors.get("password").is_none());
    }

    #[tokio::test]
    async fn login_without_payload_is_rejected() {
        let response = login(
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
    async fn login_with_omitted_fields_returns_field_errors() {
        let payload: LoginRequest = serde_json::from_str("{}").unwrap();
        let response = login(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(state()),
            Some(Json(payload)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Validation failed.");
        assert_eq!(body["errors"]["email"][0], "The email field is required.");
        assert_eq!(
            body["errors"]["password"][0],
            "The password field is required."
        );
    }

    #[tokio::test]
    async fn refresh_reports_internal_error_when_storage_is_down() {
        let user = AuthedUser {
            id: Uuid::new_v4(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            email_verified: true,
        };
        let response = refresh_token(
            Extension(lazy_pool()),
            Extension(state()),
            Extension(user),
            Extension(CurrentToken("token".to_string())),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["message"], REFRESH_FAILED);
    }
}
