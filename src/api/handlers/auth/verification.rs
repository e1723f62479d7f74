//! Email verification via signed links.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::register::unix_now;
use super::signed_link::{build_link, email_fingerprint, verify, VerifyOutcome};
use super::state::AuthState;
use super::storage::{find_user_by_email, find_user_by_id, mark_email_verified};
use super::types::{ResendVerificationRequest, SignedLinkParams};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::utils::{constant_time_eq, extract_client_ip, normalize_email, valid_email};
use crate::api::email::{enqueue_email, TEMPLATE_VERIFY_EMAIL};
use crate::api::response::{error, success};

const INVALID_LINK: &str = "Invalid verification link.";

#[utoipa::path(
    post,
    path = "/v1/auth/verify-email/{id}/{hash}",
    params(
        ("id" = Uuid, Path, description = "User id from the signed link"),
        ("hash" = String, Path, description = "Email fingerprint from the signed link"),
        SignedLinkParams
    ),
    responses(
        (status = 200, description = "Email verified", body = crate::api::response::ApiResponse),
        (status = 403, description = "Signature invalid or link expired"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email already verified")
    ),
    tag = "auth"
)]
pub async fn verify_email(
    Path((id, hash)): Path<(Uuid, String)>,
    Query(params): Query<SignedLinkParams>,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    // Signature first: nothing about the account leaks on a forged link.
    let outcome = match verify(
        auth_state.config().app_key(),
        id,
        &hash,
        params.expires,
        &params.signature,
        unix_now(),
    ) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Failed to verify link signature: {err}");
            return error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };
    if outcome != VerifyOutcome::Valid {
        return error(INVALID_LINK, StatusCode::FORBIDDEN, None);
    }

    let user = match find_user_by_id(&pool, id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return error("User not found.", StatusCode::NOT_FOUND, None);
        }
        Err(err) => {
            error!("Failed to lookup user for verification: {err}");
            return error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };

    if user.email_verified {
        return error("Email already verified.", StatusCode::CONFLICT, None);
    }

    // The fingerprint binds the link to the address it was issued for; a
    // mismatch means the email changed since signing.
    if !constant_time_eq(email_fingerprint(&user.email).as_bytes(), hash.as_bytes()) {
        return error(INVALID_LINK, StatusCode::FORBIDDEN, None);
    }

    match mark_email_verified(&pool, user.id).await {
        Ok(true) => {}
        Ok(false) => {
            // Lost the race with a concurrent verification.
            return error("Email already verified.", StatusCode::CONFLICT, None);
        }
        Err(err) => {
            error!("Failed to mark email verified: {err}");
            return error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    }

    info!(user_id = %user.id, event = "verified", "email verified");

    success("Email verified successfully.", StatusCode::OK, None)
}

#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification-email",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Verification link queued", body = crate::api::response::ApiResponse),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email already verified"),
        (status = 422, description = "Validation failed"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn resend_verification_email(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> impl IntoResponse {
    let Some(Json(payload)) = payload else {
        return error("Invalid request payload.", StatusCode::BAD_REQUEST, None);
    };

    let email = normalize_email(&payload.email);

    let client_ip = extract_client_ip(&headers);
    let limiter = auth_state.rate_limiter();
    if limiter.check_ip(client_ip.as_deref(), RateLimitAction::ResendVerification)
        == RateLimitDecision::Limited
        || limiter.check_email(&email, RateLimitAction::ResendVerification)
            == RateLimitDecision::Limited
    {
        return error(
            "Too many requests. Please try again later.",
            StatusCode::TOO_MANY_REQUESTS,
            None,
        );
    }

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

    let user = match find_user_by_email(&pool, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return error("User not found.", StatusCode::NOT_FOUND, None);
        }
        Err(err) => {
            error!("Failed to lookup user for resend: {err}");
            return error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };

    if user.email_verified {
        return error("Email already verified.", StatusCode::CONFLICT, None);
    }

    let link = match build_link(auth_state.config(), user.id, &user.email, unix_now()) {
        Ok(link) => link,
        Err(err) => {
            error!("Failed to build verification link: {err}");
            return error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };

    let payload_json = json!({
        "name": user.name,
        "email": user.email,
        "verify_url": link.url(auth_state.config().base_url()),
    });
    let result = async {
        let mut tx = pool.begin().await?;
        enqueue_email(&mut tx, &user.email, TEMPLATE_VERIFY_EMAIL, &payload_json).await?;
        tx.commit().await?;
        anyhow::Ok(())
    }
    .await;

    if let Err(err) = result {
        error!("Failed to enqueue verification email: {err}");
        return error(
            "An unexpected error occurred. Please try again later.",
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
        );
    }

    success("Verification link sent.", StatusCode::OK, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::NoopRateLimiter;
    use axum::body::to_bytes;
    use secrecy::SecretString;
    use serde_json::Value;
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

    #[tokio::test]
    async fn resend_without_payload_is_rejected() {
        let response = resend_verification_email(
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
    async fn resend_with_omitted_email_returns_field_errors() {
        let payload: ResendVerificationRequest = serde_json::from_str("{}").unwrap();
        let response = resend_verification_email(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(state()),
            Some(Json(payload)),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["errors"]["email"][0], "The email field is required.");
    }
}
