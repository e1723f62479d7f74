//! Bearer authentication middleware and logout.

use axum::{
    extract::{Extension, Request},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use tracing::error;

use super::tokens::{resolve_token, revoke_token};
use super::utils::extract_bearer_token;
use crate::api::response::{error, success};
use uuid::Uuid;

/// Authenticated user attached to the request by `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
}

/// Raw bearer token of the current request, kept for logout/refresh.
#[derive(Debug, Clone)]
pub struct CurrentToken(pub String);

/// Resolve an optional bearer token into a user.
///
/// `Ok(None)` means no token was presented or it did not resolve; only
/// storage failures are errors.
pub(super) async fn authenticate_bearer(
    headers: &HeaderMap,
    pool: &PgPool,
) -> anyhow::Result<Option<(AuthedUser, String)>> {
    let Some(token) = extract_bearer_token(headers) else {
        return Ok(None);
    };
    let Some(user) = resolve_token(pool, &token).await? else {
        return Ok(None);
    };
    Ok(Some((
        AuthedUser {
            id: user.id,
            name: user.name,
            email: user.email,
            email_verified: user.email_verified,
        },
        token,
    )))
}

/// Middleware guarding the protected routes.
///
/// Rejects requests without a resolvable bearer token, and verified-only
/// routes reject unverified accounts. On success the request carries
/// `AuthedUser` and `CurrentToken` extensions.
pub async fn require_auth(
    Extension(pool): Extension<PgPool>,
    mut request: Request,
    next: Next,
) -> Response {
    let (user, token) = match authenticate_bearer(request.headers(), &pool).await {
        Ok(Some(resolved)) => resolved,
        Ok(None) => {
            return error("Unauthenticated.", StatusCode::UNAUTHORIZED, None);
        }
        Err(err) => {
            error!("Failed to resolve bearer token: {err}");
            return error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };

    if !user.email_verified {
        return error(
            "Your email address is not verified.",
            StatusCode::FORBIDDEN,
            None,
        );
    }

    request.extensions_mut().insert(user);
    request.extensions_mut().insert(CurrentToken(token));
    next.run(request).await
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Token revoked", body = crate::api::response::ApiResponse),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    tag = "auth"
)]
pub async fn logout(
    Extension(pool): Extension<PgPool>,
    Extension(CurrentToken(token)): Extension<CurrentToken>,
) -> impl IntoResponse {
    // Revoking an already-revoked token is a no-op; logout stays idempotent.
    if let Err(err) = revoke_token(&pool, &token).await {
        error!("Failed to revoke access token: {err}");
        return error(
            "An unexpected error occurred. Please try again later.",
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
        );
    }

    success("Logged out successfully.", StatusCode::OK, None)
}
