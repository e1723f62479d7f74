//! Role-gated sample endpoints.
//!
//! These exist to exercise the auth and guard middleware end to end; each is
//! reachable only with a verified bearer token holding the matching role.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse};
use serde_json::json;

use super::auth::AuthedUser;
use crate::api::response::success;

fn area_response(user: &AuthedUser, message: &str) -> axum::response::Response {
    success(
        message,
        StatusCode::OK,
        Some(json!({
            "user": {
                "id": user.id,
                "name": user.name,
                "email": user.email,
            },
        })),
    )
}

#[utoipa::path(
    get,
    path = "/v1/admin",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Caller holds Admin or Super Admin", body = crate::api::response::ApiResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller lacks the required role")
    ),
    tag = "demo"
)]
pub async fn admin_area(user: Extension<AuthedUser>) -> impl IntoResponse {
    area_response(&user, "Welcome, administrator.")
}

#[utoipa::path(
    get,
    path = "/v1/user",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Caller holds the User role", body = crate::api::response::ApiResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller lacks the required role")
    ),
    tag = "demo"
)]
pub async fn user_area(user: Extension<AuthedUser>) -> impl IntoResponse {
    area_response(&user, "Welcome, user.")
}

#[utoipa::path(
    get,
    path = "/v1/subscriber",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Caller holds the Subscriber role", body = crate::api::response::ApiResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller lacks the required role")
    ),
    tag = "demo"
)]
pub async fn subscriber_area(user: Extension<AuthedUser>) -> impl IntoResponse {
    area_response(&user, "Welcome, subscriber.")
}
