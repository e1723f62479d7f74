//! Registration with role assignment and verification email enqueue.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info};

use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::roles::{check_registration_policy, is_restricted, lookup_role_ids, DEFAULT_ROLE};
use super::session::authenticate_bearer;
use super::signed_link::build_link;
use super::state::AuthState;
use super::storage::{insert_user, roles_of, sync_roles, InsertUserOutcome};
use super::types::RegisterRequest;
use super::utils::{
    extract_client_ip, hash_password, normalize_email, title_case_words, valid_email,
};
use crate::api::email::{enqueue_email, TEMPLATE_VERIFY_EMAIL};
use crate::api::response::{error, success};

const MIN_PASSWORD_LENGTH: usize = 8;

fn field_errors(payload: &RegisterRequest, email_normalized: &str) -> Map<String, Value> {
    let mut errors = Map::new();

    if payload.name.trim().is_empty() {
        errors.insert(
            "name".to_string(),
            json!(["The name field is required."]),
        );
    } else if payload.name.chars().count() > 255 {
        errors.insert(
            "name".to_string(),
            json!(["The name field must not be greater than 255 characters."]),
        );
    }

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

/// Canonicalize requested role names: trim/case-fold each word, drop
/// duplicates, and fall back to the default role when none were sent.
fn canonical_roles(requested: &[String]) -> Vec<String> {
    let mut roles: Vec<String> = Vec::new();
    for role in requested {
        let canonical = title_case_words(role);
        if !canonical.is_empty() && !roles.contains(&canonical) {
            roles.push(canonical);
        }
    }
    if roles.is_empty() {
        roles.push(DEFAULT_ROLE.to_string());
    }
    roles
}

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "User registered, verification email queued", body = crate::api::response::ApiResponse),
        (status = 401, description = "Restricted roles requested without authentication"),
        (status = 403, description = "Restricted roles requested by a non-administrator"),
        (status = 422, description = "Validation failed"),
        (status = 429, description = "Too many attempts"),
        (status = 500, description = "Registration could not be completed")
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let Some(Json(payload)) = payload else {
        return error("Invalid request payload.", StatusCode::BAD_REQUEST, None);
    };

    let email = normalize_email(&payload.email);

    let client_ip = extract_client_ip(&headers);
    let limiter = auth_state.rate_limiter();
    if limiter.check_ip(client_ip.as_deref(), RateLimitAction::Register)
        == RateLimitDecision::Limited
        || limiter.check_email(&email, RateLimitAction::Register) == RateLimitDecision::Limited
    {
        return error(
            "Too many registration attempts. Please try again later.",
            StatusCode::TOO_MANY_REQUESTS,
            None,
        );
    }

    let errors = field_errors(&payload, &email);
    if !errors.is_empty() {
        return error(
            "Validation failed.",
            StatusCode::UNPROCESSABLE_ENTITY,
            Some(Value::Object(errors)),
        );
    }

    let roles = canonical_roles(&payload.roles);

    // Restricted roles need the caller's identity; everyone else registers
    // anonymously.
    let caller_is_admin = if roles.iter().any(|role| is_restricted(role)) {
        match authenticate_bearer(&headers, &pool).await {
            Ok(Some((caller, _token))) => match roles_of(&pool, caller.id).await {
                Ok(caller_roles) => Some(caller_roles.iter().any(|role| is_restricted(role))),
                Err(err) => {
                    error!("Failed to load caller roles: {err}");
                    return error(
                        "Registration failed. Please try again later.",
                        StatusCode::INTERNAL_SERVER_ERROR,
                        None,
                    );
                }
            },
            Ok(None) => None,
            Err(err) => {
                error!("Failed to resolve caller token: {err}");
                return error(
                    "Registration failed. Please try again later.",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    None,
                );
            }
        }
    } else {
        None
    };

    let password_hash = match hash_password(&payload.password) {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return error(
                "Registration failed. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };

    // User creation, role sync, and the verification email are one
    // transaction; a failure anywhere leaves no partial account behind.
    let mut tx = match pool.begin().await {
        Ok(tx) => tx,
        Err(err) => {
            error!("Failed to begin registration transaction: {err}");
            return error(
                "Registration failed. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };

    // Unknown-role check precedes the policy rules; first failure wins.
    let role_ids = match lookup_role_ids(&mut tx, &roles).await {
        Ok(Ok(ids)) => ids,
        Ok(Err(violation)) => {
            let _ = tx.rollback().await;
            return error(
                &violation.message(),
                violation.status(),
                Some(json!({"roles": [violation.message()]})),
            );
        }
        Err(err) => {
            error!("Failed to resolve role ids: {err}");
            return error(
                "Registration failed. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };

    if let Err(violation) = check_registration_policy(&roles, caller_is_admin) {
        let _ = tx.rollback().await;
        let status = violation.status();
        let errors = if status == StatusCode::UNPROCESSABLE_ENTITY {
            Some(json!({"roles": [violation.message()]}))
        } else {
            None
        };
        return error(&violation.message(), status, errors);
    }

    let user_id = match insert_user(&mut tx, payload.name.trim(), &email, &password_hash).await {
        Ok(InsertUserOutcome::Created(id)) => id,
        Ok(InsertUserOutcome::EmailTaken) => {
            let _ = tx.rollback().await;
            return error(
                "Validation failed.",
                StatusCode::UNPROCESSABLE_ENTITY,
                Some(json!({"email": ["The email has already been taken."]})),
            );
        }
        Err(err) => {
            error!("Failed to insert user: {err}");
            return error(
                "Registration failed. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };

    if let Err(err) = sync_roles(&mut tx, user_id, &role_ids).await {
        error!("Failed to attach roles: {err}");
        return error(
            "Registration failed. Please try again later.",
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
        );
    }

    let now = unix_now();
    let link = match build_link(auth_state.config(), user_id, &email, now) {
        Ok(link) => link,
        Err(err) => {
            error!("Failed to build verification link: {err}");
            return error(
                "Registration failed. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };
    let email_payload = json!({
        "name": payload.name.trim(),
        "email": email,
        "verify_url": link.url(auth_state.config().base_url()),
    });
    if let Err(err) = enqueue_email(&mut tx, &email, TEMPLATE_VERIFY_EMAIL, &email_payload).await {
        error!("Failed to enqueue verification email: {err}");
        return error(
            "Registration failed. Please try again later.",
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
        );
    }

    if let Err(err) = tx.commit().await {
        error!("Failed to commit registration: {err}");
        return error(
            "Registration failed. Please try again later.",
            StatusCode::INTERNAL_SERVER_ERROR,
            None,
        );
    }

    info!(user_id = %user_id, event = "registered", "user registered");

    success(
        "User registered successfully. Please verify your email.",
        StatusCode::OK,
        None,
    )
}

pub(super) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(0))
}
