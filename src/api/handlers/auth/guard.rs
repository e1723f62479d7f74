//! Role-based access control for protected routes.

use axum::{
    extract::{Extension, Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use tracing::error;

use super::session::AuthedUser;
use super::storage::roles_of;
use crate::api::response::error;

/// Role set a route accepts. A user passes when they hold at least one of
/// the listed roles; matching ignores case and surrounding whitespace.
#[derive(Debug, Clone)]
pub struct RequiredRoles {
    any_of: Vec<String>,
}

impl RequiredRoles {
    #[must_use]
    pub fn any_of(roles: &[&str]) -> Self {
        Self {
            any_of: roles
                .iter()
                .map(|role| role.trim().to_lowercase())
                .collect(),
        }
    }

    fn allows(&self, user_roles: &[String]) -> bool {
        user_roles
            .iter()
            .map(|role| role.trim().to_lowercase())
            .any(|role| self.any_of.contains(&role))
    }
}

/// Middleware enforcing a `RequiredRoles` set. Must run inside
/// `require_auth`, which attaches the `AuthedUser` extension.
pub async fn require_roles(
    State(required): State<RequiredRoles>,
    Extension(pool): Extension<PgPool>,
    Extension(user): Extension<AuthedUser>,
    request: Request,
    next: Next,
) -> Response {
    let user_roles = match roles_of(&pool, user.id).await {
        Ok(roles) => roles,
        Err(err) => {
            error!("Failed to load roles for user {}: {err}", user.id);
            return error(
                "An unexpected error occurred. Please try again later.",
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
            );
        }
    };

    if !required.allows(&user_roles) {
        return error(
            "You do not have permission to access this resource.",
            StatusCode::FORBIDDEN,
            None,
        );
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn allows_any_matching_role() {
        let required = RequiredRoles::any_of(&["Admin", "Super Admin"]);
        assert!(required.allows(&roles(&["Admin"])));
        assert!(required.allows(&roles(&["User", "Super Admin"])));
        assert!(!required.allows(&roles(&["User"])));
        assert!(!required.allows(&[]));
    }

    #[test]
    fn matching_ignores_case_and_whitespace() {
        let required = RequiredRoles::any_of(&[" ADMIN "]);
        assert!(required.allows(&roles(&["admin"])));
        assert!(required.allows(&roles(&[" Admin "])));
        assert!(!required.allows(&roles(&["administrator"])));
    }
}
