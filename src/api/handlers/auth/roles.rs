//! Role resolution and the registration role policy.

use anyhow::{Context, Result};
use sqlx::Row;
use tracing::Instrument;

pub(super) const DEFAULT_ROLE: &str = "User";

/// Roles only an existing administrator may grant.
const RESTRICTED_ROLES: [&str; 2] = ["Admin", "Super Admin"];

pub(super) fn is_restricted(role: &str) -> bool {
    RESTRICTED_ROLES
        .iter()
        .any(|restricted| restricted.eq_ignore_ascii_case(role.trim()))
}

/// First policy rule a registration request breaks. Checked in a fixed
/// order; callers surface exactly one violation per request.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum PolicyViolation {
    UnknownRole(String),
    AuthRequired,
    NotAdministrator,
    MixedRestricted,
    SubscriberRequiresUser,
}

impl PolicyViolation {
    pub(super) fn message(&self) -> String {
        match self {
            Self::UnknownRole(name) => format!("The selected role '{name}' is invalid."),
            Self::AuthRequired => "Authentication is required to assign admin roles.".to_string(),
            Self::NotAdministrator => {
                "Only existing administrators can assign Admin or Super Admin roles.".to_string()
            }
            Self::MixedRestricted => {
                "If Admin or Super Admin is selected, no other roles are allowed.".to_string()
            }
            Self::SubscriberRequiresUser => {
                "The Subscriber role requires the User role.".to_string()
            }
        }
    }

    /// Violations about the caller's identity map to auth status codes; the
    /// rest are plain validation failures.
    pub(super) fn status(&self) -> axum::http::StatusCode {
        match self {
            Self::AuthRequired => axum::http::StatusCode::UNAUTHORIZED,
            Self::NotAdministrator => axum::http::StatusCode::FORBIDDEN,
            Self::UnknownRole(_) | Self::MixedRestricted | Self::SubscriberRequiresUser => {
                axum::http::StatusCode::UNPROCESSABLE_ENTITY
            }
        }
    }
}

/// Enforce the registration role policy on canonicalized role names.
///
/// `caller_is_admin` is `None` when the request carried no resolvable bearer
/// token. Rules run in order; the first failure wins:
/// 1. restricted roles need an authenticated caller,
/// 2. the caller must itself be an administrator,
/// 3. restricted roles cannot be mixed with other roles,
/// 4. `Subscriber` requires `User`.
pub(super) fn check_registration_policy(
    roles: &[String],
    caller_is_admin: Option<bool>,
) -> Result<(), PolicyViolation> {
    let restricted_requested = roles.iter().any(|role| is_restricted(role));

    if restricted_requested {
        match caller_is_admin {
            None => return Err(PolicyViolation::AuthRequired),
            Some(false) => return Err(PolicyViolation::NotAdministrator),
            Some(true) => {}
        }
        if roles.iter().any(|role| !is_restricted(role)) {
            return Err(PolicyViolation::MixedRestricted);
        }
    }

    let has_subscriber = roles.iter().any(|role| role.eq_ignore_ascii_case("Subscriber"));
    let has_user = roles.iter().any(|role| role.eq_ignore_ascii_case("User"));
    if has_subscriber && !has_user {
        return Err(PolicyViolation::SubscriberRequiresUser);
    }

    Ok(())
}

/// Resolve canonical role names to their ids, failing on the first name the
/// roles table does not know.
pub(super) async fn lookup_role_ids(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    names: &[String],
) -> Result<Result<Vec<i64>, PolicyViolation>> {
    let query = "SELECT id FROM roles WHERE name = $1";
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(name)
            .fetch_optional(&mut **tx)
            .instrument(span)
            .await
            .context("failed to lookup role id")?;

        match row {
            Some(row) => ids.push(row.get("id")),
            None => return Ok(Err(PolicyViolation::UnknownRole(name.clone()))),
        }
    }
    Ok(Ok(ids))
}
