use super::handlers::{auth, demo, health};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, mut spec) = public_router().split_for_parts();
    let (_router, session_spec) = session_router().split_for_parts();
    let (_router, admin_spec) = admin_router().split_for_parts();
    let (_router, user_spec) = user_router().split_for_parts();
    let (_router, subscriber_spec) = subscriber_router().split_for_parts();
    spec.merge(session_spec);
    spec.merge(admin_spec);
    spec.merge(user_spec);
    spec.merge(subscriber_spec);
    spec
}

/// Routes reachable without a bearer token.
///
/// Add new endpoints via `.routes(routes!(...))` so they are both served and
/// included in the generated `OpenAPI` spec.
pub(crate) fn public_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::register::register))
        .routes(routes!(auth::login::login))
        .routes(routes!(auth::verification::verify_email))
        .routes(routes!(auth::verification::resend_verification_email))
        .routes(routes!(auth::password::forgot_password))
        .routes(routes!(auth::password::reset_password))
}

/// Routes behind `require_auth` (bearer token + verified email).
pub(crate) fn session_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::login::refresh_token))
}

/// Demo routes get one router each so the server can attach a different
/// role guard to every set.
pub(crate) fn admin_router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(demo::admin_area))
}

pub(crate) fn user_router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(demo::user_area))
}

pub(crate) fn subscriber_router() -> OpenApiRouter {
    OpenApiRouter::new().routes(routes!(demo::subscriber_area))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    let mut sesamo_tag = Tag::new("sesamo");
    sesamo_tag.description = Some("User authentication and authorization API".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description =
        Some("Registration, login, email verification, password reset".to_string());

    let mut demo_tag = Tag::new("demo");
    demo_tag.description = Some("Role-gated sample endpoints".to_string());

    OpenApiBuilder::new()
        .info(info)
        .tags(Some(vec![sesamo_tag, auth_tag, demo_tag]))
        .build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(
            spec.info.description.as_deref(),
            Some(env!("CARGO_PKG_DESCRIPTION"))
        );

        let contact = spec.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Sesamo"));
            assert_eq!(contact.email.as_deref(), Some("team@sesamo.dev"));
        }

        let license = spec.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.name, "BSD-3-Clause");
            assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
        }
    }

    #[test]
    fn openapi_tags_and_paths() {
        let spec = openapi();
        let tags = spec.tags.clone().unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "sesamo"));
        assert!(tags.iter().any(|tag| tag.name == "auth"));

        for path in [
            "/v1/auth/register",
            "/v1/auth/login",
            "/v1/auth/logout",
            "/v1/auth/refresh-token",
            "/v1/auth/verify-email/{id}/{hash}",
            "/v1/auth/resend-verification-email",
            "/v1/auth/forgot-password",
            "/v1/auth/reset-password",
            "/v1/admin",
            "/v1/user",
            "/v1/subscriber",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing path {path}");
        }
    }
}
