use crate::api::handlers::{auth, health};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware,
    routing::options,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub(crate) mod email;
pub(crate) mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;
pub(crate) mod response;

pub use email::EmailWorkerConfig;
pub use openapi::openapi;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: auth::AuthConfig,
    email_config: email::EmailWorkerConfig,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let auth_state = Arc::new(auth::AuthState::new(
        auth_config,
        Arc::new(auth::NoopRateLimiter),
    ));

    // Background worker polls email_outbox (DB-backed queue) for pending rows,
    // delivers/logs them, and retries failures with exponential backoff.
    email::spawn_outbox_worker(pool.clone(), Arc::new(email::LogEmailSender), email_config);

    let frontend_origin = frontend_origin(auth_state.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    // Public routes carry the OpenAPI info; the guarded routers are built
    // separately so each can wear its own middleware, then docs are merged.
    let (router, mut api_doc) = openapi::public_router().split_for_parts();

    let (session_router, doc) = openapi::session_router().split_for_parts();
    api_doc.merge(doc);
    let session_router = session_router.route_layer(middleware::from_fn(auth::require_auth));

    let (admin_router, doc) = openapi::admin_router().split_for_parts();
    api_doc.merge(doc);
    let admin_router = admin_router.route_layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(auth::require_auth))
            .layer(middleware::from_fn_with_state(
                auth::RequiredRoles::any_of(&["Admin", "Super Admin"]),
                auth::guard::require_roles,
            )),
    );

    let (user_router, doc) = openapi::user_router().split_for_parts();
    api_doc.merge(doc);
    let user_router = user_router.route_layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(auth::require_auth))
            .layer(middleware::from_fn_with_state(
                auth::RequiredRoles::any_of(&["User"]),
                auth::guard::require_roles,
            )),
    );

    let (subscriber_router, doc) = openapi::subscriber_router().split_for_parts();
    api_doc.merge(doc);
    let subscriber_router = subscriber_router.route_layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(auth::require_auth))
            .layer(middleware::from_fn_with_state(
                auth::RequiredRoles::any_of(&["Subscriber"]),
                auth::guard::require_roles,
            )),
    );

    let app = router
        .merge(session_router)
        .merge(admin_router)
        .merge(user_router)
        .merge(subscriber_router)
        .merge(SwaggerUi::new("/v1/docs").url("/v1/api-docs/openapi.json", api_doc))
        .route("/health", options(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(axum::Extension(auth_state.clone()))
                .layer(axum::Extension(pool.clone())),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::frontend_origin;

    #[test]
    fn frontend_origin_strips_path_and_keeps_port() {
        let origin = frontend_origin("http://localhost:5173/app/").unwrap();
        assert_eq!(origin, "http://localhost:5173");

        let origin = frontend_origin("https://app.sesamo.dev").unwrap();
        assert_eq!(origin, "https://app.sesamo.dev");
    }

    #[test]
    fn frontend_origin_rejects_garbage() {
        assert!(frontend_origin("not a url").is_err());
    }
}
