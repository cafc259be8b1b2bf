use std::path::Path;

use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Method, Request},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;

use error::AppError;
use services::mailer::MailerState;

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
    pub mailer: MailerState,
}

const REQUEST_ID: &str = "x-request-id";

/// Builds the full application: `/health`, the JSON API under `/api`, and the
/// SPA bundle for every other path.
pub fn app(state: AppState) -> Router {
    // Reachable without a token
    let public_routes = Router::new()
        .nest("/auth", routes::auth::public_router())
        .nest("/courses", routes::courses::public_router());

    // Build protected routes (require authentication)
    let protected_routes = Router::new()
        .nest("/auth", routes::auth::router())
        .nest("/courses", routes::courses::router())
        .nest("/modules", routes::modules::router())
        .nest("/lessons", routes::lessons::router())
        .nest("/assignments", routes::assignments::router())
        .nest("/enrollments", routes::enrollments::router())
        .nest("/users", routes::users::router())
        .nest("/admin", routes::admin::router())
        .nest("/coupons", routes::coupons::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let api_router = public_routes
        .merge(protected_routes)
        .fallback(api_not_found);

    let request_id = HeaderName::from_static(REQUEST_ID);
    let cors = cors_layer(&state.config.cors_origins);
    let spa = spa_service(&state.config.static_dir);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_router)
        .fallback_service(spa)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(request_span)
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(PropagateRequestIdLayer::new(request_id)),
        )
        .layer(cors)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn api_not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}

fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        req_id = %request_id,
    )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Static files from the bundle; unknown paths get `index.html` so client-side
/// routes survive a reload.
fn spa_service(static_dir: &str) -> ServeDir<ServeFile> {
    let index = Path::new(static_dir).join("index.html");
    ServeDir::new(static_dir).fallback(ServeFile::new(index))
}
