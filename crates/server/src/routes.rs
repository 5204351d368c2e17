//! Route configuration.

use crate::deadline::request_deadline;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::trace::trace_id_middleware;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::timeout::RequestBodyTimeoutLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let server = &state.config.server;
    let body_limit = usize::try_from(server.max_upload_size).unwrap_or(usize::MAX);
    let read_timeout = server.read_timeout();
    let write_timeout = server.write_timeout();

    let api_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .route(
            "/v1/files",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/v1/files/{external_id}", get(handlers::download_file))
        .route(
            "/v1/files/{external_id}/metadata",
            get(handlers::get_file_metadata),
        );

    let mut router = Router::new().merge(api_routes);

    // When enabled, restrict this endpoint to the Prometheus scraper at the
    // network level.
    if server.metrics_enabled {
        let metrics_routes = Router::new().route("/metrics", get(metrics_handler));
        router = router.merge(metrics_routes);
    }

    // Layers run outermost first: trace, trace id, request deadline, body deadline.
    router
        .layer(RequestBodyTimeoutLayer::new(read_timeout))
        .layer(middleware::from_fn_with_state(
            write_timeout,
            request_deadline,
        ))
        .layer(middleware::from_fn(trace_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
