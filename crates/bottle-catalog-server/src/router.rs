use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with all catalog endpoints.
///
/// Static routes take precedence over `/:kind`, so `/signatures`,
/// `/location` and `/health` never reach the object handlers.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handler::health))
        .route("/signatures", get(handler::signatures))
        .route("/signature/validate", get(handler::validate_signature))
        .route("/location", get(handler::locations))
        .route(
            "/:kind",
            get(handler::get_objects).put(handler::put_object),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
