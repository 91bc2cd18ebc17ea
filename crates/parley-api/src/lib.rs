pub mod conversations;
pub mod error;
pub mod middleware;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::state::AppState;

/// Authenticated conversation routes plus an open health check.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/conversations/direct", post(conversations::open_direct_conversation))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(protected_routes)
}
