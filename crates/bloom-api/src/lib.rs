pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod flowers;
pub mod me;
pub mod middleware;
pub mod rate_limit;
pub mod state;

use axum::{Json, Router, middleware as axum_middleware, routing::get, routing::post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the full application router. Auth endpoints sit behind the
/// fixed-window rate limiter, flower and profile endpoints behind bearer
/// authentication, and gift opening is public.
pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/request-otp", post(auth::request_otp))
        .route("/auth/verify-otp", post(auth::verify_otp))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit::limit_auth_requests,
        ));

    let protected_routes = Router::new()
        .route(
            "/flowers",
            post(flowers::create_flower).get(flowers::list_flowers),
        )
        .route("/flowers/{flower_id}/water", post(flowers::water_flower))
        .route("/flowers/{flower_id}/send", post(flowers::send_flower))
        .route("/me", get(me::me))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/flowers/open/{share_token}", get(flowers::open_flower));

    let api = auth_routes.merge(protected_routes).merge(public_routes);

    Router::new()
        .route("/", get(root))
        .nest(&state.config.api_prefix, api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "service": "bloom", "status": "ok" }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
