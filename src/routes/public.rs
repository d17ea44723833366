use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without credentials. Handlers still receive a `Principal`
/// so a caller that does send a token is resolved (and rejected if the token is bad).
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /users
        // Self-registration. An authenticated admin may also use it to pick role flags.
        .route("/users", post(handlers::register_user))
        // POST /token, POST /token/refresh
        // Credential exchange for an access/refresh pair, and access token renewal.
        .route("/token", post(handlers::obtain_token))
        .route("/token/refresh", post(handlers::refresh_token))
        // GET /content-items?search=...
        .route("/content-items", get(handlers::list_content_items))
        .route("/content-items/{id}", get(handlers::get_content_item))
        .route(
            "/content-items/{id}/document",
            get(handlers::download_document),
        )
        .route("/categories", get(handlers::list_categories))
        .route("/categories/{id}", get(handlers::get_category))
}
