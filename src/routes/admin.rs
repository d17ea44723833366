use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// User management reserved for administrators. The router is wrapped in the
/// authentication middleware; the admin check itself is made by the access
/// policy, so a non-admin gets a 403 rather than a 404.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /users
        .route("/users", get(handlers::list_users))
        // GET/DELETE /users/{id}
        .route(
            "/users/{id}",
            get(handlers::get_user).delete(handlers::delete_user),
        )
}
