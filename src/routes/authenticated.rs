use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Every route here requires a valid session. Role checks (author for content
/// writes, self-or-admin for profile edits) are made by the access policy.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /users/me
        .route("/users/me", get(handlers::get_me))
        // PUT/PATCH /users/{id}
        // Profile edits by the account owner or an administrator.
        .route(
            "/users/{id}",
            put(handlers::replace_user).patch(handlers::patch_user),
        )
        // PUT /users/{id}/change-password
        // Self only; the old password must verify.
        .route(
            "/users/{id}/change-password",
            put(handlers::change_password),
        )
        // --- Content Items ---
        // Accept JSON or multipart/form-data with an optional `document` file.
        .route("/content-items", post(handlers::create_content_item))
        .route(
            "/content-items/{id}",
            put(handlers::replace_content_item)
                .patch(handlers::patch_content_item)
                .delete(handlers::delete_content_item),
        )
        // --- Categories ---
        .route("/categories", post(handlers::create_category))
        .route(
            "/categories/{id}",
            put(handlers::replace_category)
                .patch(handlers::patch_category)
                .delete(handlers::delete_category),
        )
}
