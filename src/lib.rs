use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod password;
pub mod policy;
pub mod repository;
pub mod storage;
pub mod stores;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::{AuthUser, TokenIssuer};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::AppError;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{InMemoryStorage, S3StorageClient, StorageState};
pub use stores::{CategoryStore, ContentStore, IdentityStore};

/// ApiDoc
///
/// OpenAPI document aggregated from every `#[utoipa::path]` handler and
/// `ToSchema` model. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::list_users, handlers::get_user,
        handlers::replace_user, handlers::patch_user, handlers::delete_user,
        handlers::get_me, handlers::change_password, handlers::obtain_token,
        handlers::refresh_token, handlers::list_content_items, handlers::get_content_item,
        handlers::create_content_item, handlers::replace_content_item,
        handlers::patch_content_item, handlers::delete_content_item,
        handlers::download_document, handlers::list_categories, handlers::get_category,
        handlers::create_category, handlers::replace_category, handlers::patch_category,
        handlers::delete_category
    ),
    components(
        schemas(
            models::User, models::ProfileFields, models::RegisterUserRequest,
            models::UpdateUserRequest, models::ChangePasswordRequest, models::TokenRequest,
            models::TokenPair, models::RefreshRequest, models::AccessToken,
            models::ContentItem, models::ContentItemForm, models::Category,
            models::CategoryRequest, error::ErrorResponse, handlers::StatusMessage,
        )
    ),
    tags(
        (name = "cms", description = "Content Management API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container for the repository, the storage service and the
/// loaded configuration. Stores are assembled from it per request via `FromRef`.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for IdentityStore {
    fn from_ref(app_state: &AppState) -> IdentityStore {
        IdentityStore::new(
            app_state.repo.clone(),
            TokenIssuer::from_config(&app_state.config),
        )
    }
}

impl FromRef<AppState> for ContentStore {
    fn from_ref(app_state: &AppState) -> ContentStore {
        ContentStore::new(app_state.repo.clone(), app_state.storage.clone())
    }
}

impl FromRef<AppState> for CategoryStore {
    fn from_ref(app_state: &AppState) -> CategoryStore {
        CategoryStore::new(app_state.repo.clone())
    }
}

/// auth_middleware
///
/// Runs the `AuthUser` extractor ahead of the handler. A missing, expired or
/// otherwise invalid credential is rejected with 401 before any handler code runs.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, applies scoped and global middleware and registers
/// the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");
    let body_limit = state.config.max_upload_bytes;

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: No middleware applied.
        .merge(public::public_routes())
        // Authenticated Routes: Protected by the `auth_middleware`.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Admin Routes: same authentication layer; the role check is the policy's.
        .merge(
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Uploaded documents travel in the request body.
        .layer(DefaultBodyLimit::max(body_limit))
        // Apply the Unified State to all routes.
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing, correlated by the generated request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span with method, URI and the `x-request-id` header so
/// every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
