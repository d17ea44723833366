use crate::{
    auth::Principal,
    error::{AppError, ErrorResponse},
    models::{
        AccessToken, Category, CategoryRequest, ChangePasswordRequest, ContentFilter, ContentItem,
        ContentItemForm, RefreshRequest, RegisterUserRequest, TokenPair, TokenRequest,
        UpdateUserRequest, User,
    },
    stores::{CategoryStore, ContentStore, DocumentUpload, IdentityStore, UpdateMode},
};
use axum::{
    Json,
    extract::{FromRequest, Multipart, Path, Query, Request, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Serialize;
use uuid::Uuid;

// --- Request Payloads ---

/// ContentPayload
///
/// Body of content create/update. Accepts `multipart/form-data` (text fields,
/// `categories` repeated or comma separated, and an optional `document` file) or
/// a plain JSON `ContentItemForm`.
#[derive(Debug, Default)]
pub struct ContentPayload {
    pub form: ContentItemForm,
    pub document: Option<DocumentUpload>,
}

impl<S> FromRequest<S> for ContentPayload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("multipart/form-data"));

        if !is_multipart {
            let Json(form) = Json::<ContentItemForm>::from_request(req, state)
                .await
                .map_err(|rejection| AppError::validation(rejection.body_text()))?;
            return Ok(Self {
                form,
                document: None,
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| AppError::validation(rejection.body_text()))?;
        let mut payload = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::validation(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "document" {
                let filename = field.file_name().unwrap_or("document").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(e.body_text()))?;
                // Browsers send an empty part for an unselected file input.
                if !bytes.is_empty() {
                    payload.document = Some(DocumentUpload {
                        filename,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                continue;
            }

            let text = field
                .text()
                .await
                .map_err(|e| AppError::validation(e.body_text()))?;
            match name.as_str() {
                "title" => payload.form.title = Some(text),
                "body" => payload.form.body = Some(text),
                "summary" => payload.form.summary = Some(text),
                "categories" => {
                    let categories = payload.form.categories.get_or_insert_with(Vec::new);
                    for part in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                        let id = Uuid::parse_str(part).map_err(|_| {
                            AppError::validation(format!("invalid category id: {part}"))
                        })?;
                        categories.push(id);
                    }
                }
                other => tracing::debug!(field = %other, "ignoring unknown multipart field"),
            }
        }
        Ok(payload)
    }
}

/// Acknowledgement returned by `PUT /users/{id}/change-password`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatusMessage {
    pub status: String,
}

// --- Users ---

/// register_user
///
/// [Public Route] Creates an account. Anonymous callers always get an author
/// account; role flags are only honoured for administrators.
#[utoipa::path(
    post,
    path = "/users",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered", body = User),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 409, description = "Email or username taken", body = ErrorResponse)
    )
)]
pub async fn register_user(
    principal: Principal,
    State(store): State<IdentityStore>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = store.register(&principal, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// list_users
///
/// [Admin Route] Lists every account.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 403, description = "Not an administrator", body = ErrorResponse)
    )
)]
pub async fn list_users(
    principal: Principal,
    State(store): State<IdentityStore>,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(store.list(&principal).await?))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = User),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_user(
    principal: Principal,
    State(store): State<IdentityStore>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    Ok(Json(store.get(&principal, id).await?))
}

/// replace_user
///
/// [Authenticated Route] Full profile update. `email` is required; the caller must
/// be the account owner or an administrator.
#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses((status = 200, description = "Updated", body = User))
)]
pub async fn replace_user(
    principal: Principal,
    State(store): State<IdentityStore>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let user = store
        .update(&principal, id, payload, UpdateMode::Replace)
        .await?;
    Ok(Json(user))
}

#[utoipa::path(
    patch,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses((status = 200, description = "Updated", body = User))
)]
pub async fn patch_user(
    principal: Principal,
    State(store): State<IdentityStore>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    let user = store
        .update(&principal, id, payload, UpdateMode::Partial)
        .await?;
    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn delete_user(
    principal: Principal,
    State(store): State<IdentityStore>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    store.delete(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// get_me
///
/// [Authenticated Route] The caller's own profile.
#[utoipa::path(
    get,
    path = "/users/me",
    responses((status = 200, description = "Profile", body = User))
)]
pub async fn get_me(
    principal: Principal,
    State(store): State<IdentityStore>,
) -> Result<Json<User>, AppError> {
    Ok(Json(store.me(&principal).await?))
}

/// change_password
///
/// [Authenticated Route] Self-service password change. A wrong `old_password`
/// is a 400, not a 401: the caller is authenticated, the input is wrong.
#[utoipa::path(
    put,
    path = "/users/{id}/change-password",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = StatusMessage),
        (status = 400, description = "Old password incorrect", body = ErrorResponse),
        (status = 403, description = "Not the account owner", body = ErrorResponse)
    )
)]
pub async fn change_password(
    principal: Principal,
    State(store): State<IdentityStore>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<StatusMessage>, AppError> {
    store.change_password(&principal, id, payload).await?;
    Ok(Json(StatusMessage {
        status: "password updated".to_string(),
    }))
}

// --- Tokens ---

/// obtain_token
///
/// [Public Route] Exchanges credentials for an access/refresh token pair.
#[utoipa::path(
    post,
    path = "/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    )
)]
pub async fn obtain_token(
    State(store): State<IdentityStore>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenPair>, AppError> {
    Ok(Json(store.authenticate(payload).await?))
}

#[utoipa::path(
    post,
    path = "/token/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = AccessToken),
        (status = 401, description = "Refresh token rejected", body = ErrorResponse)
    )
)]
pub async fn refresh_token(
    State(store): State<IdentityStore>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AccessToken>, AppError> {
    Ok(Json(store.refresh(payload).await?))
}

// --- Content Items ---

/// list_content_items
///
/// [Public Route] Lists content items, optionally filtered by a case-insensitive
/// title substring (`?search=`).
#[utoipa::path(
    get,
    path = "/content-items",
    params(ContentFilter),
    responses((status = 200, description = "Content items", body = [ContentItem]))
)]
pub async fn list_content_items(
    principal: Principal,
    State(store): State<ContentStore>,
    Query(filter): Query<ContentFilter>,
) -> Result<Json<Vec<ContentItem>>, AppError> {
    let items = store.list(&principal, filter.search.as_deref()).await?;
    Ok(Json(items))
}

#[utoipa::path(
    get,
    path = "/content-items/{id}",
    params(("id" = Uuid, Path, description = "Content item ID")),
    responses(
        (status = 200, description = "Found", body = ContentItem),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_content_item(
    principal: Principal,
    State(store): State<ContentStore>,
    Path(id): Path<Uuid>,
) -> Result<Json<ContentItem>, AppError> {
    Ok(Json(store.get(&principal, id).await?))
}

/// create_content_item
///
/// [Authenticated Route] Creates a content item. Requires the author or admin role.
#[utoipa::path(
    post,
    path = "/content-items",
    request_body = ContentItemForm,
    responses(
        (status = 201, description = "Created", body = ContentItem),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 403, description = "Author role required", body = ErrorResponse)
    )
)]
pub async fn create_content_item(
    principal: Principal,
    State(store): State<ContentStore>,
    payload: ContentPayload,
) -> Result<(StatusCode, Json<ContentItem>), AppError> {
    let item = store
        .create(&principal, payload.form, payload.document)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

#[utoipa::path(
    put,
    path = "/content-items/{id}",
    params(("id" = Uuid, Path, description = "Content item ID")),
    request_body = ContentItemForm,
    responses((status = 200, description = "Updated", body = ContentItem))
)]
pub async fn replace_content_item(
    principal: Principal,
    State(store): State<ContentStore>,
    Path(id): Path<Uuid>,
    payload: ContentPayload,
) -> Result<Json<ContentItem>, AppError> {
    let item = store
        .update(
            &principal,
            id,
            payload.form,
            payload.document,
            UpdateMode::Replace,
        )
        .await?;
    Ok(Json(item))
}

#[utoipa::path(
    patch,
    path = "/content-items/{id}",
    params(("id" = Uuid, Path, description = "Content item ID")),
    request_body = ContentItemForm,
    responses((status = 200, description = "Updated", body = ContentItem))
)]
pub async fn patch_content_item(
    principal: Principal,
    State(store): State<ContentStore>,
    Path(id): Path<Uuid>,
    payload: ContentPayload,
) -> Result<Json<ContentItem>, AppError> {
    let item = store
        .update(
            &principal,
            id,
            payload.form,
            payload.document,
            UpdateMode::Partial,
        )
        .await?;
    Ok(Json(item))
}

#[utoipa::path(
    delete,
    path = "/content-items/{id}",
    params(("id" = Uuid, Path, description = "Content item ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn delete_content_item(
    principal: Principal,
    State(store): State<ContentStore>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    store.delete(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// download_document
///
/// [Public Route] Streams back the document attached to a content item.
#[utoipa::path(
    get,
    path = "/content-items/{id}/document",
    params(("id" = Uuid, Path, description = "Content item ID")),
    responses(
        (status = 200, description = "Document bytes"),
        (status = 404, description = "No document", body = ErrorResponse)
    )
)]
pub async fn download_document(
    principal: Principal,
    State(store): State<ContentStore>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (handle, object) = store.document(&principal, id).await?;
    let filename = handle.rsplit('/').next().unwrap_or("document").to_string();
    let headers = [
        (header::CONTENT_TYPE, object.content_type),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        ),
    ];
    Ok((headers, object.bytes))
}

// --- Categories ---

#[utoipa::path(
    get,
    path = "/categories",
    responses((status = 200, description = "Categories", body = [Category]))
)]
pub async fn list_categories(
    principal: Principal,
    State(store): State<CategoryStore>,
) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(store.list(&principal).await?))
}

#[utoipa::path(
    get,
    path = "/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 200, description = "Found", body = Category),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn get_category(
    principal: Principal,
    State(store): State<CategoryStore>,
    Path(id): Path<Uuid>,
) -> Result<Json<Category>, AppError> {
    Ok(Json(store.get(&principal, id).await?))
}

/// create_category
///
/// [Authenticated Route] Requires the author or admin role.
#[utoipa::path(
    post,
    path = "/categories",
    request_body = CategoryRequest,
    responses(
        (status = 201, description = "Created", body = Category),
        (status = 403, description = "Author role required", body = ErrorResponse)
    )
)]
pub async fn create_category(
    principal: Principal,
    State(store): State<CategoryStore>,
    Json(payload): Json<CategoryRequest>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let category = store.create(&principal, payload).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[utoipa::path(
    put,
    path = "/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body = CategoryRequest,
    responses((status = 200, description = "Updated", body = Category))
)]
pub async fn replace_category(
    principal: Principal,
    State(store): State<CategoryStore>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryRequest>,
) -> Result<Json<Category>, AppError> {
    let category = store
        .update(&principal, id, payload, UpdateMode::Replace)
        .await?;
    Ok(Json(category))
}

#[utoipa::path(
    patch,
    path = "/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    request_body = CategoryRequest,
    responses((status = 200, description = "Updated", body = Category))
)]
pub async fn patch_category(
    principal: Principal,
    State(store): State<CategoryStore>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryRequest>,
) -> Result<Json<Category>, AppError> {
    let category = store
        .update(&principal, id, payload, UpdateMode::Partial)
        .await?;
    Ok(Json(category))
}

/// delete_category
///
/// [Authenticated Route] Removes the category and its associations; the content
/// items themselves are kept.
#[utoipa::path(
    delete,
    path = "/categories/{id}",
    params(("id" = Uuid, Path, description = "Category ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = ErrorResponse)
    )
)]
pub async fn delete_category(
    principal: Principal,
    State(store): State<CategoryStore>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    store.delete(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
