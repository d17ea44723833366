use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

// --- Field Bounds ---

pub const PASSWORD_MIN_LEN: usize = 8;
pub const TITLE_MAX_LEN: usize = 30;
pub const BODY_MAX_LEN: usize = 300;
pub const SUMMARY_MAX_LEN: usize = 60;
pub const CATEGORY_NAME_MAX_LEN: usize = 50;
pub const EMAIL_MAX_LEN: usize = 254;
pub const PROFILE_FIELD_MAX_LEN: usize = 150;

// --- Identity ---

/// UserRecord
///
/// The persisted `users` row, password hash included. Never serialized: every
/// outward representation goes through `User`, which has no hash field.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub pincode: Option<String>,
    pub is_admin: bool,
    pub is_author: bool,
    pub date_joined: DateTime<Utc>,
}

/// User
///
/// Public user representation returned by every `/users` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub username: Option<String>,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub pincode: Option<String>,
    pub is_admin: bool,
    pub is_author: bool,
    #[ts(type = "string")]
    pub date_joined: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            email: record.email,
            first_name: record.first_name,
            last_name: record.last_name,
            phone: record.phone,
            address: record.address,
            city: record.city,
            state: record.state,
            country: record.country,
            pincode: record.pincode,
            is_admin: record.is_admin,
            is_author: record.is_author,
            date_joined: record.date_joined,
        }
    }
}

/// Profile fields shared by registration and profile updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ProfileFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
}

impl ProfileFields {
    fn validate(&self) -> Result<(), AppError> {
        let fields = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("phone", &self.phone),
            ("address", &self.address),
            ("city", &self.city),
            ("state", &self.state),
            ("country", &self.country),
            ("pincode", &self.pincode),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                check_max_len(name, value, PROFILE_FIELD_MAX_LEN)?;
            }
        }
        Ok(())
    }
}

/// RegisterUserRequest
///
/// Body of `POST /users`. Role flags are honoured only when an administrator
/// creates the account; self-registration always yields an author.
#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub username: Option<String>,
    // Missing credentials fail `validate` with a 400 rather than a decode error.
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(flatten)]
    pub profile: ProfileFields,
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub is_author: Option<bool>,
}

impl RegisterUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        if let Some(username) = &self.username {
            check_required("username", username, PROFILE_FIELD_MAX_LEN)?;
        }
        self.profile.validate()
    }
}

/// NewUser
///
/// Insert payload handed to the repository once the password is hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub profile: ProfileFields,
    pub is_admin: bool,
    pub is_author: bool,
}

/// UpdateUserRequest
///
/// Body of `PUT`/`PATCH /users/{id}`. Absent fields are left untouched; `PUT`
/// additionally requires `email`. Passwords change only via `change-password`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(flatten)]
    pub profile: ProfileFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_author: Option<bool>,
}

impl UpdateUserRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        if let Some(username) = &self.username {
            check_required("username", username, PROFILE_FIELD_MAX_LEN)?;
        }
        self.profile.validate()
    }

    pub fn changes_roles(&self) -> bool {
        self.is_admin.is_some() || self.is_author.is_some()
    }
}

/// Column-level patch applied by `Repository::update_user`.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub profile: ProfileFields,
    pub is_admin: Option<bool>,
    pub is_author: Option<bool>,
}

impl From<UpdateUserRequest> for UserChanges {
    fn from(req: UpdateUserRequest) -> Self {
        Self {
            username: req.username,
            email: req.email.map(|email| normalize_email(&email)),
            profile: req.profile,
            is_admin: req.is_admin,
            is_author: req.is_author,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

// --- Tokens ---

/// TokenRequest
///
/// Credentials for `POST /token`. `identifier` is accepted as an alias of `email`.
#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenRequest {
    #[serde(alias = "identifier")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct AccessToken {
    pub access: String,
}

// --- Content ---

/// ContentItem
///
/// An editorial unit from the `content_items` table, with its category ids
/// aggregated from the `content_item_categories` join relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct ContentItem {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub summary: String,
    // Storage handle of the uploaded document, if any.
    pub document: Option<String>,
    pub categories: Vec<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// ContentItemForm
///
/// Text fields of a content create/update, decoded either from a JSON body or
/// from the non-file parts of a multipart body.
#[derive(Debug, Clone, Default, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct ContentItemForm {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub categories: Option<Vec<Uuid>>,
}

impl ContentItemForm {
    /// Full field set, as required by create and `PUT`.
    pub fn into_new(self, document: Option<String>) -> Result<NewContentItem, AppError> {
        let title = self.title.ok_or_else(|| AppError::validation("title is required"))?;
        let body = self.body.ok_or_else(|| AppError::validation("body is required"))?;
        let summary = self
            .summary
            .ok_or_else(|| AppError::validation("summary is required"))?;
        check_required("title", &title, TITLE_MAX_LEN)?;
        check_required("body", &body, BODY_MAX_LEN)?;
        check_required("summary", &summary, SUMMARY_MAX_LEN)?;

        Ok(NewContentItem {
            title,
            body,
            summary,
            document,
            categories: dedup(self.categories.unwrap_or_default()),
        })
    }

    /// Only the provided fields, as used by `PATCH`.
    pub fn into_changes(self, document: Option<String>) -> Result<ContentChanges, AppError> {
        if let Some(title) = &self.title {
            check_required("title", title, TITLE_MAX_LEN)?;
        }
        if let Some(body) = &self.body {
            check_required("body", body, BODY_MAX_LEN)?;
        }
        if let Some(summary) = &self.summary {
            check_required("summary", summary, SUMMARY_MAX_LEN)?;
        }
        Ok(ContentChanges {
            title: self.title,
            body: self.body,
            summary: self.summary,
            document,
            categories: self.categories.map(dedup),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewContentItem {
    pub title: String,
    pub body: String,
    pub summary: String,
    pub document: Option<String>,
    pub categories: Vec<Uuid>,
}

/// Patch applied by `Repository::update_content`. `categories: Some(_)` replaces
/// the whole association set; `None` leaves it as is.
#[derive(Debug, Clone, Default)]
pub struct ContentChanges {
    pub title: Option<String>,
    pub body: Option<String>,
    pub summary: Option<String>,
    pub document: Option<String>,
    pub categories: Option<Vec<Uuid>>,
}

impl From<NewContentItem> for ContentChanges {
    fn from(item: NewContentItem) -> Self {
        Self {
            title: Some(item.title),
            body: Some(item.body),
            summary: Some(item.summary),
            document: item.document,
            categories: Some(item.categories),
        }
    }
}

// --- Categories ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
}

/// Body of category create and update. `name` is optional only for `PATCH`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct CategoryRequest {
    #[serde(default)]
    pub name: Option<String>,
}

impl CategoryRequest {
    pub fn required_name(self) -> Result<String, AppError> {
        let name = self.name.ok_or_else(|| AppError::validation("name is required"))?;
        check_required("name", &name, CATEGORY_NAME_MAX_LEN)?;
        Ok(name)
    }
}

/// Query string of `GET /content-items`.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ContentFilter {
    /// Case-insensitive substring matched against the title.
    pub search: Option<String>,
}

// --- Validation Helpers ---

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), AppError> {
    let email = email.trim();
    check_max_len("email", email, EMAIL_MAX_LEN)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {
            Ok(())
        }
        _ => Err(AppError::validation("email must be a valid address")),
    }
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {PASSWORD_MIN_LEN} characters"
        )));
    }
    Ok(())
}

fn check_required(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} may not be blank")));
    }
    check_max_len(field, value, max)
}

fn check_max_len(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    if value.chars().count() > max {
        return Err(AppError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

fn dedup(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        if !unique.contains(&id) {
            unique.push(id);
        }
    }
    unique
}
