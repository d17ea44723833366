use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Category, ContentChanges, ContentItem, NewContentItem, NewUser, UserChanges, UserRecord,
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// RepositoryError
///
/// Persistence failures. Constraint outcomes (`NotFound`, `Conflict`,
/// `UnknownCategories`) are distinguished from backend failures so the request
/// boundary can map them to client errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("unknown category ids: {0:?}")]
    UnknownCategories(Vec<Uuid>),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Verifies a stored password hash inside `Repository::replace_password`.
pub type PasswordCheck<'a> = dyn Fn(&str) -> bool + Send + Sync + 'a;

/// Repository Trait
///
/// The persistence collaborator. Handlers and stores only see this trait, so the
/// Postgres implementation and the in-memory one are interchangeable.
///
/// Every multi-statement method (password replacement, content writes that touch
/// the category association) is a single unit of work.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    // Fails with `Conflict` when the email or username is taken.
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, RepositoryError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepositoryError>;
    // `email` must already be normalized (lower-cased, trimmed).
    async fn find_user_by_email(&self, email: &str)
    -> Result<Option<UserRecord>, RepositoryError>;
    async fn list_users(&self) -> Result<Vec<UserRecord>, RepositoryError>;
    // Applies only the `Some` fields.
    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<UserRecord, RepositoryError>;
    async fn delete_user(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// Reads the current hash, runs `check` on it and, only if it passes, stores
    /// `new_hash`, all under one lock. Returns whether the hash was replaced.
    async fn replace_password(
        &self,
        id: Uuid,
        check: &PasswordCheck<'_>,
        new_hash: String,
    ) -> Result<bool, RepositoryError>;

    // --- Content Items ---
    // Insertion order. `search` is a case-insensitive title substring.
    async fn list_content(&self, search: Option<&str>)
    -> Result<Vec<ContentItem>, RepositoryError>;
    async fn get_content(&self, id: Uuid) -> Result<Option<ContentItem>, RepositoryError>;
    // Fails with `UnknownCategories` if any category id does not exist.
    async fn create_content(&self, item: NewContentItem) -> Result<ContentItem, RepositoryError>;
    // `changes.categories`, when present, replaces the whole association set.
    async fn update_content(
        &self,
        id: Uuid,
        changes: ContentChanges,
    ) -> Result<ContentItem, RepositoryError>;
    // Removes the row and its associations.
    async fn delete_content(&self, id: Uuid) -> Result<(), RepositoryError>;

    // --- Categories ---
    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError>;
    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, RepositoryError>;
    async fn create_category(&self, name: String) -> Result<Category, RepositoryError>;
    async fn update_category(&self, id: Uuid, name: String) -> Result<Category, RepositoryError>;
    // Clears the category from every content item; the items themselves stay.
    async fn delete_category(&self, id: Uuid) -> Result<(), RepositoryError>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer held in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

/// Escapes `LIKE` metacharacters so user input is matched literally.
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
