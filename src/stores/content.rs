use uuid::Uuid;

use super::UpdateMode;
use crate::{
    auth::Principal,
    error::AppError,
    models::{ContentChanges, ContentItem, ContentItemForm},
    policy::{Action, ResourceKind, require},
    repository::{RepositoryError, RepositoryState},
    storage::{StorageState, StoredObject},
};

/// A document file received with a content create/update.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// ContentStore
///
/// Content item CRUD, title search and the document blob round-trip.
#[derive(Clone)]
pub struct ContentStore {
    repo: RepositoryState,
    storage: StorageState,
}

impl ContentStore {
    pub fn new(repo: RepositoryState, storage: StorageState) -> Self {
        Self { repo, storage }
    }

    /// All items in insertion order, optionally filtered by a case-insensitive
    /// title substring. A blank search term matches everything.
    pub async fn list(
        &self,
        principal: &Principal,
        search: Option<&str>,
    ) -> Result<Vec<ContentItem>, AppError> {
        require(principal, Action::List, ResourceKind::ContentItem, None)?;
        let search = search.map(str::trim).filter(|term| !term.is_empty());
        Ok(self.repo.list_content(search).await?)
    }

    pub async fn get(&self, principal: &Principal, id: Uuid) -> Result<ContentItem, AppError> {
        require(principal, Action::Retrieve, ResourceKind::ContentItem, None)?;
        self.repo
            .get_content(id)
            .await?
            .ok_or_else(|| AppError::not_found("content item not found"))
    }

    pub async fn create(
        &self,
        principal: &Principal,
        form: ContentItemForm,
        document: Option<DocumentUpload>,
    ) -> Result<ContentItem, AppError> {
        require(principal, Action::Create, ResourceKind::ContentItem, None)?;
        let mut item = form.into_new(None)?;
        if let Some(document) = document {
            self.check_categories(&item.categories).await?;
            item.document = Some(self.upload(document).await?);
        }

        let created = self.repo.create_content(item).await?;
        tracing::info!(content_id = %created.id, created_by = %principal, "content item created");
        Ok(created)
    }

    /// `Replace` requires title, body and summary; in both modes a provided
    /// category list replaces the association set and an absent one keeps it.
    pub async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        form: ContentItemForm,
        document: Option<DocumentUpload>,
        mode: UpdateMode,
    ) -> Result<ContentItem, AppError> {
        require(principal, Action::Update, ResourceKind::ContentItem, None)?;
        let mut changes = match mode {
            UpdateMode::Replace => {
                let categories_given = form.categories.is_some();
                let mut changes = ContentChanges::from(form.into_new(None)?);
                if !categories_given {
                    changes.categories = None;
                }
                changes
            }
            UpdateMode::Partial => form.into_changes(None)?,
        };

        // Avoid storing a blob for an item that does not exist.
        if self.repo.get_content(id).await?.is_none() {
            return Err(AppError::not_found("content item not found"));
        }
        if let Some(document) = document {
            if let Some(categories) = &changes.categories {
                self.check_categories(categories).await?;
            }
            changes.document = Some(self.upload(document).await?);
        }

        let updated = self.repo.update_content(id, changes).await?;
        tracing::info!(content_id = %id, updated_by = %principal, "content item updated");
        Ok(updated)
    }

    pub async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), AppError> {
        require(principal, Action::Delete, ResourceKind::ContentItem, None)?;
        self.repo.delete_content(id).await?;
        tracing::info!(content_id = %id, deleted_by = %principal, "content item deleted");
        Ok(())
    }

    /// Returns the stored document handle and the stored object.
    pub async fn document(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<(String, StoredObject), AppError> {
        let item = self.get(principal, id).await?;
        let handle = item
            .document
            .ok_or_else(|| AppError::not_found("content item has no document"))?;
        let object = self.storage.retrieve(&handle).await?;
        Ok((handle, object))
    }

    // Run before an upload so a rejected write leaves no blob behind. The
    // repository still enforces the association on insert.
    async fn check_categories(&self, ids: &[Uuid]) -> Result<(), AppError> {
        let mut missing = Vec::new();
        for &id in ids {
            if self.repo.get_category(id).await?.is_none() {
                missing.push(id);
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RepositoryError::UnknownCategories(missing).into())
        }
    }

    async fn upload(&self, document: DocumentUpload) -> Result<String, AppError> {
        let extension = document_extension(&document.filename);
        let key = format!("documents/{}.{}", Uuid::new_v4(), extension);
        let handle = self
            .storage
            .store(&key, &document.content_type, document.bytes)
            .await?;
        tracing::debug!(%handle, filename = %document.filename, "document stored");
        Ok(handle)
    }
}

/// The extension used in a document's storage key: 1 to 10 ASCII alphanumerics,
/// lower-cased, else `bin`. The key is echoed in `Content-Disposition`.
pub fn document_extension(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(std::ffi::OsStr::to_str)
        .filter(|ext| (1..=10).contains(&ext.len()))
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "bin".to_string())
}
