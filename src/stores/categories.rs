use uuid::Uuid;

use super::UpdateMode;
use crate::{
    auth::Principal,
    error::AppError,
    models::{Category, CategoryRequest},
    policy::{Action, ResourceKind, require},
    repository::RepositoryState,
};

/// CategoryStore
///
/// Category CRUD. Deleting a category clears it from every content item.
#[derive(Clone)]
pub struct CategoryStore {
    repo: RepositoryState,
}

impl CategoryStore {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    pub async fn list(&self, principal: &Principal) -> Result<Vec<Category>, AppError> {
        require(principal, Action::List, ResourceKind::Category, None)?;
        Ok(self.repo.list_categories().await?)
    }

    pub async fn get(&self, principal: &Principal, id: Uuid) -> Result<Category, AppError> {
        require(principal, Action::Retrieve, ResourceKind::Category, None)?;
        self.repo
            .get_category(id)
            .await?
            .ok_or_else(|| AppError::not_found("category not found"))
    }

    pub async fn create(
        &self,
        principal: &Principal,
        req: CategoryRequest,
    ) -> Result<Category, AppError> {
        require(principal, Action::Create, ResourceKind::Category, None)?;
        let category = self.repo.create_category(req.required_name()?).await?;
        tracing::info!(category_id = %category.id, created_by = %principal, "category created");
        Ok(category)
    }

    pub async fn update(
        &self,
        principal: &Principal,
        id: Uuid,
        req: CategoryRequest,
        mode: UpdateMode,
    ) -> Result<Category, AppError> {
        require(principal, Action::Update, ResourceKind::Category, None)?;
        if mode == UpdateMode::Partial && req.name.is_none() {
            // Nothing to change; still report a missing category.
            return self
                .repo
                .get_category(id)
                .await?
                .ok_or_else(|| AppError::not_found("category not found"));
        }
        let category = self.repo.update_category(id, req.required_name()?).await?;
        tracing::info!(category_id = %id, updated_by = %principal, "category updated");
        Ok(category)
    }

    pub async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), AppError> {
        require(principal, Action::Delete, ResourceKind::Category, None)?;
        self.repo.delete_category(id).await?;
        tracing::info!(category_id = %id, deleted_by = %principal, "category deleted");
        Ok(())
    }
}
