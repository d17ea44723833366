use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{PasswordCheck, Repository, RepositoryError};
use crate::models::{
    Category, ContentChanges, ContentItem, NewContentItem, NewUser, UserChanges, UserRecord,
};

struct ContentRow {
    id: Uuid,
    title: String,
    body: String,
    summary: String,
    document: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Association link: (content item id, category id).
type Link = (Uuid, Uuid);

#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    content: Vec<ContentRow>,
    categories: Vec<Category>,
    links: Vec<Link>,
}

impl Tables {
    fn materialize(&self, row: &ContentRow) -> ContentItem {
        let mut categories: Vec<Uuid> = self
            .links
            .iter()
            .filter(|(content_id, _)| *content_id == row.id)
            .map(|(_, category_id)| *category_id)
            .collect();
        categories.sort();
        ContentItem {
            id: row.id,
            title: row.title.clone(),
            body: row.body.clone(),
            summary: row.summary.clone(),
            document: row.document.clone(),
            categories,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    fn check_categories(&self, ids: &[Uuid]) -> Result<(), RepositoryError> {
        let missing: Vec<Uuid> = ids
            .iter()
            .filter(|id| !self.categories.iter().any(|c| c.id == **id))
            .copied()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RepositoryError::UnknownCategories(missing))
        }
    }

    fn replace_links(&mut self, content_id: Uuid, ids: &[Uuid]) {
        self.links.retain(|(owner, _)| *owner != content_id);
        self.links.extend(ids.iter().map(|id| (content_id, *id)));
    }

    fn check_user_unique(
        &self,
        email: Option<&str>,
        username: Option<&str>,
        except: Option<Uuid>,
    ) -> Result<(), RepositoryError> {
        let others = self.users.iter().filter(|u| Some(u.id) != except);
        for user in others {
            if email.is_some_and(|email| user.email == email) {
                return Err(RepositoryError::Conflict(
                    "a user with this email already exists".to_string(),
                ));
            }
            if username.is_some() && user.username.as_deref() == username {
                return Err(RepositoryError::Conflict(
                    "a user with this username already exists".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// InMemoryRepository
///
/// `Repository` kept entirely in process memory. Used by the test suite and for
/// `Env::Local` runs without a `DATABASE_URL`. A single mutex makes every method
/// one unit of work.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, RepositoryError> {
        let mut tables = self.tables.lock().await;
        tables.check_user_unique(Some(&user.email), user.username.as_deref(), None)?;

        let profile = user.profile;
        let record = UserRecord {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            first_name: profile.first_name,
            last_name: profile.last_name,
            phone: profile.phone,
            address: profile.address,
            city: profile.city,
            state: profile.state,
            country: profile.country,
            pincode: profile.pincode,
            is_admin: user.is_admin,
            is_author: user.is_author,
            date_joined: Utc::now(),
        };
        tables.users.push(record.clone());
        Ok(record)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserRecord>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        Ok(self.tables.lock().await.users.clone())
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<UserRecord, RepositoryError> {
        let mut tables = self.tables.lock().await;
        tables.check_user_unique(
            changes.email.as_deref(),
            changes.username.as_deref(),
            Some(id),
        )?;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepositoryError::NotFound("user"))?;

        let profile = changes.profile;
        if let Some(username) = changes.username {
            user.username = Some(username);
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        let fields = [
            (&mut user.first_name, profile.first_name),
            (&mut user.last_name, profile.last_name),
            (&mut user.phone, profile.phone),
            (&mut user.address, profile.address),
            (&mut user.city, profile.city),
            (&mut user.state, profile.state),
            (&mut user.country, profile.country),
            (&mut user.pincode, profile.pincode),
        ];
        for (slot, value) in fields {
            if value.is_some() {
                *slot = value;
            }
        }
        if let Some(is_admin) = changes.is_admin {
            user.is_admin = is_admin;
        }
        if let Some(is_author) = changes.is_author {
            user.is_author = is_author;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Err(RepositoryError::NotFound("user"));
        }
        Ok(())
    }

    async fn replace_password(
        &self,
        id: Uuid,
        check: &PasswordCheck<'_>,
        new_hash: String,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(RepositoryError::NotFound("user"))?;
        if !check(&user.password_hash) {
            return Ok(false);
        }
        user.password_hash = new_hash;
        Ok(true)
    }

    async fn list_content(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<ContentItem>, RepositoryError> {
        let tables = self.tables.lock().await;
        let needle = search.map(str::to_lowercase);
        Ok(tables
            .content
            .iter()
            .filter(|row| {
                needle
                    .as_deref()
                    .is_none_or(|needle| row.title.to_lowercase().contains(needle))
            })
            .map(|row| tables.materialize(row))
            .collect())
    }

    async fn get_content(&self, id: Uuid) -> Result<Option<ContentItem>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .content
            .iter()
            .find(|row| row.id == id)
            .map(|row| tables.materialize(row)))
    }

    async fn create_content(&self, item: NewContentItem) -> Result<ContentItem, RepositoryError> {
        let mut tables = self.tables.lock().await;
        tables.check_categories(&item.categories)?;

        let now = Utc::now();
        let row = ContentRow {
            id: Uuid::new_v4(),
            title: item.title,
            body: item.body,
            summary: item.summary,
            document: item.document,
            created_at: now,
            updated_at: now,
        };
        tables.replace_links(row.id, &item.categories);
        let created = tables.materialize(&row);
        tables.content.push(row);
        Ok(created)
    }

    async fn update_content(
        &self,
        id: Uuid,
        changes: ContentChanges,
    ) -> Result<ContentItem, RepositoryError> {
        let mut tables = self.tables.lock().await;
        if !tables.content.iter().any(|row| row.id == id) {
            return Err(RepositoryError::NotFound("content item"));
        }
        if let Some(categories) = &changes.categories {
            tables.check_categories(categories)?;
            tables.replace_links(id, categories);
        }

        let index = tables
            .content
            .iter()
            .position(|row| row.id == id)
            .ok_or(RepositoryError::NotFound("content item"))?;
        let row = &mut tables.content[index];
        if let Some(title) = changes.title {
            row.title = title;
        }
        if let Some(body) = changes.body {
            row.body = body;
        }
        if let Some(summary) = changes.summary {
            row.summary = summary;
        }
        if let Some(document) = changes.document {
            row.document = Some(document);
        }
        row.updated_at = Utc::now();

        Ok(tables.materialize(&tables.content[index]))
    }

    async fn delete_content(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let before = tables.content.len();
        tables.content.retain(|row| row.id != id);
        if tables.content.len() == before {
            return Err(RepositoryError::NotFound("content item"));
        }
        tables.links.retain(|(content_id, _)| *content_id != id);
        Ok(())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        Ok(self.tables.lock().await.categories.clone())
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, RepositoryError> {
        let tables = self.tables.lock().await;
        Ok(tables.categories.iter().find(|c| c.id == id).cloned())
    }

    async fn create_category(&self, name: String) -> Result<Category, RepositoryError> {
        let category = Category {
            id: Uuid::new_v4(),
            name,
        };
        self.tables.lock().await.categories.push(category.clone());
        Ok(category)
    }

    async fn update_category(&self, id: Uuid, name: String) -> Result<Category, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let category = tables
            .categories
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(RepositoryError::NotFound("category"))?;
        category.name = name;
        Ok(category.clone())
    }

    async fn delete_category(&self, id: Uuid) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().await;
        let before = tables.categories.len();
        tables.categories.retain(|c| c.id != id);
        if tables.categories.len() == before {
            return Err(RepositoryError::NotFound("category"));
        }
        tables.links.retain(|(_, category_id)| *category_id != id);
        Ok(())
    }
}
