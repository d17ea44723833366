use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, query_builder::QueryBuilder};
use uuid::Uuid;

use super::{PasswordCheck, Repository, RepositoryError, escape_like};
use crate::models::{
    Category, ContentChanges, ContentItem, NewContentItem, NewUser, UserChanges, UserRecord,
};

const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, phone, \
     address, city, state, country, pincode, is_admin, is_author, date_joined";

// Category ids are aggregated from the join relation; items without links get '{}'.
const CONTENT_SELECT: &str = r#"
    SELECT
        c.id, c.title, c.body, c.summary, c.document, c.created_at, c.updated_at,
        COALESCE(
            array_agg(cc.category_id ORDER BY cc.category_id)
                FILTER (WHERE cc.category_id IS NOT NULL),
            '{}'::uuid[]
        ) AS categories
    FROM content_items c
    LEFT JOIN content_item_categories cc ON cc.content_item_id = c.id
"#;

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL through a sqlx connection pool.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps unique violations on `users` to `Conflict`; everything else is a database error.
fn map_write_error(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let message = match db.constraint() {
                Some(constraint) if constraint.contains("username") => {
                    "a user with this username already exists"
                }
                _ => "a user with this email already exists",
            };
            return RepositoryError::Conflict(message.to_string());
        }
        if db.is_foreign_key_violation() {
            // A category vanished between the existence check and the link insert.
            return RepositoryError::UnknownCategories(Vec::new());
        }
    }
    RepositoryError::Database(e)
}

async fn fetch_content(
    conn: &mut PgConnection,
    id: Uuid,
) -> Result<Option<ContentItem>, RepositoryError> {
    let query = format!("{CONTENT_SELECT} WHERE c.id = $1 GROUP BY c.id");
    let item = sqlx::query_as::<_, ContentItem>(&query)
        .bind(id)
        .fetch_optional(conn)
        .await?;
    Ok(item)
}

async fn ensure_categories_exist(
    conn: &mut PgConnection,
    ids: &[Uuid],
) -> Result<(), RepositoryError> {
    if ids.is_empty() {
        return Ok(());
    }
    let found: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM categories WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(conn)
        .await?;
    let missing: Vec<Uuid> = ids.iter().filter(|id| !found.contains(id)).copied().collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RepositoryError::UnknownCategories(missing))
    }
}

async fn link_categories(
    conn: &mut PgConnection,
    content_id: Uuid,
    ids: &[Uuid],
) -> Result<(), RepositoryError> {
    if ids.is_empty() {
        return Ok(());
    }
    sqlx::query(
        "INSERT INTO content_item_categories (content_item_id, category_id) \
         SELECT $1, UNNEST($2::uuid[]) ON CONFLICT DO NOTHING",
    )
    .bind(content_id)
    .bind(ids)
    .execute(conn)
    .await
    .map_err(map_write_error)?;
    Ok(())
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, RepositoryError> {
        let query = format!(
            "INSERT INTO users (id, username, email, password_hash, first_name, last_name, phone, \
             address, city, state, country, pincode, is_admin, is_author) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {USER_COLUMNS}"
        );
        let profile = user.profile;
        sqlx::query_as::<_, UserRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(user.username)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(profile.first_name)
            .bind(profile.last_name)
            .bind(profile.phone)
            .bind(profile.address)
            .bind(profile.city)
            .bind(profile.state)
            .bind(profile.country)
            .bind(profile.pincode)
            .bind(user.is_admin)
            .bind(user.is_author)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<UserRecord>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserRecord>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn list_users(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY date_joined, id");
        let users = sqlx::query_as::<_, UserRecord>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    /// COALESCE keeps the stored value for every `None` field.
    async fn update_user(
        &self,
        id: Uuid,
        changes: UserChanges,
    ) -> Result<UserRecord, RepositoryError> {
        let query = format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                first_name = COALESCE($4, first_name),
                last_name = COALESCE($5, last_name),
                phone = COALESCE($6, phone),
                address = COALESCE($7, address),
                city = COALESCE($8, city),
                state = COALESCE($9, state),
                country = COALESCE($10, country),
                pincode = COALESCE($11, pincode),
                is_admin = COALESCE($12, is_admin),
                is_author = COALESCE($13, is_author)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let profile = changes.profile;
        sqlx::query_as::<_, UserRecord>(&query)
            .bind(id)
            .bind(changes.username)
            .bind(changes.email)
            .bind(profile.first_name)
            .bind(profile.last_name)
            .bind(profile.phone)
            .bind(profile.address)
            .bind(profile.city)
            .bind(profile.state)
            .bind(profile.country)
            .bind(profile.pincode)
            .bind(changes.is_admin)
            .bind(changes.is_author)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)?
            .ok_or(RepositoryError::NotFound("user"))
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("user"));
        }
        Ok(())
    }

    /// `FOR UPDATE` holds the row until commit, so two concurrent changes
    /// cannot both verify against the same old hash.
    async fn replace_password(
        &self,
        id: Uuid,
        check: &PasswordCheck<'_>,
        new_hash: String,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current.ok_or(RepositoryError::NotFound("user"))?;

        if !check(&current) {
            return Ok(false);
        }

        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(new_hash)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    // --- CONTENT ITEMS ---

    async fn list_content(
        &self,
        search: Option<&str>,
    ) -> Result<Vec<ContentItem>, RepositoryError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(CONTENT_SELECT);
        if let Some(term) = search {
            builder.push(" WHERE c.title ILIKE ");
            builder.push_bind(format!("%{}%", escape_like(term)));
        }
        builder.push(" GROUP BY c.id ORDER BY c.created_at, c.id");

        let items = builder
            .build_query_as::<ContentItem>()
            .fetch_all(&self.pool)
            .await?;
        Ok(items)
    }

    async fn get_content(&self, id: Uuid) -> Result<Option<ContentItem>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_content(&mut conn, id).await
    }

    async fn create_content(&self, item: NewContentItem) -> Result<ContentItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        ensure_categories_exist(&mut tx, &item.categories).await?;

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO content_items (id, title, body, summary, document) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(item.title)
        .bind(item.body)
        .bind(item.summary)
        .bind(item.document)
        .execute(&mut *tx)
        .await?;
        link_categories(&mut tx, id, &item.categories).await?;

        let created = fetch_content(&mut tx, id)
            .await?
            .ok_or(RepositoryError::NotFound("content item"))?;
        tx.commit().await?;
        Ok(created)
    }

    /// The row update runs first, so the item row stays locked while the
    /// association set is replaced.
    async fn update_content(
        &self,
        id: Uuid,
        changes: ContentChanges,
    ) -> Result<ContentItem, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE content_items
            SET title = COALESCE($2, title),
                body = COALESCE($3, body),
                summary = COALESCE($4, summary),
                document = COALESCE($5, document),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.title)
        .bind(changes.body)
        .bind(changes.summary)
        .bind(changes.document)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("content item"));
        }

        if let Some(categories) = changes.categories {
            ensure_categories_exist(&mut tx, &categories).await?;
            sqlx::query("DELETE FROM content_item_categories WHERE content_item_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            link_categories(&mut tx, id, &categories).await?;
        }

        let updated = fetch_content(&mut tx, id)
            .await?
            .ok_or(RepositoryError::NotFound("content item"))?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_content(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM content_items WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("content item"));
        }
        Ok(())
    }

    // --- CATEGORIES ---

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT id, name FROM categories ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }

    async fn get_category(&self, id: Uuid) -> Result<Option<Category>, RepositoryError> {
        let category = sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(category)
    }

    async fn create_category(&self, name: String) -> Result<Category, RepositoryError> {
        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (id, name) VALUES ($1, $2) RETURNING id, name",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(category)
    }

    async fn update_category(&self, id: Uuid, name: String) -> Result<Category, RepositoryError> {
        sqlx::query_as::<_, Category>(
            "UPDATE categories SET name = $2 WHERE id = $1 RETURNING id, name",
        )
        .bind(id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound("category"))
    }

    /// `ON DELETE CASCADE` on the join relation clears the associations.
    async fn delete_category(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("category"));
        }
        Ok(())
    }
}
