use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::resource::{ResourceStore, Thumbnailed, Visibility};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CategoryDraft {
    pub name: String,
    pub description: Option<String>,
    /// Inline image as a `data:` URL, replaced by the storage key on insert.
    pub thumbnail: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Thumbnailed for CategoryDraft {
    fn take_thumbnail(&mut self) -> Option<String> {
        self.thumbnail.take()
    }

    fn set_thumbnail_key(&mut self, key: String) {
        self.thumbnail = Some(key);
    }
}

#[derive(Debug, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
}

pub struct PgCategoryStore {
    db: PgPool,
}

impl PgCategoryStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const CATEGORY_COLUMNS: &str =
    "id, name, description, thumbnail, active, created_at, updated_at";

#[async_trait]
impl ResourceStore for PgCategoryStore {
    type Record = Category;
    type Draft = CategoryDraft;
    type Patch = CategoryPatch;

    fn name(&self) -> &'static str {
        "categories"
    }

    async fn insert_many(&self, drafts: Vec<CategoryDraft>) -> anyhow::Result<Vec<Category>> {
        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let category = sqlx::query_as::<_, Category>(&format!(
                "INSERT INTO categories (name, description, thumbnail, active)
                 VALUES ($1, $2, $3, $4)
                 RETURNING {CATEGORY_COLUMNS}"
            ))
            .bind(&draft.name)
            .bind(&draft.description)
            .bind(&draft.thumbnail)
            .bind(draft.active)
            .fetch_one(&mut *tx)
            .await?;
            created.push(category);
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(category)
    }

    async fn list(&self, visibility: Visibility) -> anyhow::Result<Vec<Category>> {
        let query = match visibility {
            Visibility::User => format!(
                "SELECT {CATEGORY_COLUMNS} FROM categories WHERE active ORDER BY name"
            ),
            Visibility::Admin => format!(
                "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY created_at DESC"
            ),
        };
        let categories = sqlx::query_as::<_, Category>(&query)
            .fetch_all(&self.db)
            .await?;
        Ok(categories)
    }

    async fn update(&self, id: Uuid, patch: CategoryPatch) -> anyhow::Result<Option<Category>> {
        let category = sqlx::query_as::<_, Category>(&format!(
            "UPDATE categories
             SET name = COALESCE($2, name),
                 description = COALESCE($3, description),
                 active = COALESCE($4, active),
                 updated_at = now()
             WHERE id = $1
             RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(patch.active)
        .fetch_optional(&self.db)
        .await?;
        Ok(category)
    }

    async fn delete_many(&self, ids: &[Uuid]) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM categories WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
