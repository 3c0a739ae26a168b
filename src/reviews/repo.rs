use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::resource::{ResourceStore, Thumbnailed, Visibility};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
    /// Threaded replies, `[{user_id, comment, created_at}, ..]`.
    pub replies: Value,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct ReviewDraft {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
}

impl Thumbnailed for ReviewDraft {
    fn take_thumbnail(&mut self) -> Option<String> {
        None
    }

    fn set_thumbnail_key(&mut self, _key: String) {}
}

#[derive(Debug, Deserialize)]
pub struct ReviewPatch {
    pub rating: Option<i32>,
    pub comment: Option<String>,
    pub replies: Option<Value>,
    pub active: Option<bool>,
}

pub struct PgReviewStore {
    db: PgPool,
}

impl PgReviewStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const REVIEW_COLUMNS: &str =
    "id, user_id, course_id, rating, comment, replies, active, created_at, updated_at";

#[async_trait]
impl ResourceStore for PgReviewStore {
    type Record = Review;
    type Draft = ReviewDraft;
    type Patch = ReviewPatch;

    fn name(&self) -> &'static str {
        "reviews"
    }

    async fn insert_many(&self, drafts: Vec<ReviewDraft>) -> anyhow::Result<Vec<Review>> {
        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let review = sqlx::query_as::<_, Review>(&format!(
                "INSERT INTO reviews (user_id, course_id, rating, comment)
                 VALUES ($1, $2, $3, $4)
                 RETURNING {REVIEW_COLUMNS}"
            ))
            .bind(draft.user_id)
            .bind(draft.course_id)
            .bind(draft.rating)
            .bind(&draft.comment)
            .fetch_one(&mut *tx)
            .await?;
            created.push(review);
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Review>> {
        let review = sqlx::query_as::<_, Review>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(review)
    }

    async fn list(&self, visibility: Visibility) -> anyhow::Result<Vec<Review>> {
        let query = match visibility {
            Visibility::User => {
                format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE active ORDER BY created_at DESC")
            }
            Visibility::Admin => {
                format!("SELECT {REVIEW_COLUMNS} FROM reviews ORDER BY created_at DESC")
            }
        };
        let reviews = sqlx::query_as::<_, Review>(&query)
            .fetch_all(&self.db)
            .await?;
        Ok(reviews)
    }

    async fn update(&self, id: Uuid, patch: ReviewPatch) -> anyhow::Result<Option<Review>> {
        let review = sqlx::query_as::<_, Review>(&format!(
            "UPDATE reviews
             SET rating = COALESCE($2, rating),
                 comment = COALESCE($3, comment),
                 replies = COALESCE($4, replies),
                 active = COALESCE($5, active),
                 updated_at = now()
             WHERE id = $1
             RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.rating)
        .bind(&patch.comment)
        .bind(&patch.replies)
        .bind(patch.active)
        .fetch_optional(&self.db)
        .await?;
        Ok(review)
    }

    async fn delete_many(&self, ids: &[Uuid]) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
