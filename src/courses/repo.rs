use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::content::LectureStore;
use crate::resource::{ResourceStore, Thumbnailed, Visibility};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub level: String,
    pub price: f64,
    pub thumbnail: Option<String>,
    /// Ordered lecture list as stored, `[{id, title, videoUrl, comments: [..]}, ..]`.
    pub lectures: Value,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
pub struct CourseDraft {
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub level: String,
    pub price: f64,
    pub thumbnail: Option<String>,
    #[serde(default = "empty_lectures")]
    pub lectures: Value,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn empty_lectures() -> Value {
    Value::Array(vec![])
}

fn default_active() -> bool {
    true
}

impl Thumbnailed for CourseDraft {
    fn take_thumbnail(&mut self) -> Option<String> {
        self.thumbnail.take()
    }

    fn set_thumbnail_key(&mut self, key: String) {
        self.thumbnail = Some(key);
    }
}

#[derive(Debug, Deserialize)]
pub struct CoursePatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub tags: Option<Vec<String>>,
    pub level: Option<String>,
    pub price: Option<f64>,
    pub lectures: Option<Value>,
    pub active: Option<bool>,
}

pub struct PgCourseStore {
    db: PgPool,
}

impl PgCourseStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const COURSE_COLUMNS: &str = "id, title, description, category_id, tags, level, price, \
                              thumbnail, lectures, active, created_at, updated_at";

#[async_trait]
impl ResourceStore for PgCourseStore {
    type Record = Course;
    type Draft = CourseDraft;
    type Patch = CoursePatch;

    fn name(&self) -> &'static str {
        "courses"
    }

    async fn insert_many(&self, drafts: Vec<CourseDraft>) -> anyhow::Result<Vec<Course>> {
        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let course = sqlx::query_as::<_, Course>(&format!(
                "INSERT INTO courses
                     (title, description, category_id, tags, level, price, thumbnail,
                      lectures, active)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 RETURNING {COURSE_COLUMNS}"
            ))
            .bind(&draft.title)
            .bind(&draft.description)
            .bind(draft.category_id)
            .bind(&draft.tags)
            .bind(&draft.level)
            .bind(draft.price)
            .bind(&draft.thumbnail)
            .bind(&draft.lectures)
            .bind(draft.active)
            .fetch_one(&mut *tx)
            .await?;
            created.push(course);
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Course>> {
        let course = sqlx::query_as::<_, Course>(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(course)
    }

    async fn list(&self, visibility: Visibility) -> anyhow::Result<Vec<Course>> {
        let query = match visibility {
            Visibility::User => {
                format!("SELECT {COURSE_COLUMNS} FROM courses WHERE active ORDER BY created_at DESC")
            }
            Visibility::Admin => {
                format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY created_at DESC")
            }
        };
        let courses = sqlx::query_as::<_, Course>(&query)
            .fetch_all(&self.db)
            .await?;
        Ok(courses)
    }

    async fn update(&self, id: Uuid, patch: CoursePatch) -> anyhow::Result<Option<Course>> {
        let course = sqlx::query_as::<_, Course>(&format!(
            "UPDATE courses
             SET title = COALESCE($2, title),
                 description = COALESCE($3, description),
                 category_id = COALESCE($4, category_id),
                 tags = COALESCE($5, tags),
                 level = COALESCE($6, level),
                 price = COALESCE($7, price),
                 lectures = COALESCE($8, lectures),
                 active = COALESCE($9, active),
                 updated_at = now()
             WHERE id = $1
             RETURNING {COURSE_COLUMNS}"
        ))
        .bind(id)
        .bind(&patch.title)
        .bind(&patch.description)
        .bind(patch.category_id)
        .bind(&patch.tags)
        .bind(&patch.level)
        .bind(patch.price)
        .bind(&patch.lectures)
        .bind(patch.active)
        .fetch_optional(&self.db)
        .await?;
        Ok(course)
    }

    async fn delete_many(&self, ids: &[Uuid]) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM courses WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LectureStore for PgCourseStore {
    async fn lectures(&self, course_id: Uuid) -> anyhow::Result<Option<Value>> {
        let lectures = sqlx::query_scalar::<_, Value>("SELECT lectures FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(lectures)
    }

    async fn save_lectures(&self, course_id: Uuid, lectures: &Value) -> anyhow::Result<()> {
        sqlx::query("UPDATE courses SET lectures = $2, updated_at = now() WHERE id = $1")
            .bind(course_id)
            .bind(lectures)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
