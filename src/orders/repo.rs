use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::resource::{ResourceStore, Thumbnailed, Visibility};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub course_id: Uuid,
    /// Raw gateway payload, stored as submitted.
    pub payment_info: Value,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug)]
pub struct OrderDraft {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub payment_info: Value,
}

impl Thumbnailed for OrderDraft {
    fn take_thumbnail(&mut self) -> Option<String> {
        None
    }

    fn set_thumbnail_key(&mut self, _key: String) {}
}

#[derive(Debug, Deserialize)]
pub struct OrderPatch {
    pub payment_info: Option<Value>,
    pub active: Option<bool>,
}

pub struct PgOrderStore {
    db: PgPool,
}

impl PgOrderStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

const ORDER_COLUMNS: &str =
    "id, user_id, course_id, payment_info, active, created_at, updated_at";

#[async_trait]
impl ResourceStore for PgOrderStore {
    type Record = Order;
    type Draft = OrderDraft;
    type Patch = OrderPatch;

    fn name(&self) -> &'static str {
        "orders"
    }

    async fn insert_many(&self, drafts: Vec<OrderDraft>) -> anyhow::Result<Vec<Order>> {
        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let order = sqlx::query_as::<_, Order>(&format!(
                "INSERT INTO orders (user_id, course_id, payment_info)
                 VALUES ($1, $2, $3)
                 RETURNING {ORDER_COLUMNS}"
            ))
            .bind(draft.user_id)
            .bind(draft.course_id)
            .bind(&draft.payment_info)
            .fetch_one(&mut *tx)
            .await?;
            created.push(order);
        }
        tx.commit().await?;
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(order)
    }

    async fn list(&self, visibility: Visibility) -> anyhow::Result<Vec<Order>> {
        let query = match visibility {
            Visibility::User => {
                format!("SELECT {ORDER_COLUMNS} FROM orders WHERE active ORDER BY created_at DESC")
            }
            Visibility::Admin => {
                format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC")
            }
        };
        let orders = sqlx::query_as::<_, Order>(&query).fetch_all(&self.db).await?;
        Ok(orders)
    }

    async fn update(&self, id: Uuid, patch: OrderPatch) -> anyhow::Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "UPDATE orders
             SET payment_info = COALESCE($2, payment_info),
                 active = COALESCE($3, active),
                 updated_at = now()
             WHERE id = $1
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(&patch.payment_info)
        .bind(patch.active)
        .fetch_optional(&self.db)
        .await?;
        Ok(order)
    }

    async fn delete_many(&self, ids: &[Uuid]) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
