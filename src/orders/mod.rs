pub mod repo;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::extractors::CurrentUser;
use crate::auth::repo::{Role, User};
use crate::error::ApiError;
use crate::resource::{
    resource_path_id, DeleteManyRequest, DeletedResponse, DocumentResponse, ListResponse,
    Visibility,
};
use crate::state::AppState;
use repo::{Order, OrderDraft, OrderPatch};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(place_order).delete(delete_many))
        .route("/admin", get(list_admin))
        .route("/:id", get(get_single).patch(update))
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    #[serde(rename = "courseId")]
    pub course_id: Uuid,
    #[serde(default, rename = "paymentInfo")]
    pub payment_info: Value,
}

#[derive(Debug, Serialize)]
pub struct PlacedOrderResponse {
    pub status: bool,
    pub order: Order,
    pub user: User,
}

/// Placing an order grants the course: reject repeat purchases, make sure
/// the course still exists, then record the order and extend the user's
/// course list in one pass.
async fn place_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if user.courses.contains(&req.course_id) {
        return Err(ApiError::Validation(
            "You have already purchased this course".into(),
        ));
    }

    state
        .courses
        .get_single(req.course_id)
        .await
        .map_err(|e| match e {
            ApiError::NotFound(_) => ApiError::NotFound("Course not found".into()),
            other => other,
        })?;

    let mut orders = state
        .orders
        .create(vec![OrderDraft {
            user_id: user.id,
            course_id: req.course_id,
            payment_info: req.payment_info,
        }])
        .await?;
    let order = orders
        .pop()
        .ok_or_else(|| ApiError::Upstream(anyhow::anyhow!("order insert returned no row")))?;

    let user = state.auth.grant_course(user.id, req.course_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(PlacedOrderResponse {
            status: true,
            order,
            user,
        }),
    ))
}

async fn list(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let documents = state.orders.get_all(Visibility::User).await?;
    Ok(Json(ListResponse {
        status: true,
        length: documents.len(),
        documents,
    }))
}

async fn list_admin(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let documents = state.orders.get_all(Visibility::Admin).await?;
    Ok(Json(ListResponse {
        status: true,
        length: documents.len(),
        documents,
    }))
}

async fn get_single(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let document = state.orders.get_single(resource_path_id(&id)?).await?;
    Ok(Json(DocumentResponse {
        status: true,
        document,
    }))
}

async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(patch): Json<OrderPatch>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let document = state.orders.update(resource_path_id(&id)?, patch).await?;
    Ok(Json(DocumentResponse {
        status: true,
        document,
    }))
}

async fn delete_many(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<DeleteManyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let deleted = state.orders.delete_many(&req.ids).await?;
    Ok(Json(DeletedResponse {
        status: true,
        deleted,
    }))
}
