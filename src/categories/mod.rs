pub mod repo;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::auth::extractors::CurrentUser;
use crate::auth::repo::Role;
use crate::error::ApiError;
use crate::resource::{
    resource_path_id, DeleteManyRequest, DeletedResponse, DocumentResponse, DocumentsResponse,
    ListResponse, Visibility,
};
use crate::state::AppState;
use repo::{CategoryDraft, CategoryPatch};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create).delete(delete_many))
        .route("/admin", get(list_admin))
        .route("/:id", get(get_single).patch(update))
}

async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let documents = state.categories.get_all(Visibility::User).await?;
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
    let documents = state.categories.get_all(Visibility::Admin).await?;
    Ok(Json(ListResponse {
        status: true,
        length: documents.len(),
        documents,
    }))
}

async fn get_single(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let document = state.categories.get_single(resource_path_id(&id)?).await?;
    Ok(Json(DocumentResponse {
        status: true,
        document,
    }))
}

async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(drafts): Json<Vec<CategoryDraft>>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let documents = state.categories.create(drafts).await?;
    Ok((
        StatusCode::CREATED,
        Json(DocumentsResponse {
            status: true,
            length: documents.len(),
            documents,
        }),
    ))
}

async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(patch): Json<CategoryPatch>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let document = state
        .categories
        .update(resource_path_id(&id)?, patch)
        .await?;
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
    let deleted = state.categories.delete_many(&req.ids).await?;
    Ok(Json(DeletedResponse {
        status: true,
        deleted,
    }))
}
