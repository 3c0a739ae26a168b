pub mod repo;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::extractors::CurrentUser;
use crate::auth::repo::Role;
use crate::error::ApiError;
use crate::resource::{
    resource_path_id, DeleteManyRequest, DeletedResponse, DocumentResponse, DocumentsResponse,
    ListResponse, Visibility,
};
use crate::state::AppState;
use repo::{ReviewDraft, ReviewPatch};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create).delete(delete_many))
        .route("/admin", get(list_admin))
        .route("/:id", get(get_single).patch(update))
}

#[derive(Debug, Deserialize)]
pub struct ReviewBody {
    #[serde(rename = "courseId")]
    pub course_id: Uuid,
    pub rating: i32,
    pub comment: Option<String>,
}

async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let documents = state.reviews.get_all(Visibility::User).await?;
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
    let documents = state.reviews.get_all(Visibility::Admin).await?;
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
    let document = state.reviews.get_single(resource_path_id(&id)?).await?;
    Ok(Json(DocumentResponse {
        status: true,
        document,
    }))
}

/// Reviews can only be written for courses the user has purchased.
async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(bodies): Json<Vec<ReviewBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let mut drafts = Vec::with_capacity(bodies.len());
    for body in bodies {
        if !user.courses.contains(&body.course_id) {
            return Err(ApiError::Validation(
                "You can only review courses you have purchased.".into(),
            ));
        }
        if !(1..=5).contains(&body.rating) {
            return Err(ApiError::Validation(
                "Rating must be between 1 and 5.".into(),
            ));
        }
        drafts.push(ReviewDraft {
            user_id: user.id,
            course_id: body.course_id,
            rating: body.rating,
            comment: body.comment,
        });
    }

    let documents = state.reviews.create(drafts).await?;
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
    Json(patch): Json<ReviewPatch>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let document = state.reviews.update(resource_path_id(&id)?, patch).await?;
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
    let deleted = state.reviews.delete_many(&req.ids).await?;
    Ok(Json(DeletedResponse {
        status: true,
        deleted,
    }))
}
