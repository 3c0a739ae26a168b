pub mod content;
pub mod repo;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;

use crate::auth::dto::MessageResponse;
use crate::auth::extractors::CurrentUser;
use crate::auth::repo::Role;
use crate::error::ApiError;
use crate::resource::{
    resource_path_id, DeleteManyRequest, DeletedResponse, DocumentResponse, DocumentsResponse,
    ListResponse, Visibility,
};
use crate::state::AppState;
use content::{AnswerRequest, QuestionRequest};
use repo::{CourseDraft, CoursePatch};

// Instructors manage their own material, so course writes allow both roles.
const WRITE_ROLES: &[Role] = &[Role::Admin, Role::Instructor];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create).delete(delete_many))
        .route("/admin", get(list_admin))
        .route("/:id", get(get_single).patch(update))
        .route("/:id/content", get(course_content))
        .route("/:id/questions", post(add_question))
        .route("/:id/answers", post(add_answer))
}

async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let documents = state.courses.get_all(Visibility::User).await?;
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
    state.auth.restrict(&user, WRITE_ROLES)?;
    let documents = state.courses.get_all(Visibility::Admin).await?;
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
    let document = state.courses.get_single(resource_path_id(&id)?).await?;
    Ok(Json(DocumentResponse {
        status: true,
        document,
    }))
}

async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(drafts): Json<Vec<CourseDraft>>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, WRITE_ROLES)?;
    let documents = state.courses.create(drafts).await?;
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
    Json(patch): Json<CoursePatch>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, WRITE_ROLES)?;
    let document = state.courses.update(resource_path_id(&id)?, patch).await?;
    Ok(Json(DocumentResponse {
        status: true,
        document,
    }))
}

#[derive(Debug, Serialize)]
struct ContentResponse {
    status: bool,
    content: Value,
}

async fn course_content(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let content = state
        .course_content
        .content_for(&user, resource_path_id(&id)?)
        .await?;
    Ok(Json(ContentResponse {
        status: true,
        content,
    }))
}

async fn add_question(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<QuestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .course_content
        .add_question(&user, resource_path_id(&id)?, req)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            status: true,
            message: "Question added successfully.".into(),
        }),
    ))
}

async fn add_answer(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<AnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .course_content
        .add_answer(&user, resource_path_id(&id)?, req)
        .await?;
    Ok(Json(MessageResponse {
        status: true,
        message: "Answer added successfully.".into(),
    }))
}

async fn delete_many(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<DeleteManyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let deleted = state.courses.delete_many(&req.ids).await?;
    Ok(Json(DeletedResponse {
        status: true,
        deleted,
    }))
}
