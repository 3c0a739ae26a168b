use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use super::dto::{
    user_path_id, ActivatedResponse, ActivationRequest, MessageResponse, Session,
    SessionResponse, SigninRequest, SignupRequest, SignupResponse, UpdatePasswordRequest,
    UpdateProfileRequest, UpdateRoleRequest, UserListResponse, UserResponse,
};
use super::extractors::{CurrentUser, ACCESS_COOKIE, REFRESH_COOKIE};
use super::repo::Role;
use crate::error::ApiError;
use crate::state::AppState;

fn build_cookie(
    name: &'static str,
    value: String,
    max_age: time::Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

pub(crate) fn apply_session_cookies(
    state: &AppState,
    session: &Session,
    jar: CookieJar,
) -> CookieJar {
    let secure = state.config.production;
    let tokens = &state.config.tokens;
    jar.add(build_cookie(
        ACCESS_COOKIE,
        session.access_token.clone(),
        time::Duration::minutes(tokens.access_ttl_minutes),
        secure,
    ))
    .add(build_cookie(
        REFRESH_COOKIE,
        session.refresh_token.clone(),
        time::Duration::days(tokens.refresh_ttl_days),
        secure,
    ))
}

fn cleared_cookies(state: &AppState, jar: CookieJar) -> CookieJar {
    let secure = state.config.production;
    // A 1ms max-age expires the cookie immediately while keeping the
    // attributes identical to the ones it was set with.
    jar.add(build_cookie(
        ACCESS_COOKIE,
        String::new(),
        time::Duration::milliseconds(1),
        secure,
    ))
    .add(build_cookie(
        REFRESH_COOKIE,
        String::new(),
        time::Duration::milliseconds(1),
        secure,
    ))
}

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let token = state.auth.signup(req).await?;
    Ok(Json(SignupResponse {
        success: true,
        message: format!("Please check your email ({email}) to activate your account!"),
        token,
    }))
}

pub async fn activate(
    State(state): State<AppState>,
    Json(req): Json<ActivationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new_user = state.auth.activate(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ActivatedResponse {
            success: true,
            message: "Your account has been activated successfully!".into(),
            new_user,
        }),
    ))
}

pub async fn signin(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SigninRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.auth.signin(req).await?;
    let jar = apply_session_cookies(&state, &session, jar);
    Ok((
        jar,
        Json(SessionResponse {
            success: true,
            message: "User signed in successfully".into(),
            user: session.user,
            access_token: session.access_token,
        }),
    ))
}

pub async fn signout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.logout(user.id).await?;
    let jar = cleared_cookies(&state, jar);
    Ok((
        jar,
        Json(MessageResponse {
            status: true,
            message: "Logged out successfully".into(),
        }),
    ))
}

/// Rotates both tokens from the refresh cookie alone. The access token may
/// already be expired, so this route takes no [`CurrentUser`].
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| {
            ApiError::AuthenticationRequired(
                "Could not refresh access token. Please log in again.".into(),
            )
        })?;

    let session = state.auth.refresh(&token).await?;
    let jar = apply_session_cookies(&state, &session, jar);
    Ok((
        jar,
        Json(SessionResponse {
            success: true,
            message: "Access token refreshed successfully".into(),
            user: session.user,
            access_token: session.access_token,
        }),
    ))
}

pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth.user_info(user.id).await?;
    Ok(Json(UserResponse { status: true, user }))
}

pub async fn update_info(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth.update_profile(user.id, req).await?;
    Ok(Json(UserResponse { status: true, user }))
}

pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UpdatePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth.update_password(user.id, req).await?;
    Ok(Json(UserResponse { status: true, user }))
}

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let users = state.auth.list_users().await?;
    Ok(Json(UserListResponse {
        status: true,
        length: users.len(),
        users,
    }))
}

pub async fn update_role(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let id = user_path_id(&id)?;
    let user = state.auth.update_role(id, req.role).await?;
    Ok(Json(UserResponse { status: true, user }))
}

pub async fn deactivate_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let id = user_path_id(&id)?;
    let user = state.auth.deactivate(id).await?;
    Ok(Json(UserResponse { status: true, user }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.auth.restrict(&user, &[Role::Admin])?;
    let id = user_path_id(&id)?;
    state.auth.delete_user(id).await?;
    Ok(Json(MessageResponse {
        status: true,
        message: "User deleted successfully".into(),
    }))
}
