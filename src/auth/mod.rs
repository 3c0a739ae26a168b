mod claims;
pub mod dto;
pub mod extractors;
pub mod handlers;
mod jwt;
mod oauth;
mod otp;
mod password;
pub mod repo;
pub mod service;

pub use jwt::TokenCodec;
pub use otp::OtpIssuer;

use axum::routing::{delete, get, patch, post};
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(handlers::signup))
        .route("/activation", post(handlers::activate))
        .route("/signin", post(handlers::signin))
        .route("/signout", post(handlers::signout))
        .route("/refresh", post(handlers::refresh))
        .route("/me", get(handlers::me))
        .route("/info", patch(handlers::update_info))
        .route("/password", patch(handlers::update_password))
        .route("/admin/users", get(handlers::list_users))
        .route("/admin/role/:id", patch(handlers::update_role))
        .route("/admin/deactivate/:id", patch(handlers::deactivate_user))
        .route("/admin/:id", delete(handlers::delete_user))
        .nest("/auth", oauth::router())
}
