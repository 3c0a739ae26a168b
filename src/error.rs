use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Domain error taxonomy. Every handler failure is translated into one of
/// these kinds and rendered by the single `IntoResponse` impl below.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    AuthenticationRequired(String),

    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Incorrect email or password. Please check your credentials and try again.")]
    InvalidCredentials,

    #[error("Invalid verification code. Please double-check the code and try again.")]
    OtpMismatch,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("{0}")]
    InvalidToken(String),

    #[error("{0}")]
    Configuration(String),

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_)
            | ApiError::AuthenticationRequired(_)
            | ApiError::Conflict(_)
            | ApiError::OtpMismatch
            | ApiError::ExpiredToken
            | ApiError::InvalidToken(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Configuration(_) | ApiError::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "ValidationError",
            ApiError::AuthenticationRequired(_) => "AuthenticationRequiredError",
            ApiError::Forbidden => "ForbiddenError",
            ApiError::NotFound(_) => "NotFoundError",
            ApiError::Conflict(_) => "ConflictError",
            ApiError::InvalidCredentials => "InvalidCredentialsError",
            ApiError::OtpMismatch => "OtpMismatchError",
            ApiError::ExpiredToken => "ExpiredTokenError",
            ApiError::InvalidToken(_) => "InvalidTokenError",
            ApiError::Configuration(_) => "ConfigurationError",
            ApiError::Upstream(_) => "UpstreamError",
        }
    }
}

fn is_production() -> bool {
    std::env::var("APP_ENV").map(|v| v == "production").unwrap_or(false)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "request failed");
        } else {
            tracing::warn!(error = %self, kind = self.kind(), "request rejected");
        }

        let message = if status.is_server_error() && is_production() {
            "Internal server error. Please try again later.".to_string()
        } else {
            self.to_string()
        };

        // The raw error chain rides along in every environment, matching the
        // envelope contract `{status, error, message, stack}`.
        let body = json!({
            "status": "error",
            "error": self.kind(),
            "message": message,
            "stack": format!("{self:?}"),
        });

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::Upstream(anyhow::Error::new(e).context("database error"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            ApiError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::AuthenticationRequired("login".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::NotFound("missing".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("dup".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Configuration("missing".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn expired_token_is_distinct_from_invalid() {
        assert_ne!(
            ApiError::ExpiredToken.kind(),
            ApiError::InvalidToken("bad signature".into()).kind()
        );
    }
}
