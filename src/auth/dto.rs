use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo::{Role, User};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Capitalizes the first character; empty input stays empty.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub fname: String,
    pub lname: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "passwordConfirm")]
    pub password_confirm: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivationRequest {
    #[serde(rename = "activationToken")]
    pub activation_token: String,
    /// Kept loose on purpose: numbers and digit strings compare numerically,
    /// anything else fails closed as a mismatch.
    pub otp: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub fname: Option<String>,
    pub lname: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    #[serde(rename = "oldPassword")]
    pub old_password: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// An issued session: the user (hash stripped by serialization) plus both
/// signed tokens. Handlers turn this into cookies and a body or a redirect.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub success: bool,
    pub message: String,
    pub user: User,
    #[serde(rename = "accessToken")]
    pub access_token: String,
}

/// Provider profile reduced to the fields the Authenticator needs.
#[derive(Debug, Clone)]
pub struct OAuthProfile {
    pub fname: String,
    pub lname: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub status: bool,
    pub length: usize,
    pub users: Vec<User>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub status: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub status: bool,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct ActivatedResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "newUser")]
    pub new_user: User,
}

pub fn user_path_id(id: &str) -> Result<Uuid, crate::error::ApiError> {
    id.parse().map_err(|_| {
        crate::error::ApiError::Validation(
            "Oops! It seems like the user ID provided is invalid".into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_valid_email("jo@x.com"));
        assert!(!is_valid_email("jo@x"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("a b@x.com"));
    }

    #[test]
    fn capitalize_handles_empty_and_unicode() {
        assert_eq!(capitalize("jo"), "Jo");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("élodie"), "Élodie");
    }
}
