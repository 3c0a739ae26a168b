use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Type of session JWT: access or refresh.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Payload of access and refresh tokens: the user id plus timestamps,
/// nothing else. Revocation lives in the session cache, not the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: Uuid,
    pub iat: usize,
    pub exp: usize,
    pub kind: TokenKind,
}

/// Pending-signup data carried inside the activation token. The password is
/// already hashed at signup, so the token never holds plaintext credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingUser {
    pub fname: String,
    pub lname: String,
    pub email: String,
    pub password_hash: String,
}

/// Payload of the activation token: pending user data plus the one-time code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationClaims {
    pub payload: PendingUser,
    pub otp: u64,
    pub iat: usize,
    pub exp: usize,
}
