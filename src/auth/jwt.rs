use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{ActivationClaims, PendingUser, SessionClaims, TokenKind};
use crate::config::TokenConfig;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Failed to sign token: {0}")]
    Encoding(String),
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Signs and verifies the three token families: short-lived access tokens,
/// longer-lived refresh tokens, and the activation token issued at signup.
/// No rotation logic lives here; callers decide what a verified payload means.
pub struct TokenCodec {
    access: Keys,
    refresh: Keys,
    activation: Keys,
    access_ttl: Duration,
    refresh_ttl: Duration,
    activation_ttl: Duration,
}

impl TokenCodec {
    pub fn from_config(cfg: &TokenConfig) -> Self {
        Self {
            access: Keys::from_secret(&cfg.access_secret),
            refresh: Keys::from_secret(&cfg.refresh_secret),
            activation: Keys::from_secret(&cfg.activation_secret),
            access_ttl: Duration::minutes(cfg.access_ttl_minutes),
            refresh_ttl: Duration::days(cfg.refresh_ttl_days),
            activation_ttl: Duration::minutes(cfg.activation_ttl_minutes),
        }
    }

    fn sign<T: Serialize>(&self, claims: &T, keys: &Keys) -> Result<String, TokenError> {
        encode(&Header::default(), claims, &keys.encoding)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    fn verify<T: DeserializeOwned>(&self, token: &str, keys: &Keys) -> Result<T, TokenError> {
        let mut validation = Validation::default();
        validation.validate_aud = false;
        decode::<T>(token, &keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(e.to_string()),
            })
    }

    pub fn sign_session(&self, user_id: Uuid, kind: TokenKind) -> Result<String, TokenError> {
        self.sign_session_at(user_id, kind, OffsetDateTime::now_utc())
    }

    pub(crate) fn sign_session_at(
        &self,
        user_id: Uuid,
        kind: TokenKind,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = SessionClaims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: (now + ttl).unix_timestamp() as usize,
            kind,
        };
        let keys = match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        };
        let token = self.sign(&claims, keys)?;
        debug!(user_id = %user_id, kind = ?kind, "session token signed");
        Ok(token)
    }

    pub fn verify_session(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<SessionClaims, TokenError> {
        let keys = match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        };
        let claims: SessionClaims = self.verify(token, keys)?;
        if claims.kind != kind {
            return Err(TokenError::Invalid(format!(
                "expected a {kind:?} token"
            )));
        }
        Ok(claims)
    }

    pub fn sign_activation(
        &self,
        payload: PendingUser,
        otp: u64,
    ) -> Result<String, TokenError> {
        self.sign_activation_at(payload, otp, OffsetDateTime::now_utc())
    }

    pub(crate) fn sign_activation_at(
        &self,
        payload: PendingUser,
        otp: u64,
        now: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let claims = ActivationClaims {
            payload,
            otp,
            iat: now.unix_timestamp() as usize,
            exp: (now + self.activation_ttl).unix_timestamp() as usize,
        };
        self.sign(&claims, &self.activation)
    }

    pub fn verify_activation(&self, token: &str) -> Result<ActivationClaims, TokenError> {
        self.verify(token, &self.activation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;

    fn codec() -> TokenCodec {
        TokenCodec::from_config(&TokenConfig {
            access_secret: "access-secret".into(),
            refresh_secret: "refresh-secret".into(),
            activation_secret: "activation-secret".into(),
            access_ttl_minutes: 5,
            refresh_ttl_days: 3,
            activation_ttl_minutes: 10,
            otp_digits: 6,
        })
    }

    fn pending() -> PendingUser {
        PendingUser {
            fname: "jo".into(),
            lname: "doe".into(),
            email: "jo@x.com".into(),
            password_hash: "$argon2id$stub".into(),
        }
    }

    #[test]
    fn access_token_roundtrip() {
        let codec = codec();
        let id = Uuid::new_v4();
        let token = codec.sign_session(id, TokenKind::Access).unwrap();
        let claims = codec.verify_session(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.kind, TokenKind::Access);
    }

    #[test]
    fn refresh_verification_rejects_access_token() {
        let codec = codec();
        let token = codec.sign_session(Uuid::new_v4(), TokenKind::Access).unwrap();
        // Different secret families: the access token does not even parse
        // under the refresh key.
        let err = codec.verify_session(&token, TokenKind::Refresh).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }

    #[test]
    fn expired_session_token_reports_expired() {
        let codec = codec();
        let past = OffsetDateTime::now_utc() - Duration::days(30);
        let token = codec
            .sign_session_at(Uuid::new_v4(), TokenKind::Access, past)
            .unwrap();
        let err = codec.verify_session(&token, TokenKind::Access).unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[test]
    fn activation_token_roundtrip() {
        let codec = codec();
        let token = codec.sign_activation(pending(), 123456).unwrap();
        let claims = codec.verify_activation(&token).unwrap();
        assert_eq!(claims.otp, 123456);
        assert_eq!(claims.payload, pending());
    }

    #[test]
    fn expired_activation_token_is_expired_not_invalid() {
        let codec = codec();
        let past = OffsetDateTime::now_utc() - Duration::minutes(15);
        let token = codec.sign_activation_at(pending(), 123456, past).unwrap();
        let err = codec.verify_activation(&token).unwrap_err();
        assert!(matches!(err, TokenError::Expired));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let codec = codec();
        let token = codec.sign_activation(pending(), 123456).unwrap();
        let tampered = format!("{}x", token);
        let err = codec.verify_activation(&tampered).unwrap_err();
        assert!(matches!(err, TokenError::Invalid(_)));
    }
}
