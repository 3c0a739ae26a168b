use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::claims::{PendingUser, TokenKind};
use super::dto::{
    capitalize, is_valid_email, ActivationRequest, OAuthProfile, Session, SigninRequest,
    SignupRequest, UpdatePasswordRequest, UpdateProfileRequest,
};
use super::jwt::{TokenCodec, TokenError};
use super::otp::{otp_matches, OtpIssuer};
use super::password::{hash_password, verify_password};
use super::repo::{NewUser, Role, User, UserStore};
use crate::email::{verification_email, Mailer};
use crate::error::ApiError;
use crate::session::{session_key, SessionCache};

/// Orchestrates every authentication flow. Holds its collaborators
/// explicitly; per-request state never outlives the call.
pub struct Authenticator {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionCache>,
    mailer: Arc<dyn Mailer>,
    codec: TokenCodec,
    otp: OtpIssuer,
    session_ttl: Duration,
}

fn activation_token_error(e: TokenError) -> ApiError {
    match e {
        TokenError::Expired => ApiError::ExpiredToken,
        _ => ApiError::InvalidToken("Invalid activation token. Please try again.".into()),
    }
}

fn session_token_error(e: TokenError) -> ApiError {
    match e {
        TokenError::Expired => ApiError::ExpiredToken,
        _ => ApiError::InvalidToken("Invalid or expired token. Please log in again.".into()),
    }
}

impl Authenticator {
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionCache>,
        mailer: Arc<dyn Mailer>,
        codec: TokenCodec,
        otp: OtpIssuer,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            mailer,
            codec,
            otp,
            session_ttl,
        }
    }

    /// Signup: validate, hash the password, bundle the pending account into an
    /// activation token, and mail the one-time code. No record is created yet.
    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn signup(&self, req: SignupRequest) -> Result<String, ApiError> {
        let email = req.email.trim().to_lowercase();

        if req.fname.trim().is_empty()
            || req.lname.trim().is_empty()
            || email.is_empty()
            || req.password.is_empty()
        {
            return Err(ApiError::Validation(
                "Please provide values for all required fields: first name, last name, email, and password.".into(),
            ));
        }

        if !is_valid_email(&email) {
            return Err(ApiError::Validation(
                "Please provide a valid email address.".into(),
            ));
        }

        if req.password != req.password_confirm {
            return Err(ApiError::Validation(
                "Password and password confirmation do not match.".into(),
            ));
        }

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(ApiError::Conflict(
                "Email is already taken. Please use a different email address.".into(),
            ));
        }

        let pending = PendingUser {
            fname: req.fname.trim().to_string(),
            lname: req.lname.trim().to_string(),
            email: email.clone(),
            password_hash: hash_password(&req.password)?,
        };

        let activation = self.otp.issue(&self.codec, pending)?;

        let email_body = verification_email(&capitalize(&req.fname), &email, activation.otp);
        if let Err(e) = self.mailer.send(email_body).await {
            warn!(error = %e, "verification email failed");
            return Err(ApiError::Upstream(anyhow::anyhow!(
                "There was an error sending the email. Please try again later!"
            )));
        }

        info!("verification code sent");
        Ok(activation.token)
    }

    /// Activation: verify the token, compare codes numerically, re-check email
    /// uniqueness (the token is stateless, so this is the only replay guard),
    /// and create the user already verified.
    #[instrument(skip(self, req))]
    pub async fn activate(&self, req: ActivationRequest) -> Result<User, ApiError> {
        if req.otp.is_null() {
            return Err(ApiError::Validation(
                "Verification code is required. Please enter the code to proceed.".into(),
            ));
        }

        if req.activation_token.is_empty() {
            return Err(ApiError::Validation(
                "Invalid activation token. Please try again.".into(),
            ));
        }

        let decoded = self
            .codec
            .verify_activation(&req.activation_token)
            .map_err(activation_token_error)?;

        if !otp_matches(decoded.otp, &req.otp) {
            return Err(ApiError::OtpMismatch);
        }

        let pending = decoded.payload;

        if self.users.find_by_email(&pending.email).await?.is_some() {
            return Err(ApiError::Conflict(
                "Email is already registered. Please use a different email address.".into(),
            ));
        }

        let user = self
            .users
            .create(NewUser {
                fname: capitalize(&pending.fname),
                lname: capitalize(&pending.lname),
                email: pending.email,
                password_hash: Some(pending.password_hash),
                is_verified: true,
                is_social: false,
                avatar_url: None,
            })
            .await?;

        info!(user_id = %user.id, "account activated");
        Ok(user)
    }

    /// Sign-in failure is deliberately uniform: unknown email, missing hash
    /// (social-only account) and wrong password all return the same error.
    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn signin(&self, req: SigninRequest) -> Result<Session, ApiError> {
        if req.email.is_empty() || req.password.is_empty() {
            return Err(ApiError::Validation(
                "Please provide your email and password.".into(),
            ));
        }

        let email = req.email.trim().to_lowercase();
        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => return Err(ApiError::InvalidCredentials),
        };

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(ApiError::InvalidCredentials)?;

        if !verify_password(&req.password, hash)? {
            return Err(ApiError::InvalidCredentials);
        }

        self.issue_session(user).await
    }

    /// Find-or-create for a provider profile, then issue the session.
    #[instrument(skip(self, profile), fields(email = %profile.email))]
    pub async fn oauth_login(&self, profile: OAuthProfile) -> Result<Session, ApiError> {
        let user = match self.users.find_by_email(&profile.email).await? {
            Some(user) => user,
            None => {
                let user = self
                    .users
                    .create(NewUser {
                        fname: profile.fname,
                        lname: profile.lname,
                        email: profile.email,
                        password_hash: None,
                        is_verified: profile.email_verified,
                        is_social: true,
                        avatar_url: profile.avatar_url,
                    })
                    .await?;
                info!(user_id = %user.id, "social account registered");
                user
            }
        };

        self.issue_session(user).await
    }

    /// Shared session issuance: strip the hash, sign both tokens, write the
    /// cache entry with the standard TTL.
    pub async fn issue_session(&self, mut user: User) -> Result<Session, ApiError> {
        user.password_hash = None;

        let access_token = self
            .codec
            .sign_session(user.id, TokenKind::Access)
            .map_err(|e| ApiError::Upstream(anyhow::anyhow!(e)))?;
        let refresh_token = self
            .codec
            .sign_session(user.id, TokenKind::Refresh)
            .map_err(|e| ApiError::Upstream(anyhow::anyhow!(e)))?;

        let serialized = serde_json::to_string(&user)
            .map_err(|e| ApiError::Upstream(anyhow::Error::new(e)))?;
        self.sessions
            .set(&session_key(user.id), serialized, Some(self.session_ttl))
            .await?;

        Ok(Session {
            user,
            access_token,
            refresh_token,
        })
    }

    /// Refresh treats the cache entry as the source of truth: a valid refresh
    /// token with no cached session requires a fresh login.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, ApiError> {
        let claims = self
            .codec
            .verify_session(refresh_token, TokenKind::Refresh)
            .map_err(session_token_error)?;

        let key = session_key(claims.sub);
        let cached = self.sessions.get(&key).await?.ok_or_else(|| {
            ApiError::AuthenticationRequired("Session data not found. Please log in again.".into())
        })?;

        let user: User = serde_json::from_str(&cached).map_err(|_| {
            ApiError::AuthenticationRequired("Session data not found. Please log in again.".into())
        })?;

        self.issue_session(user).await
    }

    #[instrument(skip(self))]
    pub async fn logout(&self, user_id: Uuid) -> Result<(), ApiError> {
        self.sessions.delete(&session_key(user_id)).await?;
        info!("session revoked");
        Ok(())
    }

    /// Resolves an access token into its user, for request authentication.
    pub async fn authenticate(&self, access_token: &str) -> Result<User, ApiError> {
        if access_token.is_empty() {
            return Err(ApiError::AuthenticationRequired(
                "Please login to access this resource".into(),
            ));
        }

        let claims = self
            .codec
            .verify_session(access_token, TokenKind::Access)
            .map_err(session_token_error)?;

        self.users.find_by_id(claims.sub).await?.ok_or_else(|| {
            ApiError::AuthenticationRequired("Please login to access this resource".into())
        })
    }

    pub fn restrict(&self, user: &User, allowed: &[Role]) -> Result<(), ApiError> {
        if allowed.contains(&user.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    /// Cache read-through for the profile endpoint: serve the cached session
    /// when present, otherwise load from storage and repopulate.
    pub async fn user_info(&self, user_id: Uuid) -> Result<User, ApiError> {
        let key = session_key(user_id);

        if let Some(cached) = self.sessions.get(&key).await? {
            if let Ok(user) = serde_json::from_str::<User>(&cached) {
                return Ok(user);
            }
        }

        let mut user = self.users.find_by_id(user_id).await?.ok_or_else(|| {
            ApiError::AuthenticationRequired("User not found. Please log in again.".into())
        })?;
        user.password_hash = None;

        let serialized = serde_json::to_string(&user)
            .map_err(|e| ApiError::Upstream(anyhow::Error::new(e)))?;
        self.sessions
            .set(&key, serialized, Some(self.session_ttl))
            .await?;

        Ok(user)
    }

    async fn rewrite_cache(&self, user: &User) -> Result<(), ApiError> {
        let mut stripped = user.clone();
        stripped.password_hash = None;
        let serialized = serde_json::to_string(&stripped)
            .map_err(|e| ApiError::Upstream(anyhow::Error::new(e)))?;
        self.sessions
            .set(&session_key(user.id), serialized, Some(self.session_ttl))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, req))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        req: UpdateProfileRequest,
    ) -> Result<User, ApiError> {
        let email = req.email.map(|e| e.trim().to_lowercase());
        if let Some(email) = &email {
            if !is_valid_email(email) {
                return Err(ApiError::Validation(
                    "Please provide a valid email address.".into(),
                ));
            }
        }

        let user = self
            .users
            .update_profile(user_id, req.fname, req.lname, email)
            .await?
            .ok_or_else(|| {
                ApiError::AuthenticationRequired(
                    "User not found. Please log in and try again.".into(),
                )
            })?;

        self.rewrite_cache(&user).await?;
        Ok(user)
    }

    #[instrument(skip(self, req))]
    pub async fn update_password(
        &self,
        user_id: Uuid,
        req: UpdatePasswordRequest,
    ) -> Result<User, ApiError> {
        if req.old_password.is_empty() || req.new_password.is_empty() {
            return Err(ApiError::Validation(
                "Both old and new passwords are required for the password update.".into(),
            ));
        }

        let user = self.users.find_by_id(user_id).await?.ok_or_else(|| {
            ApiError::AuthenticationRequired(
                "Unable to find user. Please sign in to your account and try again.".into(),
            )
        })?;

        let hash = user
            .password_hash
            .as_deref()
            .ok_or_else(|| ApiError::Validation("Invalid user.".into()))?;

        if !verify_password(&req.old_password, hash)? {
            return Err(ApiError::Validation(
                "Incorrect old password. Please try again.".into(),
            ));
        }

        let updated = self
            .users
            .update_password(user_id, hash_password(&req.new_password)?)
            .await?
            .ok_or_else(|| {
                ApiError::AuthenticationRequired(
                    "User not found. Please log in and try again.".into(),
                )
            })?;

        self.rewrite_cache(&updated).await?;
        Ok(updated)
    }

    /// Appends a purchased course to the user record and keeps the cached
    /// session in step.
    #[instrument(skip(self))]
    pub async fn grant_course(&self, user_id: Uuid, course_id: Uuid) -> Result<User, ApiError> {
        let user = self
            .users
            .add_course(user_id, course_id)
            .await?
            .ok_or_else(|| {
                ApiError::AuthenticationRequired("User not found. Please log in again.".into())
            })?;

        self.rewrite_cache(&user).await?;
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn update_role(&self, user_id: Uuid, role: Role) -> Result<User, ApiError> {
        let user = self
            .users
            .update_role(user_id, role)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(
                    "Oops! It seems like the user with the provided ID was not found.".into(),
                )
            })?;

        self.rewrite_cache(&user).await?;
        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        let users = self.users.list().await?;
        if users.is_empty() {
            return Err(ApiError::NotFound(
                "Oops! It seems like there are no users available at the moment.".into(),
            ));
        }
        Ok(users)
    }

    #[instrument(skip(self))]
    pub async fn deactivate(&self, user_id: Uuid) -> Result<User, ApiError> {
        let user = self.users.deactivate(user_id).await?.ok_or_else(|| {
            ApiError::NotFound(
                "Oops! It seems like the user with the provided ID was not found.".into(),
            )
        })?;

        self.rewrite_cache(&user).await?;
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), ApiError> {
        self.users.delete(user_id).await?.ok_or_else(|| {
            ApiError::NotFound(
                "Oops! It seems like the user with the provided ID was not found.".into(),
            )
        })?;

        self.sessions.delete(&session_key(user_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TokenConfig;
    use crate::email::Email;
    use crate::session::InMemorySessionCache;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use time::OffsetDateTime;

    struct MemoryUserStore {
        users: Mutex<Vec<User>>,
    }

    impl MemoryUserStore {
        fn new() -> Self {
            Self {
                users: Mutex::new(Vec::new()),
            }
        }

        fn count(&self) -> usize {
            self.users.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl UserStore for MemoryUserStore {
        async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.email == email)
                .cloned())
        }

        async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            Ok(self
                .users
                .lock()
                .unwrap()
                .iter()
                .find(|u| u.id == id)
                .cloned())
        }

        async fn create(&self, new: NewUser) -> anyhow::Result<User> {
            let now = OffsetDateTime::now_utc();
            let user = User {
                id: Uuid::new_v4(),
                fname: new.fname,
                lname: new.lname,
                email: new.email,
                password_hash: new.password_hash,
                role: Role::User,
                is_verified: new.is_verified,
                is_social: new.is_social,
                active: true,
                avatar_url: new.avatar_url,
                courses: vec![],
                created_at: now,
                updated_at: now,
            };
            self.users.lock().unwrap().push(user.clone());
            Ok(user)
        }

        async fn update_profile(
            &self,
            id: Uuid,
            fname: Option<String>,
            lname: Option<String>,
            email: Option<String>,
        ) -> anyhow::Result<Option<User>> {
            let mut users = self.users.lock().unwrap();
            Ok(users.iter_mut().find(|u| u.id == id).map(|u| {
                if let Some(f) = fname {
                    u.fname = f;
                }
                if let Some(l) = lname {
                    u.lname = l;
                }
                if let Some(e) = email {
                    u.email = e;
                }
                u.clone()
            }))
        }

        async fn update_password(
            &self,
            id: Uuid,
            password_hash: String,
        ) -> anyhow::Result<Option<User>> {
            let mut users = self.users.lock().unwrap();
            Ok(users.iter_mut().find(|u| u.id == id).map(|u| {
                u.password_hash = Some(password_hash);
                u.clone()
            }))
        }

        async fn update_role(&self, id: Uuid, role: Role) -> anyhow::Result<Option<User>> {
            let mut users = self.users.lock().unwrap();
            Ok(users.iter_mut().find(|u| u.id == id).map(|u| {
                u.role = role;
                u.clone()
            }))
        }

        async fn add_course(&self, id: Uuid, course_id: Uuid) -> anyhow::Result<Option<User>> {
            let mut users = self.users.lock().unwrap();
            Ok(users.iter_mut().find(|u| u.id == id).map(|u| {
                u.courses.push(course_id);
                u.clone()
            }))
        }

        async fn list(&self) -> anyhow::Result<Vec<User>> {
            Ok(self.users.lock().unwrap().clone())
        }

        async fn deactivate(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            let mut users = self.users.lock().unwrap();
            Ok(users.iter_mut().find(|u| u.id == id).map(|u| {
                u.active = false;
                u.clone()
            }))
        }

        async fn delete(&self, id: Uuid) -> anyhow::Result<Option<User>> {
            let mut users = self.users.lock().unwrap();
            let found = users.iter().position(|u| u.id == id);
            Ok(found.map(|i| users.remove(i)))
        }
    }

    struct RecordingMailer {
        sent: Mutex<Vec<Email>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, email: Email) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _email: Email) -> anyhow::Result<()> {
            anyhow::bail!("smtp connection refused")
        }
    }

    fn token_config() -> TokenConfig {
        TokenConfig {
            access_secret: "access-secret".into(),
            refresh_secret: "refresh-secret".into(),
            activation_secret: "activation-secret".into(),
            access_ttl_minutes: 5,
            refresh_ttl_days: 3,
            activation_ttl_minutes: 10,
            otp_digits: 6,
        }
    }

    struct Harness {
        auth: Authenticator,
        users: Arc<MemoryUserStore>,
        sessions: Arc<InMemorySessionCache>,
        mailer: Arc<RecordingMailer>,
        /// Codec sharing the authenticator's secrets, for decoding tokens
        /// and crafting expired ones in tests.
        codec: TokenCodec,
    }

    fn harness() -> Harness {
        let users = Arc::new(MemoryUserStore::new());
        let sessions = Arc::new(InMemorySessionCache::new());
        let mailer = Arc::new(RecordingMailer {
            sent: Mutex::new(Vec::new()),
        });
        let cfg = token_config();
        let auth = Authenticator::new(
            users.clone(),
            sessions.clone(),
            mailer.clone(),
            TokenCodec::from_config(&cfg),
            OtpIssuer::new(cfg.otp_digits).unwrap(),
            Duration::from_secs(7 * 24 * 60 * 60),
        );
        Harness {
            auth,
            users,
            sessions,
            mailer,
            codec: TokenCodec::from_config(&cfg),
        }
    }

    fn signup_request() -> SignupRequest {
        SignupRequest {
            fname: "jo".into(),
            lname: "doe".into(),
            email: "jo@x.com".into(),
            password: "Abcd1234!".into(),
            password_confirm: "Abcd1234!".into(),
        }
    }

    #[tokio::test]
    async fn signup_issues_activation_token_with_six_digit_otp() {
        let h = harness();
        let token = h.auth.signup(signup_request()).await.unwrap();

        let claims = h.codec.verify_activation(&token).unwrap();
        assert_eq!(claims.payload.email, "jo@x.com");
        assert!((100_000..1_000_000).contains(&claims.otp));

        let sent = h.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "jo@x.com");
        assert!(sent[0].text.contains(&claims.otp.to_string()));
    }

    #[tokio::test]
    async fn signup_rejects_duplicate_email() {
        let h = harness();
        let token = h.auth.signup(signup_request()).await.unwrap();
        let claims = h.codec.verify_activation(&token).unwrap();
        h.auth
            .activate(ActivationRequest {
                activation_token: token,
                otp: serde_json::json!(claims.otp),
            })
            .await
            .unwrap();

        let err = h.auth.signup(signup_request()).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn signup_rejects_missing_fields_and_mismatched_confirmation() {
        let h = harness();

        let mut req = signup_request();
        req.fname = "".into();
        assert!(matches!(
            h.auth.signup(req).await.unwrap_err(),
            ApiError::Validation(_)
        ));

        let mut req = signup_request();
        req.password_confirm = "different".into();
        assert!(matches!(
            h.auth.signup(req).await.unwrap_err(),
            ApiError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn signup_surfaces_email_delivery_failure() {
        let users = Arc::new(MemoryUserStore::new());
        let cfg = token_config();
        let auth = Authenticator::new(
            users,
            Arc::new(InMemorySessionCache::new()),
            Arc::new(FailingMailer),
            TokenCodec::from_config(&cfg),
            OtpIssuer::new(6).unwrap(),
            Duration::from_secs(60),
        );
        let err = auth.signup(signup_request()).await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));
    }

    #[tokio::test]
    async fn activation_creates_verified_user_with_capitalized_name() {
        let h = harness();
        let token = h.auth.signup(signup_request()).await.unwrap();
        let claims = h.codec.verify_activation(&token).unwrap();

        let user = h
            .auth
            .activate(ActivationRequest {
                activation_token: token,
                otp: serde_json::json!(claims.otp.to_string()),
            })
            .await
            .unwrap();

        assert_eq!(user.fname, "Jo");
        assert_eq!(user.lname, "Doe");
        assert!(user.is_verified);
        assert!(!user.is_social);
        assert!(user.password_hash.is_some());
    }

    #[tokio::test]
    async fn activation_rejects_wrong_and_non_numeric_codes() {
        let h = harness();
        let token = h.auth.signup(signup_request()).await.unwrap();
        let claims = h.codec.verify_activation(&token).unwrap();

        let wrong = claims.otp.wrapping_add(1);
        let err = h
            .auth
            .activate(ActivationRequest {
                activation_token: token.clone(),
                otp: serde_json::json!(wrong),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::OtpMismatch));

        let err = h
            .auth
            .activate(ActivationRequest {
                activation_token: token,
                otp: serde_json::json!("not-a-number"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::OtpMismatch));
    }

    #[tokio::test]
    async fn expired_activation_token_reports_expiration_specifically() {
        let h = harness();
        let past = OffsetDateTime::now_utc() - time::Duration::minutes(15);
        let token = h
            .codec
            .sign_activation_at(
                PendingUser {
                    fname: "jo".into(),
                    lname: "doe".into(),
                    email: "jo@x.com".into(),
                    password_hash: "$argon2id$stub".into(),
                },
                123456,
                past,
            )
            .unwrap();

        let err = h
            .auth
            .activate(ActivationRequest {
                activation_token: token,
                otp: serde_json::json!(123456),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ExpiredToken));
    }

    #[tokio::test]
    async fn activation_replay_hits_duplicate_email_guard() {
        let h = harness();
        let token = h.auth.signup(signup_request()).await.unwrap();
        let claims = h.codec.verify_activation(&token).unwrap();
        let req = || ActivationRequest {
            activation_token: token.clone(),
            otp: serde_json::json!(claims.otp),
        };

        h.auth.activate(req()).await.unwrap();
        let err = h.auth.activate(req()).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    async fn activated_user(h: &Harness) -> User {
        let token = h.auth.signup(signup_request()).await.unwrap();
        let claims = h.codec.verify_activation(&token).unwrap();
        h.auth
            .activate(ActivationRequest {
                activation_token: token,
                otp: serde_json::json!(claims.otp),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn signin_failures_are_indistinguishable() {
        let h = harness();
        activated_user(&h).await;

        let unknown = h
            .auth
            .signin(SigninRequest {
                email: "nobody@x.com".into(),
                password: "Abcd1234!".into(),
            })
            .await
            .unwrap_err();
        let wrong_password = h
            .auth
            .signin(SigninRequest {
                email: "jo@x.com".into(),
                password: "wrong".into(),
            })
            .await
            .unwrap_err();

        assert_eq!(unknown.to_string(), wrong_password.to_string());
        assert_eq!(unknown.status_code(), wrong_password.status_code());
    }

    #[tokio::test]
    async fn signin_issues_session_and_caches_stripped_user() {
        let h = harness();
        let user = activated_user(&h).await;

        let session = h
            .auth
            .signin(SigninRequest {
                email: "jo@x.com".into(),
                password: "Abcd1234!".into(),
            })
            .await
            .unwrap();

        assert_eq!(session.user.id, user.id);
        assert!(session.user.password_hash.is_none());

        let cached = h
            .sessions
            .get(&session_key(user.id))
            .await
            .unwrap()
            .expect("session cache entry");
        assert!(!cached.contains("password_hash"));
        let cached_user: User = serde_json::from_str(&cached).unwrap();
        assert_eq!(cached_user.email, "jo@x.com");
    }

    #[tokio::test]
    async fn refresh_reissues_session_from_cache() {
        let h = harness();
        let user = activated_user(&h).await;
        let session = h
            .auth
            .signin(SigninRequest {
                email: "jo@x.com".into(),
                password: "Abcd1234!".into(),
            })
            .await
            .unwrap();

        let refreshed = h.auth.refresh(&session.refresh_token).await.unwrap();
        assert_eq!(refreshed.user.id, user.id);
        assert!(!refreshed.access_token.is_empty());
    }

    #[tokio::test]
    async fn refresh_after_logout_fails_despite_valid_token() {
        let h = harness();
        let user = activated_user(&h).await;
        let session = h
            .auth
            .signin(SigninRequest {
                email: "jo@x.com".into(),
                password: "Abcd1234!".into(),
            })
            .await
            .unwrap();

        h.auth.logout(user.id).await.unwrap();

        // The token itself still verifies; only the cache entry is gone.
        assert!(h
            .codec
            .verify_session(&session.refresh_token, TokenKind::Refresh)
            .is_ok());
        let err = h.auth.refresh(&session.refresh_token).await.unwrap_err();
        assert!(matches!(err, ApiError::AuthenticationRequired(_)));
    }

    #[tokio::test]
    async fn refresh_rejects_garbage_token() {
        let h = harness();
        let err = h.auth.refresh("not-a-token").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn restrict_enforces_role_membership() {
        let h = harness();
        let mut user = activated_user(&h).await;

        assert!(h.auth.restrict(&user, &[Role::User, Role::Admin]).is_ok());
        let err = h.auth.restrict(&user, &[Role::Admin]).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        user.role = Role::Admin;
        assert!(h.auth.restrict(&user, &[Role::Admin]).is_ok());
    }

    #[tokio::test]
    async fn update_password_requires_correct_old_password() {
        let h = harness();
        let user = activated_user(&h).await;

        let err = h
            .auth
            .update_password(
                user.id,
                UpdatePasswordRequest {
                    old_password: "wrong".into(),
                    new_password: "NewPass99!".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        h.auth
            .update_password(
                user.id,
                UpdatePasswordRequest {
                    old_password: "Abcd1234!".into(),
                    new_password: "NewPass99!".into(),
                },
            )
            .await
            .unwrap();

        h.auth
            .signin(SigninRequest {
                email: "jo@x.com".into(),
                password: "NewPass99!".into(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn oauth_login_registers_social_user_exactly_once() {
        let h = harness();
        let profile = OAuthProfile {
            fname: "Sam".into(),
            lname: "Lee".into(),
            email: "sam@x.com".into(),
            avatar_url: Some("https://img.example/sam.png".into()),
            email_verified: true,
        };

        let first = h.auth.oauth_login(profile.clone()).await.unwrap();
        assert!(first.user.is_social);
        assert!(first.user.is_verified);

        let second = h.auth.oauth_login(profile).await.unwrap();
        assert_eq!(first.user.id, second.user.id);
        assert_eq!(h.users.count(), 1);
    }

    #[tokio::test]
    async fn grant_course_appends_and_refreshes_cached_session() {
        let h = harness();
        let user = activated_user(&h).await;
        let course_id = Uuid::new_v4();

        let updated = h.auth.grant_course(user.id, course_id).await.unwrap();
        assert_eq!(updated.courses, vec![course_id]);

        let cached = h
            .sessions
            .get(&session_key(user.id))
            .await
            .unwrap()
            .expect("session cache entry");
        let cached_user: User = serde_json::from_str(&cached).unwrap();
        assert_eq!(cached_user.courses, vec![course_id]);
    }

    #[tokio::test]
    async fn user_info_reads_through_cache() {
        let h = harness();
        let user = activated_user(&h).await;

        // Cache is empty: first read hits the store and populates it.
        let info = h.auth.user_info(user.id).await.unwrap();
        assert_eq!(info.id, user.id);
        assert!(h
            .sessions
            .get(&session_key(user.id))
            .await
            .unwrap()
            .is_some());

        // Second read is served from the cache.
        let again = h.auth.user_info(user.id).await.unwrap();
        assert_eq!(again.id, user.id);
    }
}
