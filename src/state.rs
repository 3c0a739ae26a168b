use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::auth::repo::PgUserStore;
use crate::auth::service::Authenticator;
use crate::auth::{OtpIssuer, TokenCodec};
use crate::categories::repo::PgCategoryStore;
use crate::config::AppConfig;
use crate::courses::content::ContentService;
use crate::courses::repo::PgCourseStore;
use crate::email::SmtpMailer;
use crate::orders::repo::PgOrderStore;
use crate::resource::ResourceService;
use crate::reviews::repo::PgReviewStore;
use crate::session::InMemorySessionCache;
use crate::storage::{ObjectStorage, S3Storage};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub auth: Arc<Authenticator>,
    pub categories: Arc<ResourceService<PgCategoryStore>>,
    pub courses: Arc<ResourceService<PgCourseStore>>,
    pub course_content: Arc<ContentService>,
    pub orders: Arc<ResourceService<PgOrderStore>>,
    pub reviews: Arc<ResourceService<PgReviewStore>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage =
            Arc::new(S3Storage::from_config(&config.s3).await?) as Arc<dyn ObjectStorage>;
        let mailer = Arc::new(SmtpMailer::from_config(&config.smtp)?);
        let sessions = Arc::new(InMemorySessionCache::new());

        let auth = Arc::new(Authenticator::new(
            Arc::new(PgUserStore::new(db.clone())),
            sessions,
            mailer,
            TokenCodec::from_config(&config.tokens),
            OtpIssuer::new(config.tokens.otp_digits)?,
            Duration::from_secs(config.session_ttl_secs),
        ));

        Ok(Self {
            auth,
            categories: Arc::new(ResourceService::new(
                PgCategoryStore::new(db.clone()),
                storage.clone(),
            )),
            courses: Arc::new(ResourceService::new(
                PgCourseStore::new(db.clone()),
                storage.clone(),
            )),
            course_content: Arc::new(ContentService::new(Arc::new(PgCourseStore::new(
                db.clone(),
            )))),
            orders: Arc::new(ResourceService::new(
                PgOrderStore::new(db.clone()),
                storage.clone(),
            )),
            reviews: Arc::new(ResourceService::new(
                PgReviewStore::new(db.clone()),
                storage,
            )),
            db,
            config,
        })
    }
}
