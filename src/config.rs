use anyhow::Context;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub activation_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    pub activation_ttl_minutes: i64,
    pub otp_digits: u32,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    pub from_name: String,
}

#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub client_url: String,
    pub production: bool,
    pub session_ttl_secs: u64,
    pub tokens: TokenConfig,
    pub smtp: SmtpConfig,
    pub s3: S3Config,
    pub google: OAuthProviderConfig,
    pub github: OAuthProviderConfig,
}

fn required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("{key} is not set"))
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    /// Loads configuration from the environment. Every required value missing
    /// here aborts startup rather than failing the first request that needs it.
    pub fn from_env() -> anyhow::Result<Self> {
        let tokens = TokenConfig {
            access_secret: required("ACCESS_TOKEN_SECRET")?,
            refresh_secret: required("REFRESH_TOKEN_SECRET")?,
            activation_secret: required("ACTIVATION_SECRET")?,
            access_ttl_minutes: parsed_or("ACCESS_TOKEN_EXPIRE_MINUTES", 5),
            refresh_ttl_days: parsed_or("REFRESH_TOKEN_EXPIRE_DAYS", 3),
            activation_ttl_minutes: parsed_or("ACTIVATION_TOKEN_EXPIRE_MINUTES", 10),
            otp_digits: parsed_or("OTP_DIGITS", 6),
        };

        let smtp = SmtpConfig {
            host: required("EMAIL_HOST")?,
            port: parsed_or("EMAIL_PORT", 465),
            username: required("EMAIL_USERNAME")?,
            password: required("EMAIL_PASSWORD")?,
            from_address: required("EMAIL_FROM")?,
            from_name: std::env::var("EMAIL_FROM_NAME").unwrap_or_else(|_| "Coursehub".into()),
        };

        let s3 = S3Config {
            endpoint: required("S3_ENDPOINT")?,
            bucket: required("S3_BUCKET")?,
            access_key: required("S3_ACCESS_KEY")?,
            secret_key: required("S3_SECRET_KEY")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };

        let google = OAuthProviderConfig {
            client_id: required("GOOGLE_CLIENT_ID")?,
            client_secret: required("GOOGLE_CLIENT_SECRET")?,
            callback_url: required("GOOGLE_CALLBACK_URL")?,
        };

        let github = OAuthProviderConfig {
            client_id: required("GITHUB_CLIENT_ID")?,
            client_secret: required("GITHUB_CLIENT_SECRET")?,
            callback_url: required("GITHUB_CALLBACK_URL")?,
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            client_url: std::env::var("CLIENT_URL").unwrap_or_else(|_| "/".into()),
            production: std::env::var("APP_ENV")
                .map(|v| v == "production")
                .unwrap_or(false),
            session_ttl_secs: parsed_or("SESSION_TTL_SECS", 7 * 24 * 60 * 60),
            tokens,
            smtp,
            s3,
            google,
            github,
        })
    }
}
