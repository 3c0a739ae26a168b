use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tracing::error;

use super::dto::OAuthProfile;
use crate::config::OAuthProviderConfig;
use crate::error::ApiError;
use crate::state::AppState;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";

const GITHUB_AUTH_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USERINFO_URL: &str = "https://api.github.com/user";

const STATE_COOKIE: &str = "oauth_state";
const VERIFIER_COOKIE: &str = "oauth_verifier";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/google", get(google_redirect))
        .route("/google/callback", get(google_callback))
        .route("/github", get(github_redirect))
        .route("/github/callback", get(github_callback))
}

struct Endpoints {
    auth_url: &'static str,
    token_url: &'static str,
    scopes: &'static [&'static str],
}

const GOOGLE: Endpoints = Endpoints {
    auth_url: GOOGLE_AUTH_URL,
    token_url: GOOGLE_TOKEN_URL,
    scopes: &["openid", "email", "profile"],
};

const GITHUB: Endpoints = Endpoints {
    auth_url: GITHUB_AUTH_URL,
    token_url: GITHUB_TOKEN_URL,
    scopes: &["read:user", "user:email"],
};

fn oauth_client(
    cfg: &OAuthProviderConfig,
    endpoints: &Endpoints,
) -> Result<
    BasicClient<
        oauth2::EndpointSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointNotSet,
        oauth2::EndpointSet,
    >,
    ApiError,
> {
    let auth_url = AuthUrl::new(endpoints.auth_url.to_string())
        .map_err(|e| ApiError::Configuration(format!("invalid authorization URL: {e}")))?;
    let token_url = TokenUrl::new(endpoints.token_url.to_string())
        .map_err(|e| ApiError::Configuration(format!("invalid token URL: {e}")))?;
    let redirect_url = RedirectUrl::new(cfg.callback_url.clone())
        .map_err(|e| ApiError::Configuration(format!("invalid redirect URL: {e}")))?;

    Ok(BasicClient::new(ClientId::new(cfg.client_id.clone()))
        .set_client_secret(ClientSecret::new(cfg.client_secret.clone()))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url))
}

fn transient_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::minutes(10))
        .build()
}

/// Starts the authorization code flow: PKCE challenge plus a CSRF state,
/// both parked in short-lived cookies until the provider calls back.
fn begin_flow(
    state: &AppState,
    cfg: &OAuthProviderConfig,
    endpoints: &Endpoints,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), ApiError> {
    let client = oauth_client(cfg, endpoints)?;
    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let mut request = client
        .authorize_url(CsrfToken::new_random)
        .set_pkce_challenge(pkce_challenge);
    for scope in endpoints.scopes {
        request = request.add_scope(Scope::new((*scope).to_string()));
    }
    let (auth_url, csrf_state) = request.url();

    let secure = state.config.production;
    let jar = jar
        .add(transient_cookie(
            STATE_COOKIE,
            csrf_state.secret().to_string(),
            secure,
        ))
        .add(transient_cookie(
            VERIFIER_COOKIE,
            pkce_verifier.secret().to_string(),
            secure,
        ));

    Ok((jar, Redirect::temporary(auth_url.as_str())))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: String,
    state: String,
}

/// Finishes the code flow: validate the CSRF state against the cookie,
/// exchange the code, and return the provider access token.
async fn finish_flow(
    cfg: &OAuthProviderConfig,
    endpoints: &Endpoints,
    jar: &CookieJar,
    query: &CallbackQuery,
) -> Result<String, ApiError> {
    let expected_state = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    if expected_state.as_deref() != Some(query.state.as_str()) {
        return Err(ApiError::InvalidToken(
            "OAuth state mismatch. Please restart the sign-in flow.".into(),
        ));
    }

    let verifier = jar
        .get(VERIFIER_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| {
            ApiError::InvalidToken("OAuth session expired. Please restart the sign-in flow.".into())
        })?;

    let client = oauth_client(cfg, endpoints)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ApiError::Upstream(anyhow::Error::new(e)))?;

    let token = client
        .exchange_code(AuthorizationCode::new(query.code.clone()))
        .set_pkce_verifier(PkceCodeVerifier::new(verifier))
        .request_async(&http_client)
        .await
        .map_err(|e| {
            error!(error = %e, "code exchange failed");
            ApiError::Upstream(anyhow::anyhow!("OAuth code exchange failed"))
        })?;

    Ok(token.access_token().secret().to_string())
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    given_name: Option<String>,
    family_name: Option<String>,
    email: Option<String>,
    picture: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

fn google_profile(info: GoogleUserInfo) -> Result<OAuthProfile, ApiError> {
    let email = info.email.ok_or_else(|| {
        ApiError::Validation("Google did not return an email address for this account.".into())
    })?;

    Ok(OAuthProfile {
        fname: info.given_name.unwrap_or_default(),
        lname: info.family_name.unwrap_or_default(),
        email: email.to_lowercase(),
        avatar_url: info.picture,
        email_verified: info.email_verified,
    })
}

#[derive(Debug, Deserialize)]
struct GithubUserInfo {
    login: String,
    name: Option<String>,
    avatar_url: Option<String>,
}

/// GitHub has no structured name and may hide the email entirely, so the
/// display name is split on the first space and the login stands in for
/// a missing name. The login also serves as the account identifier.
fn github_profile(info: GithubUserInfo) -> OAuthProfile {
    let name = info.name.unwrap_or_else(|| info.login.clone());
    let (fname, lname) = match name.split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.to_string()),
        None => (name, String::new()),
    };

    OAuthProfile {
        fname,
        lname,
        email: info.login.to_lowercase(),
        avatar_url: info.avatar_url,
        email_verified: true,
    }
}

async fn google_redirect(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    begin_flow(&state, &state.config.google, &GOOGLE, jar)
}

async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let access_token = finish_flow(&state.config.google, &GOOGLE, &jar, &query).await?;

    let info: GoogleUserInfo = reqwest::Client::new()
        .get(GOOGLE_USERINFO_URL)
        .bearer_auth(&access_token)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            error!(error = %e, "userinfo request failed");
            ApiError::Upstream(anyhow::anyhow!("Could not fetch the Google profile"))
        })?
        .json()
        .await
        .map_err(|e| ApiError::Upstream(anyhow::Error::new(e)))?;

    complete_login(state, jar, google_profile(info)?).await
}

async fn github_redirect(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    begin_flow(&state, &state.config.github, &GITHUB, jar)
}

async fn github_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let access_token = finish_flow(&state.config.github, &GITHUB, &jar, &query).await?;

    let info: GithubUserInfo = reqwest::Client::new()
        .get(GITHUB_USERINFO_URL)
        .bearer_auth(&access_token)
        .header("Accept", "application/vnd.github+json")
        .header("X-GitHub-Api-Version", "2022-11-28")
        .header("User-Agent", "coursehub")
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| {
            error!(error = %e, "userinfo request failed");
            ApiError::Upstream(anyhow::anyhow!("Could not fetch the GitHub profile"))
        })?
        .json()
        .await
        .map_err(|e| ApiError::Upstream(anyhow::Error::new(e)))?;

    complete_login(state, jar, github_profile(info)).await
}

/// Turns a provider profile into a local session and sends the browser back
/// to the frontend with the cookies set and the transient flow cookies gone.
async fn complete_login(
    state: AppState,
    jar: CookieJar,
    profile: OAuthProfile,
) -> Result<(CookieJar, Redirect), ApiError> {
    let session = state.auth.oauth_login(profile).await?;

    let jar = jar
        .remove(Cookie::build((STATE_COOKIE, "")).path("/").build())
        .remove(Cookie::build((VERIFIER_COOKIE, "")).path("/").build());
    let jar = super::handlers::apply_session_cookies(&state, &session, jar);

    Ok((jar, Redirect::temporary(&state.config.client_url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn google_profile_requires_an_email() {
        let info = GoogleUserInfo {
            given_name: Some("Ada".into()),
            family_name: Some("Lovelace".into()),
            email: None,
            picture: None,
            email_verified: true,
        };
        assert!(matches!(
            google_profile(info).unwrap_err(),
            ApiError::Validation(_)
        ));
    }

    #[test]
    fn google_profile_lowercases_email() {
        let info = GoogleUserInfo {
            given_name: Some("Ada".into()),
            family_name: Some("Lovelace".into()),
            email: Some("Ada@Example.COM".into()),
            picture: Some("https://img.example/a.png".into()),
            email_verified: true,
        };
        let profile = google_profile(info).unwrap();
        assert_eq!(profile.email, "ada@example.com");
        assert_eq!(profile.fname, "Ada");
        assert!(profile.email_verified);
    }

    #[test]
    fn github_profile_splits_display_name() {
        let info = GithubUserInfo {
            login: "octocat".into(),
            name: Some("Mona Lisa Octocat".into()),
            avatar_url: Some("https://img.example/o.png".into()),
        };
        let profile = github_profile(info);
        assert_eq!(profile.fname, "Mona");
        assert_eq!(profile.lname, "Lisa Octocat");
        assert_eq!(profile.email, "octocat");
    }

    #[test]
    fn github_profile_falls_back_to_login_for_missing_name() {
        let info = GithubUserInfo {
            login: "octocat".into(),
            name: None,
            avatar_url: None,
        };
        let profile = github_profile(info);
        assert_eq!(profile.fname, "octocat");
        assert_eq!(profile.lname, "");
    }

    #[test]
    fn github_userinfo_deserializes_from_api_shape() {
        let json = r#"{
            "login": "octocat",
            "id": 1,
            "avatar_url": "https://github.com/images/error/octocat_happy.gif",
            "name": "monalisa octocat"
        }"#;
        let info: GithubUserInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.login, "octocat");
        assert_eq!(info.name.as_deref(), Some("monalisa octocat"));
    }
}
