use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::request::Parts,
    response::Redirect,
    routing::{get, post},
    Form, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use url::Url;

use crate::config::Config;
use crate::error::AppError;
use crate::services::auth::{AuthService, AUTH_COOKIE, USER_COOKIE};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", get(logout).post(logout))
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    /// Destination to return to after login, preserved across failures.
    #[serde(default)]
    pub next: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Committee login: allow-listed name plus the shared intranet password.
/// Success sets the session cookies and redirects to the requested page;
/// failure bounces back to the login form with an error flag, keeping `next`.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> (CookieJar, Redirect) {
    let next = form.next.as_deref().map(str::trim).filter(|n| !n.is_empty());

    match AuthService::verify_login(&state.config.session, &form.username, &form.password) {
        Ok(member) => {
            tracing::info!("Committee login: {}", member);
            let token = AuthService::session_token(&state.config.session);
            let jar = jar
                .add(session_cookie(AUTH_COOKIE, token, true, &state.config))
                .add(session_cookie(USER_COOKIE, member, false, &state.config));

            let dest = next
                .filter(|n| is_safe_redirect(n, &state.config.server.frontend_url))
                .unwrap_or("/comision");
            (jar, Redirect::to(dest))
        }
        Err(_) => {
            tracing::warn!("Failed committee login attempt for '{}'", form.username.trim());
            let mut dest = "/login?error=1".to_string();
            if let Some(n) = next {
                dest.push_str(&format!("&next={}", urlencoding::encode(n)));
            }
            (jar, Redirect::to(&dest))
        }
    }
}

/// Clear both session cookies and go home.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    let jar = jar
        .add(expired_cookie(AUTH_COOKIE, true, &state.config))
        .add(expired_cookie(USER_COOKIE, false, &state.config));
    (jar, Redirect::to("/"))
}

// ============================================================================
// Cookies
// ============================================================================

fn cookie_security(config: &Config) -> (bool, SameSite) {
    let secure = config
        .server
        .cookie_secure
        .unwrap_or_else(|| config.server.frontend_url.starts_with("https"));
    let same_site = match config
        .server
        .cookie_same_site
        .as_deref()
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("strict") => SameSite::Strict,
        Some("none") => SameSite::None,
        _ => SameSite::Lax,
    };
    (secure, same_site)
}

fn session_cookie(
    name: &'static str,
    value: String,
    http_only: bool,
    config: &Config,
) -> Cookie<'static> {
    let (secure, same_site) = cookie_security(config);
    let mut cookie = Cookie::new(name, value);
    cookie.set_path("/");
    cookie.set_http_only(http_only);
    cookie.set_secure(secure);
    cookie.set_same_site(same_site);
    cookie.set_max_age(time::Duration::days(config.session.cookie_max_age_days));
    cookie
}

fn expired_cookie(name: &'static str, http_only: bool, config: &Config) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new(), http_only, config);
    cookie.set_max_age(time::Duration::ZERO);
    cookie
}

/// Validate a post-login destination to prevent open redirects. Accept only
/// relative paths starting with a single '/' or absolute URLs sharing the
/// configured frontend origin.
fn is_safe_redirect(redirect: &str, frontend_base: &str) -> bool {
    if redirect.starts_with('/') && !redirect.starts_with("//") {
        return true;
    }
    if let Ok(u) = Url::parse(redirect) {
        if let Ok(front) = Url::parse(frontend_base) {
            return u.origin() == front.origin();
        }
    }
    false
}

// ============================================================================
// Request context
// ============================================================================

/// Request context produced by the auth gate, passed into protected handlers
/// instead of each handler re-reading cookies: the session is verified and
/// the (unauthenticated, display-only) username is resolved when present.
pub struct Commission {
    pub username: Option<String>,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Commission {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let presented = jar.get(AUTH_COOKIE).map(|c| c.value()).unwrap_or("");

        if !AuthService::token_matches(&state.config.session, presented) {
            tracing::debug!("Missing or invalid session cookie");
            return Err(AppError::Unauthorized("No autorizado".to_string()));
        }

        let username = jar
            .get(USER_COOKIE)
            .map(|c| c.value().trim().to_string())
            .filter(|u| !u.is_empty());

        Ok(Commission { username })
    }
}
