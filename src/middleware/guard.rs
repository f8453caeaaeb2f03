use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::services::auth::{AuthService, AUTH_COOKIE};
use crate::AppState;

/// Routing guard for the committee area. Runs before any protected handler:
/// recomputes the expected session token fresh for every request (secrets
/// may rotate) and bounces unauthenticated visitors to the login page with
/// the intended destination preserved.
pub async fn commission_guard(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(req.headers());
    let presented = jar
        .get(AUTH_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_default();

    if AuthService::token_matches(&state.config.session, &presented) {
        return next.run(req).await;
    }

    // Nested routers see a stripped path; the original URI extension keeps
    // the full one for the post-login redirect.
    let wanted = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let dest = format!("/login?next={}", urlencoding::encode(&wanted));
    Redirect::to(&dest).into_response()
}
