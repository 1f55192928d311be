use std::convert::Infallible;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{request::Parts, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{Redirect, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::{AuthSession, UserSession};
use crate::AppState;

pub const SESSION_COOKIE: &str = "session";
pub const REFRESH_COOKIE: &str = "refresh";

/// Signed-in caller of a JSON route; rejects with 401.
pub struct ApiUser(pub UserSession);

/// Signed-in visitor of a page; anyone else is sent to `/signin`.
pub struct PageUser(pub UserSession);

/// The session, if the request carries a valid one.
pub struct MaybeUser(pub Option<UserSession>);

impl FromRequestParts<AppState> for ApiUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match current_session(parts, state).await {
            Some(session) => Ok(ApiUser(session)),
            None => Err(AppError::AuthRequired),
        }
    }
}

impl FromRequestParts<AppState> for PageUser {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match current_session(parts, state).await {
            Some(session) => Ok(PageUser(session)),
            None => Err(Redirect::to("/signin")),
        }
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(current_session(parts, state).await))
    }
}

async fn current_session(parts: &Parts, state: &AppState) -> Option<UserSession> {
    let jar = CookieJar::from_headers(&parts.headers);
    let token = jar.get(SESSION_COOKIE)?.value().to_string();
    state.sessions.resolve(&token).await
}

fn cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(7))
        .build()
}

pub fn session_cookies(session: &AuthSession) -> [Cookie<'static>; 2] {
    [
        cookie(SESSION_COOKIE, session.access_token.clone()),
        cookie(REFRESH_COOKIE, session.refresh_token.clone()),
    ]
}

pub fn cleared_cookies() -> [Cookie<'static>; 2] {
    [SESSION_COOKIE, REFRESH_COOKIE].map(|name| {
        let mut cookie = cookie(name, String::new());
        cookie.make_removal();
        cookie
    })
}

/// Swaps an expired access token for a fresh one before the handler runs.
///
/// Only kicks in when the `session` cookie no longer resolves and a `refresh`
/// cookie is present. The handler sees the new cookies; the browser gets them
/// through `Set-Cookie`. A rejected refresh token clears both cookies.
pub async fn refresh_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let jar = CookieJar::from_headers(request.headers());
    let refresh_token = match jar.get(REFRESH_COOKIE) {
        Some(cookie) if !cookie.value().is_empty() => cookie.value().to_string(),
        _ => return next.run(request).await,
    };
    if let Some(access) = jar.get(SESSION_COOKIE) {
        if state.sessions.current_user(access.value()).await.is_some() {
            return next.run(request).await;
        }
    }

    let (replacement, outgoing) = match state.sessions.refresh(&refresh_token).await {
        Ok(session) => {
            debug!(user_id = %session.user.id, "refreshed session from cookie");
            (session_cookies(&session), session_cookies(&session))
        }
        Err(err) => {
            warn!(error = %err, "session refresh rejected");
            let cleared = cleared_cookies();
            (cleared.clone(), cleared)
        }
    };

    rewrite_cookie_header(request.headers_mut(), &jar, &replacement);
    let mut response = next.run(request).await;
    for cookie in outgoing {
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
    response
}

fn rewrite_cookie_header(headers: &mut HeaderMap, jar: &CookieJar, replacement: &[Cookie<'static>]) {
    let mut pairs: Vec<String> = jar
        .iter()
        .filter(|c| c.name() != SESSION_COOKIE && c.name() != REFRESH_COOKIE)
        .map(|c| format!("{}={}", c.name(), c.value()))
        .collect();
    pairs.extend(
        replacement
            .iter()
            .filter(|c| !c.value().is_empty())
            .map(|c| format!("{}={}", c.name(), c.value())),
    );

    headers.remove(COOKIE);
    if let Ok(value) = HeaderValue::from_str(&pairs.join("; ")) {
        if !pairs.is_empty() {
            headers.insert(COOKIE, value);
        }
    }
}

