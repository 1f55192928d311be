use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::CookieJar;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{validate_sign_in, validate_sign_up};
use crate::error::AppError;
use crate::middleware::{cleared_cookies, session_cookies, MaybeUser, SESSION_COOKIE};
use crate::models::{SignInRequest, SignUpOutcome, SignUpRequest};
use crate::AppState;

pub async fn sign_up(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<SignUpOutcome>), AppError> {
    let confirm = req.confirm_password.as_deref().unwrap_or(&req.password);
    validate_sign_up(&req.email, &req.password, confirm)?;

    let outcome = state.gateway.sign_up(req.email.trim(), &req.password).await?;
    info!(
        pending = outcome.confirmation_pending,
        "Account created"
    );
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignInRequest>,
) -> Result<(CookieJar, impl IntoResponse), AppError> {
    validate_sign_in(&req.email, &req.password)?;

    let session = state.sessions.sign_in(req.email.trim(), &req.password).await?;
    let [access, refresh] = session_cookies(&session);

    Ok((
        jar.add(access).add(refresh),
        Json(json!({ "user": session.user })),
    ))
}

pub async fn sign_out(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, impl IntoResponse) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Err(err) = state.sessions.sign_out(cookie.value()).await {
            warn!(error = %err, "backend sign-out failed, clearing cookies anyway");
        }
    }

    let [access, refresh] = cleared_cookies();
    (
        jar.remove(access).remove(refresh),
        Json(json!({ "success": true })),
    )
}

/// The signed-in user, or `null`.
pub async fn current_user(MaybeUser(session): MaybeUser) -> impl IntoResponse {
    Json(json!({ "user": session.map(|s| s.user) }))
}
