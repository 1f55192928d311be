use axum::extract::{Form, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use tracing::{info, warn};
use uuid::Uuid;

use crate::assets::{APP_JS, STYLE_CSS};
use crate::auth::{validate_sign_in, validate_sign_up};
use crate::calendar::{bucket_by_day, parse_iso, Calendar};
use crate::error::AppError;
use crate::gateway::TodoOrder;
use crate::middleware::{cleared_cookies, session_cookies, MaybeUser, PageUser, SESSION_COOKIE};
use crate::models::{
    CalendarParams, CreateTodo, DeleteParams, SignInRequest, SignUpRequest, ToggleForm,
    UserSession,
};
use crate::stats::{compute_totals, fetch_monthly_stats};
use crate::store::TodoStore;
use crate::views;
use crate::views::dashboard::Dashboard;
use crate::AppState;

/// Only known pages are accepted as a post-toggle destination.
fn safe_redirect(target: Option<&str>) -> &'static str {
    match target {
        Some("/dashboard") => "/dashboard",
        _ => "/",
    }
}

async fn render_home(
    state: &AppState,
    session: UserSession,
    draft: &str,
    error: Option<AppError>,
    status: StatusCode,
) -> Response {
    let user = session.user.clone();
    match TodoStore::load(state.gateway.clone(), Some(session), TodoOrder::Unspecified).await {
        Ok(store) => {
            let message = error.map(|err| err.message());
            let html = views::todos::home_page(
                &user,
                store.pending(),
                store.completed(),
                draft,
                message.as_deref(),
            );
            (status, Html(html)).into_response()
        }
        Err(err) => {
            warn!(error = ?err, "loading todos failed");
            let message = error.unwrap_or(err).message();
            let html = views::todos::home_page(
                &user,
                std::iter::empty(),
                std::iter::empty(),
                draft,
                Some(&message),
            );
            (status, Html(html)).into_response()
        }
    }
}

pub async fn home(PageUser(session): PageUser, State(state): State<AppState>) -> Response {
    render_home(&state, session, "", None, StatusCode::OK).await
}

pub async fn sign_in_page(MaybeUser(session): MaybeUser) -> Response {
    if session.is_some() {
        return Redirect::to("/").into_response();
    }
    Html(views::auth::sign_in_page("", None)).into_response()
}

pub async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(req): Form<SignInRequest>,
) -> Response {
    let email = req.email.trim();
    let result = match validate_sign_in(email, &req.password) {
        Ok(()) => state
            .sessions
            .sign_in(email, &req.password)
            .await
            .map_err(AppError::from),
        Err(err) => Err(err),
    };

    match result {
        Ok(session) => {
            let [access, refresh] = session_cookies(&session);
            (jar.add(access).add(refresh), Redirect::to("/")).into_response()
        }
        Err(err) => {
            let html = views::auth::sign_in_page(email, Some(&err.message()));
            (err.status(), Html(html)).into_response()
        }
    }
}

pub async fn sign_up_page(MaybeUser(session): MaybeUser) -> Response {
    if session.is_some() {
        return Redirect::to("/").into_response();
    }
    Html(views::auth::sign_up_page("", None)).into_response()
}

/// Creating an account never signs anyone in; the visitor is told to check
/// their inbox and sign in afterwards.
pub async fn sign_up(State(state): State<AppState>, Form(req): Form<SignUpRequest>) -> Response {
    let email = req.email.trim();
    let confirm = req.confirm_password.as_deref().unwrap_or_default();
    let result = match validate_sign_up(email, &req.password, confirm) {
        Ok(()) => state
            .gateway
            .sign_up(email, &req.password)
            .await
            .map_err(AppError::from),
        Err(err) => Err(err),
    };

    match result {
        Ok(outcome) => {
            info!(pending = outcome.confirmation_pending, "Account created");
            Html(views::auth::sign_up_pending_page(email)).into_response()
        }
        Err(err) => {
            let html = views::auth::sign_up_page(email, Some(&err.message()));
            (err.status(), Html(html)).into_response()
        }
    }
}

pub async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Err(err) = state.sessions.sign_out(cookie.value()).await {
            warn!(error = %err, "backend sign-out failed, clearing cookies anyway");
        }
    }
    let [access, refresh] = cleared_cookies();
    (jar.remove(access).remove(refresh), Redirect::to("/signin")).into_response()
}

pub async fn add_todo(
    PageUser(session): PageUser,
    State(state): State<AppState>,
    Form(req): Form<CreateTodo>,
) -> Response {
    let mut store = match TodoStore::load(
        state.gateway.clone(),
        Some(session.clone()),
        TodoOrder::Unspecified,
    )
    .await
    {
        Ok(store) => store,
        Err(err) => {
            let status = err.status();
            return render_home(&state, session, &req.text, Some(err), status).await;
        }
    };

    match store.insert(&req.text).await {
        Ok(_) => Redirect::to("/").into_response(),
        Err(err) => {
            let status = err.status();
            render_home(&state, session, &req.text, Some(err), status).await
        }
    }
}

pub async fn toggle_todo(
    PageUser(session): PageUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(form): Form<ToggleForm>,
) -> Response {
    let result = match TodoStore::load(
        state.gateway.clone(),
        Some(session.clone()),
        TodoOrder::Unspecified,
    )
    .await
    {
        Ok(mut store) => store.toggle_completion(id).await.map(|_| ()),
        Err(err) => Err(err),
    };

    match result {
        Ok(()) => Redirect::to(safe_redirect(form.redirect.as_deref())).into_response(),
        Err(err) => {
            let status = err.status();
            render_home(&state, session, "", Some(err), status).await
        }
    }
}

pub async fn confirm_delete(
    PageUser(session): PageUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    let store = match TodoStore::load(
        state.gateway.clone(),
        Some(session.clone()),
        TodoOrder::Unspecified,
    )
    .await
    {
        Ok(store) => store,
        Err(err) => {
            let status = err.status();
            return render_home(&state, session, "", Some(err), status).await;
        }
    };

    match store.get(id) {
        Some(todo) => {
            Html(views::todos::confirm_delete_page(&session.user, todo, None)).into_response()
        }
        None => {
            render_home(&state, session, "", Some(AppError::NotFound), StatusCode::NOT_FOUND).await
        }
    }
}

/// A post without `confirm=true` lands back on the confirmation page.
pub async fn delete_todo(
    PageUser(session): PageUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Form(params): Form<DeleteParams>,
) -> Response {
    let mut store = match TodoStore::load(
        state.gateway.clone(),
        Some(session.clone()),
        TodoOrder::Unspecified,
    )
    .await
    {
        Ok(store) => store,
        Err(err) => {
            let status = err.status();
            return render_home(&state, session, "", Some(err), status).await;
        }
    };

    let err = match store.delete(id, params.confirm).await {
        Ok(_) => return Redirect::to("/").into_response(),
        Err(err) => err,
    };

    match store.get(id) {
        Some(todo) => {
            let message = match &err {
                AppError::ConfirmationRequired => None,
                other => Some(other.message()),
            };
            let html = views::todos::confirm_delete_page(&session.user, todo, message.as_deref());
            (err.status(), Html(html)).into_response()
        }
        None => {
            let status = err.status();
            render_home(&state, session, "", Some(err), status).await
        }
    }
}

pub async fn dashboard(
    PageUser(session): PageUser,
    State(state): State<AppState>,
    Query(params): Query<CalendarParams>,
) -> Response {
    let today = state.today();
    let mut calendar =
        Calendar::from_link(params.cursor.as_deref(), params.nav.as_deref(), today);

    let (todos, load_error) = match TodoStore::load(
        state.gateway.clone(),
        Some(session.clone()),
        TodoOrder::NewestFirst,
    )
    .await
    {
        Ok(store) => (store.into_todos(), None),
        Err(err) => {
            warn!(error = ?err, "loading todos for dashboard failed");
            (Vec::new(), Some(err.message()))
        }
    };

    let monthly = match fetch_monthly_stats(
        state.gateway.as_ref(),
        &session.access_token,
        session.user.id,
    )
    .await
    {
        Ok(stats) => stats,
        Err(err) => {
            warn!(error = ?err, "monthly stats unavailable");
            Vec::new()
        }
    };

    let buckets = bucket_by_day(&todos, state.utc_offset);
    let selected = params.date.as_deref().and_then(parse_iso).and_then(|date| {
        if date.year() != calendar.year() || date.month() != calendar.month() {
            calendar = Calendar::with_cursor(date, today);
        }
        calendar.click(date.day(), &buckets)
    });

    let recent_len = todos.len().min(5);
    let view = Dashboard {
        user: &session.user,
        totals: compute_totals(&todos),
        calendar,
        buckets: &buckets,
        monthly: &monthly,
        recent: &todos[..recent_len],
        selected: selected.as_ref(),
        error: load_error.as_deref(),
    };
    Html(views::dashboard::dashboard_page(&view)).into_response()
}

pub async fn static_file(Path(path): Path<String>) -> Response {
    match path.as_str() {
        "app.js" => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/javascript")],
            APP_JS,
        )
            .into_response(),
        "style.css" => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/css")],
            STYLE_CSS,
        )
            .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
