use axum::extract::{Path, Query, State};
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::{json, Value};
use time::Date;
use tracing::{info, warn};
use uuid::Uuid;

use crate::calendar::{bucket_by_day, format_iso, parse_iso, Calendar, DayClick};
use crate::chart::{ColorTier, CompletionChart};
use crate::error::AppError;
use crate::gateway::TodoOrder;
use crate::middleware::ApiUser;
use crate::models::{
    CalendarParams, CreateTodo, DeleteParams, ListParams, MonthlyStat, Todo, UserSession,
};
use crate::stats::{compute_totals, fetch_monthly_stats, Totals};
use crate::store::TodoStore;
use crate::AppState;

async fn load_store(
    state: &AppState,
    session: UserSession,
    order: TodoOrder,
) -> Result<TodoStore, AppError> {
    TodoStore::load(state.gateway.clone(), Some(session), order).await
}

pub async fn list_todos(
    ApiUser(session): ApiUser,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Todo>>, AppError> {
    let order = match params.order.as_deref() {
        Some("recent") => TodoOrder::NewestFirst,
        _ => TodoOrder::Unspecified,
    };
    let store = load_store(&state, session, order).await?;
    info!(count = store.todos().len(), "Listed todos");
    Ok(Json(store.into_todos()))
}

pub async fn create_todo(
    ApiUser(session): ApiUser,
    State(state): State<AppState>,
    Json(req): Json<CreateTodo>,
) -> Result<(StatusCode, Json<Todo>), AppError> {
    let mut store = load_store(&state, session, TodoOrder::Unspecified).await?;
    let todo = store.insert(&req.text).await?.clone();
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn toggle_todo(
    ApiUser(session): ApiUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Todo>, AppError> {
    let mut store = load_store(&state, session, TodoOrder::Unspecified).await?;
    let todo = store.toggle_completion(id).await?.clone();
    Ok(Json(todo))
}

/// Needs `?confirm=true`; an unconfirmed delete is rejected before the
/// backend is asked.
pub async fn delete_todo(
    ApiUser(session): ApiUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<DeleteParams>,
) -> Result<impl IntoResponse, AppError> {
    if !params.confirm {
        return Err(AppError::ConfirmationRequired);
    }
    let mut store = load_store(&state, session, TodoOrder::Unspecified).await?;
    store.delete(id, params.confirm).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ChartSummary {
    pub percentage: u8,
    pub pending_percentage: u8,
    pub tier: ColorTier,
    pub color: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub totals: Totals,
    pub chart: ChartSummary,
}

pub async fn stats(
    ApiUser(session): ApiUser,
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, AppError> {
    let store = load_store(&state, session, TodoOrder::Unspecified).await?;
    let totals = compute_totals(store.todos());
    let chart = CompletionChart::new(totals.total, totals.completed);
    Ok(Json(StatsResponse {
        totals,
        chart: ChartSummary {
            percentage: chart.percentage(),
            pending_percentage: chart.pending_percentage(),
            tier: chart.tier(),
            color: chart.tier().color(),
        },
    }))
}

pub async fn monthly_stats(
    ApiUser(session): ApiUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<MonthlyStat>>, AppError> {
    let stats =
        fetch_monthly_stats(state.gateway.as_ref(), &session.access_token, session.user.id)
            .await?;
    for stat in stats.iter().filter(|stat| !stat.is_consistent()) {
        warn!(month = %stat.month, "monthly stat has more completed than total todos");
    }
    Ok(Json(stats))
}

pub async fn calendar(
    ApiUser(session): ApiUser,
    State(state): State<AppState>,
    Query(params): Query<CalendarParams>,
) -> Result<Json<Value>, AppError> {
    let calendar = Calendar::from_link(
        params.cursor.as_deref(),
        params.nav.as_deref(),
        state.today(),
    );
    let store = load_store(&state, session, TodoOrder::Unspecified).await?;
    let buckets = bucket_by_day(store.todos(), state.utc_offset);

    let weeks: Vec<Vec<Value>> = calendar
        .weeks()
        .iter()
        .map(|week| {
            week.iter()
                .map(|cell| match cell.and_then(|day| calendar.date_for(day).map(|d| (day, d))) {
                    Some((day, date)) => json!({
                        "day": day,
                        "date": format_iso(date),
                        "count": buckets.count_on(date),
                        "today": calendar.is_today(day),
                    }),
                    None => Value::Null,
                })
                .collect()
        })
        .collect();

    Ok(Json(json!({
        "title": calendar.title(),
        "cursor": format_iso(calendar.cursor()),
        "today": format_iso(calendar.today()),
        "weeks": weeks,
    })))
}

pub async fn calendar_day(
    ApiUser(session): ApiUser,
    State(state): State<AppState>,
    Path(date): Path<String>,
) -> Result<Json<DayClick>, AppError> {
    let date: Date = parse_iso(&date)
        .ok_or_else(|| AppError::Validation("Date must look like YYYY-MM-DD".to_string()))?;
    let store = load_store(&state, session, TodoOrder::Unspecified).await?;
    let buckets = bucket_by_day(store.todos(), state.utc_offset);
    let click = Calendar::with_cursor(date, state.today())
        .click(date.day(), &buckets)
        .ok_or(AppError::NotFound)?;
    Ok(Json(click))
}
