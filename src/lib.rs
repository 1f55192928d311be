pub mod assets;
pub mod auth;
pub mod calendar;
pub mod chart;
pub mod config;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod session;
pub mod stats;
pub mod store;
pub mod views;

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use gateway::Gateway;
use session::SessionObserver;
use time::{Date, OffsetDateTime, UtcOffset};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn Gateway>,
    pub sessions: Arc<SessionObserver>,
    pub utc_offset: UtcOffset,
}

impl AppState {
    /// Starts the session observer, so this needs a running tokio runtime.
    pub fn new(gateway: Arc<dyn Gateway>, utc_offset: UtcOffset) -> Self {
        let sessions = Arc::new(SessionObserver::start(gateway.clone()));
        Self {
            gateway,
            sessions,
            utc_offset,
        }
    }

    pub fn today(&self) -> Date {
        OffsetDateTime::now_utc().to_offset(self.utc_offset).date()
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::web::home))
        .route(
            "/signin",
            get(handlers::web::sign_in_page).post(handlers::web::sign_in),
        )
        .route(
            "/signup",
            get(handlers::web::sign_up_page).post(handlers::web::sign_up),
        )
        .route("/signout", post(handlers::web::sign_out))
        .route("/dashboard", get(handlers::web::dashboard))
        .route("/todos", post(handlers::web::add_todo))
        .route("/todos/{id}/toggle", post(handlers::web::toggle_todo))
        .route(
            "/todos/{id}/delete",
            get(handlers::web::confirm_delete).post(handlers::web::delete_todo),
        )
        .route("/static/{*path}", get(handlers::web::static_file))
        .route("/api/auth/signup", post(handlers::auth::sign_up))
        .route("/api/auth/signin", post(handlers::auth::sign_in))
        .route("/api/auth/signout", post(handlers::auth::sign_out))
        .route("/api/auth/user", get(handlers::auth::current_user))
        .route(
            "/api/todos",
            get(handlers::api::list_todos).post(handlers::api::create_todo),
        )
        .route("/api/todos/{id}/toggle", post(handlers::api::toggle_todo))
        .route("/api/todos/{id}", delete(handlers::api::delete_todo))
        .route("/api/stats", get(handlers::api::stats))
        .route("/api/stats/monthly", get(handlers::api::monthly_stats))
        .route("/api/calendar", get(handlers::api::calendar))
        .route("/api/calendar/{date}", get(handlers::api::calendar_day))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::refresh_session,
        ))
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::compression::CompressionLayer::new()),
        )
        .with_state(state)
}
