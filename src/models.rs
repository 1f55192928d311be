use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
}

/// Row shape sent to the backend on insert; id and created_at are server-assigned.
#[derive(Debug, Clone, Serialize)]
pub struct NewTodo {
    pub user_id: Uuid,
    pub text: String,
    pub completed: bool,
}

/// Where a monthly stat's month label came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthSource {
    Month,
    MonthYear,
    Period,
    Date,
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyStat {
    pub month: String,
    pub total_todos: i64,
    pub completed_todos: i64,
    pub source: MonthSource,
}

impl MonthlyStat {
    pub fn is_consistent(&self) -> bool {
        self.completed_todos <= self.total_todos
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignUpOutcome {
    pub user: Option<User>,
    pub confirmation_pending: bool,
}

/// A resolved session for the current request.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub user: User,
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTodo {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// Forms always send it; JSON callers may leave it out.
    #[serde(default)]
    pub confirm_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// `recent` lists newest first.
    pub order: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToggleForm {
    pub redirect: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CalendarParams {
    pub cursor: Option<String>,
    pub nav: Option<String>,
    pub date: Option<String>,
}
