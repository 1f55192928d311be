//! Boundary between the application and the backend service.
//!
//! Every operation the UI needs (auth plus todo CRUD plus the monthly
//! aggregate) goes through [`Gateway`], so handlers never talk to a concrete
//! backend. [`SupabaseGateway`] targets the hosted service, [`LocalGateway`]
//! is a SQLite-backed stand-in used for development and tests.

pub mod local;
pub mod supabase;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{AuthSession, MonthSource, MonthlyStat, NewTodo, SignUpOutcome, Todo, User};

pub use local::LocalGateway;
pub use supabase::SupabaseGateway;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Input rejected by the backend (malformed email, weak password, ...).
    #[error("{0}")]
    Validation(String),
    /// Bad credentials, unconfirmed account, invalid or expired token.
    #[error("{0}")]
    Auth(String),
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Data(String),
    #[error("backend unreachable: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Data(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        GatewayError::Data(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TodoOrder {
    /// Whatever order the backend returns.
    #[default]
    Unspecified,
    NewestFirst,
}

#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    SignedOut { access_token: String },
    TokenRefreshed { previous_access_token: String, session: AuthSession },
}

/// Fan-out of auth state transitions to every registered listener.
#[derive(Debug, Clone)]
pub struct AuthEvents {
    sender: broadcast::Sender<AuthEvent>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn publish(&self, event: AuthEvent) {
        // No listeners is fine; nobody is observing sessions yet.
        if self.sender.send(event).is_err() {
            debug!("auth event dropped, no listeners");
        }
    }

    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered auth-state listener. Dropping it unregisters the listener.
#[derive(Debug)]
pub struct AuthSubscription {
    receiver: broadcast::Receiver<AuthEvent>,
}

impl AuthSubscription {
    /// Next event, or `None` once the gateway is gone.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth listener lagged behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Registers an account. No session exists until the email is confirmed.
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, GatewayError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, GatewayError>;

    /// Invalidates the session. Signing out an unknown session succeeds.
    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError>;

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, GatewayError>;

    /// `Ok(None)` is the ordinary "not logged in" outcome, not an error.
    async fn current_user(&self, access_token: &str) -> Result<Option<User>, GatewayError>;

    fn on_auth_state_change(&self) -> AuthSubscription;

    async fn list_todos(
        &self,
        access_token: &str,
        user_id: Uuid,
        order: TodoOrder,
    ) -> Result<Vec<Todo>, GatewayError>;

    async fn insert_todo(&self, access_token: &str, todo: &NewTodo) -> Result<Todo, GatewayError>;

    /// Sets `completed` on the row matching both `id` and `user_id` and
    /// returns the stored row.
    async fn update_todo(
        &self,
        access_token: &str,
        id: Uuid,
        user_id: Uuid,
        completed: bool,
    ) -> Result<Todo, GatewayError>;

    /// Deletes the row matching both `id` and `user_id`.
    async fn delete_todo(&self, access_token: &str, id: Uuid, user_id: Uuid)
        -> Result<(), GatewayError>;

    /// Newest months first, at most `limit` rows.
    async fn monthly_stats(
        &self,
        access_token: &str,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MonthlyStat>, GatewayError>;
}

const MONTH_FIELDS: [(&str, MonthSource); 4] = [
    ("month", MonthSource::Month),
    ("month_year", MonthSource::MonthYear),
    ("period", MonthSource::Period),
    ("date", MonthSource::Date),
];

/// Maps one raw aggregate row onto [`MonthlyStat`].
///
/// `month` is the contract; the other candidates are a best-effort tolerance
/// for older schemas. Without any usable month value the label is synthesized
/// from the row's position (`month-1` is the first row).
pub fn normalize_monthly_stat(row: &Map<String, Value>, index: usize) -> MonthlyStat {
    let found = MONTH_FIELDS.iter().find_map(|(field, source)| {
        row.get(*field)
            .and_then(month_label)
            .map(|label| (label, *source))
    });

    let (month, source) = match found {
        Some(found) => found,
        None => {
            warn!(index, "monthly stat row has no month identifier");
            (format!("month-{}", index + 1), MonthSource::Synthesized)
        }
    };

    if source != MonthSource::Month && source != MonthSource::Synthesized {
        debug!(?source, "monthly stat month read from fallback field");
    }

    let stat = MonthlyStat {
        month,
        total_todos: count_field(row, &["total_todos", "total"]),
        completed_todos: count_field(row, &["completed_todos", "completed"]),
        source,
    };

    if !stat.is_consistent() {
        warn!(
            month = %stat.month,
            total = stat.total_todos,
            completed = stat.completed_todos,
            "monthly stat reports more completed than total todos"
        );
    }

    stat
}

/// `2024-05`, `2024-05-01` and full timestamps collapse to `2024-05`; other
/// non-empty strings are kept verbatim.
fn month_label(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if raw.is_empty() {
        return None;
    }

    let bytes = raw.as_bytes();
    let looks_like_year_month = bytes.len() >= 7
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..7].iter().all(u8::is_ascii_digit);

    if looks_like_year_month {
        Some(raw[..7].to_string())
    } else {
        Some(raw)
    }
}

fn count_field(row: &Map<String, Value>, names: &[&str]) -> i64 {
    names
        .iter()
        .find_map(|name| match row.get(*name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn canonical_month_is_used() {
        let stat = normalize_monthly_stat(
            &row(json!({"month": "2024-05", "total_todos": 4, "completed_todos": 3})),
            0,
        );
        assert_eq!(stat.month, "2024-05");
        assert_eq!(stat.source, MonthSource::Month);
        assert_eq!(stat.total_todos, 4);
        assert_eq!(stat.completed_todos, 3);
    }

    #[test]
    fn timestamps_collapse_to_year_month() {
        let stat = normalize_monthly_stat(
            &row(json!({"month": "2024-05-01T00:00:00+00:00", "total_todos": 1})),
            0,
        );
        assert_eq!(stat.month, "2024-05");
    }

    // Best effort: fallback fields are a tolerance, not part of the contract.
    #[test]
    fn best_effort_fallback_fields_in_order() {
        let stat = normalize_monthly_stat(
            &row(json!({"month_year": "2024-04", "period": "2023-01", "total_todos": 2})),
            0,
        );
        assert_eq!(stat.month, "2024-04");
        assert_eq!(stat.source, MonthSource::MonthYear);

        let stat = normalize_monthly_stat(&row(json!({"period": "Q2", "date": "2024-01-03"})), 0);
        assert_eq!(stat.month, "Q2");
        assert_eq!(stat.source, MonthSource::Period);

        let stat = normalize_monthly_stat(&row(json!({"month": null, "date": "2024-01-03"})), 0);
        assert_eq!(stat.month, "2024-01");
        assert_eq!(stat.source, MonthSource::Date);
    }

    // Best effort: a row with no month at all still renders with a placeholder.
    #[test]
    fn best_effort_synthesized_label() {
        let stat = normalize_monthly_stat(&row(json!({"total_todos": "7", "completed_todos": "2"})), 2);
        assert_eq!(stat.month, "month-3");
        assert_eq!(stat.source, MonthSource::Synthesized);
        assert_eq!(stat.total_todos, 7);
        assert_eq!(stat.completed_todos, 2);
    }

    #[test]
    fn inconsistent_counts_pass_through() {
        let stat = normalize_monthly_stat(
            &row(json!({"month": "2024-02", "total_todos": 1, "completed_todos": 5})),
            0,
        );
        assert_eq!(stat.completed_todos, 5);
        assert!(!stat.is_consistent());
    }

    #[tokio::test]
    async fn dropping_subscription_releases_listener() {
        let events = AuthEvents::new();
        let subscription = events.subscribe();
        assert_eq!(events.listener_count(), 1);
        drop(subscription);
        assert_eq!(events.listener_count(), 0);
    }

    #[tokio::test]
    async fn subscription_receives_published_events() {
        let events = AuthEvents::new();
        let mut subscription = events.subscribe();
        events.publish(AuthEvent::SignedOut {
            access_token: "abc".to_string(),
        });
        match subscription.recv().await {
            Some(AuthEvent::SignedOut { access_token }) => assert_eq!(access_token, "abc"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
