use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::{
    normalize_monthly_stat, AuthEvent, AuthEvents, AuthSubscription, Gateway, GatewayError,
    TodoOrder,
};
use crate::auth::{generate_token, hash_password, verify_password, MIN_PASSWORD_LEN};
use crate::models::{AuthSession, MonthlyStat, NewTodo, SignUpOutcome, Todo, User};

pub type DbPool = Arc<Mutex<Connection>>;

pub const ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        confirmed INTEGER DEFAULT 0,
        created_at INTEGER DEFAULT (strftime('%s', 'now'))
    );

    CREATE TABLE IF NOT EXISTS sessions (
        access_token TEXT PRIMARY KEY,
        refresh_token TEXT UNIQUE NOT NULL,
        user_id TEXT NOT NULL REFERENCES users(id),
        created_at INTEGER DEFAULT (strftime('%s', 'now')),
        expires_at INTEGER NOT NULL,
        refresh_expires_at INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS todos (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id),
        text TEXT NOT NULL,
        completed INTEGER DEFAULT 0,
        created_at INTEGER DEFAULT (strftime('%s', 'now'))
    );

    CREATE INDEX IF NOT EXISTS todos_user_created ON todos (user_id, created_at);

    CREATE VIEW IF NOT EXISTS monthly_todo_stats AS
        SELECT user_id,
               strftime('%Y-%m', created_at, 'unixepoch') AS month,
               COUNT(*) AS total_todos,
               COALESCE(SUM(completed), 0) AS completed_todos
        FROM todos
        GROUP BY user_id, month;
";

const TODO_COLUMNS: &str = "id, user_id, text, completed, created_at";

/// Backend emulation over SQLite: accounts with email confirmation, opaque
/// bearer tokens, and todo rows only visible to the token's owner.
pub struct LocalGateway {
    db: DbPool,
    events: AuthEvents,
    auto_confirm: bool,
}

impl LocalGateway {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, GatewayError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, GatewayError> {
        conn.execute_batch(SCHEMA)?;

        // Migration: sessions created before refresh tokens expired on their own
        let has_refresh_expiry = conn
            .prepare("SELECT refresh_expires_at FROM sessions LIMIT 1")
            .is_ok();
        if !has_refresh_expiry {
            conn.execute(
                "ALTER TABLE sessions ADD COLUMN refresh_expires_at INTEGER NOT NULL DEFAULT 0",
                [],
            )?;
        }

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            events: AuthEvents::new(),
            auto_confirm: false,
        })
    }

    /// Accounts are usable right after sign-up, without an email round trip.
    pub fn with_auto_confirm(mut self, auto_confirm: bool) -> Self {
        self.auto_confirm = auto_confirm;
        self
    }

    pub fn events(&self) -> &AuthEvents {
        &self.events
    }

    /// Marks the account as verified, as following the emailed link would.
    pub fn confirm_email(&self, email: &str) -> Result<bool, GatewayError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE users SET confirmed = 1 WHERE email = ?1",
            [email.trim().to_lowercase()],
        )?;
        Ok(rows > 0)
    }

    /// Inserts a row with an explicit creation time, bypassing token checks.
    pub fn seed_todo(
        &self,
        user_id: Uuid,
        text: &str,
        completed: bool,
        created_at: OffsetDateTime,
    ) -> Result<Todo, GatewayError> {
        let conn = self.lock()?;
        insert_row(&conn, user_id, text, completed, created_at.unix_timestamp())
    }

    /// Drops sessions whose refresh token has lapsed. Sessions with only an
    /// expired access token stay, since they can still be refreshed.
    pub fn cleanup_expired_sessions(&self) -> Result<usize, GatewayError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM sessions WHERE refresh_expires_at < ?1",
            [now_secs()],
        )?;
        Ok(rows)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, GatewayError> {
        self.db
            .lock()
            .map_err(|_| GatewayError::Data("database lock poisoned".to_string()))
    }

    fn issue_session(&self, conn: &Connection, user: User) -> Result<AuthSession, GatewayError> {
        let session = AuthSession {
            access_token: generate_token(),
            refresh_token: generate_token(),
            expires_in: ACCESS_TOKEN_TTL_SECS,
            user,
        };
        let now = now_secs();
        conn.execute(
            "INSERT INTO sessions (access_token, refresh_token, user_id, expires_at, refresh_expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                &session.access_token,
                &session.refresh_token,
                session.user.id.to_string(),
                now + ACCESS_TOKEN_TTL_SECS,
                now + REFRESH_TOKEN_TTL_SECS,
            ),
        )?;
        Ok(session)
    }
}

#[async_trait]
impl Gateway for LocalGateway {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, GatewayError> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(GatewayError::Validation(
                "Unable to validate email address: invalid format".to_string(),
            ));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(GatewayError::Validation(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters."
            )));
        }

        let password_hash =
            hash_password(password).map_err(|e| GatewayError::Data(e.to_string()))?;

        let conn = self.lock()?;
        let exists: bool = conn
            .query_row("SELECT 1 FROM users WHERE email = ?1", [&email], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            return Err(GatewayError::Validation("User already registered".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            email,
        };
        conn.execute(
            "INSERT INTO users (id, email, password_hash, confirmed) VALUES (?1, ?2, ?3, ?4)",
            (
                user.id.to_string(),
                &user.email,
                &password_hash,
                self.auto_confirm as i32,
            ),
        )?;
        info!(user_id = %user.id, "Registered user");

        Ok(SignUpOutcome {
            user: Some(user),
            confirmation_pending: !self.auto_confirm,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, GatewayError> {
        let email = email.trim().to_lowercase();
        let account = self
            .lock()?
            .query_row(
                "SELECT id, email, password_hash, confirmed FROM users WHERE email = ?1",
                [&email],
                |row| {
                    Ok((
                        user_from_row(row)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i32>(3)? != 0,
                    ))
                },
            )
            .optional()?;

        // Hash verification runs without the connection lock held.
        let (user, confirmed) = match account {
            Some((user, hash, confirmed)) if verify_password(password, &hash) => (user, confirmed),
            _ => return Err(GatewayError::Auth("Invalid login credentials".to_string())),
        };
        if !confirmed {
            return Err(GatewayError::Auth("Email not confirmed".to_string()));
        }
        let session = {
            let conn = self.lock()?;
            self.issue_session(&conn, user)?
        };

        self.events.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError> {
        let removed = {
            let conn = self.lock()?;
            conn.execute("DELETE FROM sessions WHERE access_token = ?1", [access_token])?
        };
        if removed > 0 {
            self.events.publish(AuthEvent::SignedOut {
                access_token: access_token.to_string(),
            });
        }
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, GatewayError> {
        let (previous_access_token, session) = {
            let conn = self.lock()?;
            let found = conn
                .query_row(
                    "SELECT s.access_token, u.id, u.email FROM sessions s
                     JOIN users u ON u.id = s.user_id
                     WHERE s.refresh_token = ?1 AND s.refresh_expires_at > ?2",
                    (refresh_token, now_secs()),
                    |row| Ok((row.get::<_, String>(0)?, user_from_row_at(row, 1)?)),
                )
                .optional()?;

            let (previous, user) = match found {
                Some(found) => found,
                None => return Err(GatewayError::Auth("Invalid Refresh Token".to_string())),
            };
            conn.execute("DELETE FROM sessions WHERE access_token = ?1", [&previous])?;
            (previous, self.issue_session(&conn, user)?)
        };

        self.events.publish(AuthEvent::TokenRefreshed {
            previous_access_token,
            session: session.clone(),
        });
        Ok(session)
    }

    async fn current_user(&self, access_token: &str) -> Result<Option<User>, GatewayError> {
        let conn = self.lock()?;
        user_for_token(&conn, access_token)
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    async fn list_todos(
        &self,
        access_token: &str,
        user_id: Uuid,
        order: TodoOrder,
    ) -> Result<Vec<Todo>, GatewayError> {
        let conn = self.lock()?;
        let owner = require_user(&conn, access_token)?;
        let order_by = match order {
            TodoOrder::NewestFirst => "ORDER BY created_at DESC, rowid DESC",
            TodoOrder::Unspecified => "ORDER BY rowid ASC",
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE user_id = ?1 AND user_id = ?2 {order_by}"
        ))?;
        let todos = stmt
            .query_map([owner.id.to_string(), user_id.to_string()], todo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(todos)
    }

    async fn insert_todo(&self, access_token: &str, todo: &NewTodo) -> Result<Todo, GatewayError> {
        let conn = self.lock()?;
        let owner = require_user(&conn, access_token)?;
        if owner.id != todo.user_id {
            return Err(row_level_violation());
        }
        insert_row(&conn, todo.user_id, &todo.text, todo.completed, now_secs())
    }

    async fn update_todo(
        &self,
        access_token: &str,
        id: Uuid,
        user_id: Uuid,
        completed: bool,
    ) -> Result<Todo, GatewayError> {
        let conn = self.lock()?;
        let owner = require_user(&conn, access_token)?;
        let rows = conn.execute(
            "UPDATE todos SET completed = ?1 WHERE id = ?2 AND user_id = ?3 AND user_id = ?4",
            (
                completed as i32,
                id.to_string(),
                user_id.to_string(),
                owner.id.to_string(),
            ),
        )?;
        if rows == 0 {
            return Err(GatewayError::NotFound);
        }
        get_row(&conn, id)?.ok_or(GatewayError::NotFound)
    }

    async fn delete_todo(
        &self,
        access_token: &str,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<(), GatewayError> {
        let conn = self.lock()?;
        let owner = require_user(&conn, access_token)?;
        let rows = conn.execute(
            "DELETE FROM todos WHERE id = ?1 AND user_id = ?2 AND user_id = ?3",
            (id.to_string(), user_id.to_string(), owner.id.to_string()),
        )?;
        if rows == 0 {
            return Err(GatewayError::NotFound);
        }
        Ok(())
    }

    async fn monthly_stats(
        &self,
        access_token: &str,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<MonthlyStat>, GatewayError> {
        let conn = self.lock()?;
        let owner = require_user(&conn, access_token)?;
        let mut stmt = conn.prepare(
            "SELECT month, total_todos, completed_todos FROM monthly_todo_stats
             WHERE user_id = ?1 AND user_id = ?2
             ORDER BY month DESC LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(
                (owner.id.to_string(), user_id.to_string(), limit as i64),
                |row| {
                    Ok(json!({
                        "month": row.get::<_, Option<String>>(0)?,
                        "total_todos": row.get::<_, i64>(1)?,
                        "completed_todos": row.get::<_, i64>(2)?,
                    }))
                },
            )?
            .collect::<Result<Vec<Value>, _>>()?;

        Ok(rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| Some(normalize_monthly_stat(row.as_object()?, index)))
            .collect())
    }
}

fn now_secs() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn row_level_violation() -> GatewayError {
    GatewayError::Data("new row violates row-level security policy for table \"todos\"".to_string())
}

fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    user_from_row_at(row, 0)
}

fn user_from_row_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<User> {
    Ok(User {
        id: parse_uuid(row, offset)?,
        email: row.get(offset + 1)?,
    })
}

fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
    let created_at: Option<i64> = row.get(4)?;
    Ok(Todo {
        id: parse_uuid(row, 0)?,
        user_id: parse_uuid(row, 1)?,
        text: row.get(2)?,
        completed: row.get::<_, i32>(3)? != 0,
        created_at: created_at.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok()),
    })
}

fn user_for_token(conn: &Connection, access_token: &str) -> Result<Option<User>, GatewayError> {
    let user = conn
        .query_row(
            "SELECT u.id, u.email FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.access_token = ?1 AND s.expires_at > ?2",
            (access_token, now_secs()),
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

fn require_user(conn: &Connection, access_token: &str) -> Result<User, GatewayError> {
    user_for_token(conn, access_token)?
        .ok_or_else(|| GatewayError::Auth("Invalid or expired session".to_string()))
}

fn get_row(conn: &Connection, id: Uuid) -> Result<Option<Todo>, GatewayError> {
    let todo = conn
        .query_row(
            &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"),
            [id.to_string()],
            todo_from_row,
        )
        .optional()?;
    Ok(todo)
}

fn insert_row(
    conn: &Connection,
    user_id: Uuid,
    text: &str,
    completed: bool,
    created_at: i64,
) -> Result<Todo, GatewayError> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO todos (id, user_id, text, completed, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            id.to_string(),
            user_id.to_string(),
            text,
            completed as i32,
            created_at,
        ),
    )?;
    get_row(conn, id)?.ok_or(GatewayError::NotFound)
}
