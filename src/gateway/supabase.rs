use async_trait::async_trait;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    normalize_monthly_stat, AuthEvent, AuthEvents, AuthSubscription, Gateway, GatewayError,
    TodoOrder,
};
use crate::models::{AuthSession, MonthSource, MonthlyStat, NewTodo, SignUpOutcome, Todo, User};

const TODOS: &str = "todos";
const MONTHLY_STATS: &str = "monthly_todo_stats";

/// Client for the hosted backend's auth (`/auth/v1`) and REST (`/rest/v1`) APIs.
pub struct SupabaseGateway {
    client: Client,
    base_url: String,
    anon_key: String,
    events: AuthEvents,
}

impl SupabaseGateway {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            events: AuthEvents::new(),
        }
    }

    fn request(&self, method: Method, url: String, access_token: Option<&str>) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token.unwrap_or(&self.anon_key))
    }

    fn auth_request(&self, method: Method, path: &str, access_token: Option<&str>) -> RequestBuilder {
        self.request(
            method,
            format!("{}/auth/v1/{}", self.base_url, path),
            access_token,
        )
    }

    fn rest_request(
        &self,
        method: Method,
        table: &str,
        query: &str,
        access_token: &str,
    ) -> RequestBuilder {
        self.request(
            method,
            format!("{}/rest/v1/{}?{}", self.base_url, table, query),
            Some(access_token),
        )
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<AuthSession, GatewayError> {
        let response = self
            .auth_request(Method::POST, &format!("token?grant_type={grant_type}"), None)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else if status.is_client_error() {
            Err(GatewayError::Auth(error_message(response).await))
        } else {
            Err(GatewayError::Data(error_message(response).await))
        }
    }
}

#[async_trait]
impl Gateway for SupabaseGateway {
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, GatewayError> {
        let response = self
            .auth_request(Method::POST, "signup", None)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(if status.is_client_error() {
                GatewayError::Validation(message)
            } else {
                GatewayError::Data(message)
            });
        }

        let body: Value = response.json().await?;
        // With email confirmation disabled the backend answers with a full
        // session; it is discarded so that signing up never signs anyone in.
        let confirmation_pending = body.get("access_token").is_none();
        let user_value = body.get("user").cloned().unwrap_or(body);
        let user = serde_json::from_value::<User>(user_value).ok();
        info!(user_id = ?user.as_ref().map(|u| u.id), "Registered user");

        Ok(SignUpOutcome {
            user,
            confirmation_pending,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, GatewayError> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        self.events.publish(AuthEvent::SignedIn(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), GatewayError> {
        let response = self
            .auth_request(Method::POST, "logout", Some(access_token))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                debug!("session already gone at sign out");
            }
            _ => return Err(GatewayError::Data(error_message(response).await)),
        }

        self.events.publish(AuthEvent::SignedOut {
            access_token: access_token.to_string(),
        });
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<AuthSession, GatewayError> {
        // The expired access token is not known at this point.
        let session = self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?;
        self.events.publish(AuthEvent::TokenRefreshed {
            previous_access_token: String::new(),
            session: session.clone(),
        });
        Ok(session)
    }

    async fn current_user(&self, access_token: &str) -> Result<Option<User>, GatewayError> {
        let response = self
            .auth_request(Method::GET, "user", Some(access_token))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.json().await?)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            _ => Err(GatewayError::Auth(error_message(response).await)),
        }
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
        let mut query = format!("select=*&user_id=eq.{user_id}");
        if order == TodoOrder::NewestFirst {
            query.push_str("&order=created_at.desc");
        }
        let response = self
            .rest_request(Method::GET, TODOS, &query, access_token)
            .send()
            .await?;
        rows(response).await
    }

    async fn insert_todo(&self, access_token: &str, todo: &NewTodo) -> Result<Todo, GatewayError> {
        let response = self
            .rest_request(Method::POST, TODOS, "select=*", access_token)
            .header("Prefer", "return=representation")
            .json(todo)
            .send()
            .await?;
        single_row(response).await
    }

    async fn update_todo(
        &self,
        access_token: &str,
        id: Uuid,
        user_id: Uuid,
        completed: bool,
    ) -> Result<Todo, GatewayError> {
        let response = self
            .rest_request(
                Method::PATCH,
                TODOS,
                &format!("id=eq.{id}&user_id=eq.{user_id}&select=*"),
                access_token,
            )
            .header("Prefer", "return=representation")
            .json(&json!({ "completed": completed }))
            .send()
            .await?;
        single_row(response).await
    }

    async fn delete_todo(
        &self,
        access_token: &str,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<(), GatewayError> {
        let response = self
            .rest_request(
                Method::DELETE,
                TODOS,
                &format!("id=eq.{id}&user_id=eq.{user_id}&select=id"),
                access_token,
            )
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let deleted: Vec<Value> = rows(response).await?;
        if deleted.is_empty() {
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
        let response = self
            .rest_request(
                Method::GET,
                MONTHLY_STATS,
                &format!("select=*&user_id=eq.{user_id}"),
                access_token,
            )
            .send()
            .await?;
        let raw: Vec<Map<String, Value>> = rows(response).await?;
        let mut stats: Vec<MonthlyStat> = raw
            .iter()
            .enumerate()
            .map(|(index, row)| normalize_monthly_stat(row, index))
            .collect();
        // The view may lack a `month` column; order on the normalized label.
        stats.sort_by(|a, b| {
            let a_synth = a.source == MonthSource::Synthesized;
            let b_synth = b.source == MonthSource::Synthesized;
            a_synth.cmp(&b_synth).then_with(|| b.month.cmp(&a.month))
        });
        stats.truncate(limit);
        Ok(stats)
    }
}

async fn rows<T: DeserializeOwned>(response: Response) -> Result<Vec<T>, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let message = error_message(response).await;
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Auth(message)),
        _ => Err(GatewayError::Data(message)),
    }
}

async fn single_row(response: Response) -> Result<Todo, GatewayError> {
    rows(response)
        .await?
        .into_iter()
        .next()
        .ok_or(GatewayError::NotFound)
}

/// Pulls the human-readable message out of an auth or REST error body.
async fn error_message(response: Response) -> String {
    let status = response.status();
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("json"));

    if is_json {
        if let Ok(body) = response.json::<Value>().await {
            for key in ["msg", "error_description", "message", "error"] {
                if let Some(message) = body.get(key).and_then(Value::as_str) {
                    return message.to_string();
                }
            }
        }
    }
    format!("backend returned {status}")
}
