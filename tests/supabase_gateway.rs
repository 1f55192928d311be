use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

use todo_studio::gateway::{AuthEvent, Gateway, GatewayError, SupabaseGateway, TodoOrder};
use todo_studio::models::{MonthSource, NewTodo};

const ANON_KEY: &str = "anon-key";
const USER_ID: &str = "6f1c2b7e-8a0d-4f55-9a3e-1d2c3b4a5f60";

#[derive(Clone, Default)]
struct Stub {
    todos: Arc<Mutex<Vec<Value>>>,
}

fn user() -> Value {
    json!({ "id": USER_ID, "email": "user@example.com", "aud": "authenticated" })
}

fn session(access: &str, refresh: &str) -> Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": 3600,
        "token_type": "bearer",
        "user": user(),
    })
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Mirrors the hosted API: every call needs the project key, data calls
/// need a live user token.
fn authorize(headers: &HeaderMap) -> Result<(), Response> {
    if headers.get("apikey").and_then(|v| v.to_str().ok()) != Some(ANON_KEY) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "No API key found in request" })),
        )
            .into_response());
    }
    match bearer(headers) {
        Some("access-1") | Some("access-2") => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "JWT expired" })),
        )
            .into_response()),
    }
}

fn eq_filter<'a>(params: &'a HashMap<String, String>, column: &str) -> Option<&'a str> {
    params.get(column)?.strip_prefix("eq.")
}

async fn signup(Json(body): Json<Value>) -> Response {
    if body["email"] == "taken@example.com" {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "code": 422, "msg": "User already registered" })),
        )
            .into_response();
    }
    Json(json!({ "id": Uuid::new_v4(), "email": body["email"], "confirmation_sent_at": "2024-05-01T00:00:00Z" }))
        .into_response()
}

async fn token(Query(params): Query<HashMap<String, String>>, Json(body): Json<Value>) -> Response {
    let granted = match params.get("grant_type").map(String::as_str) {
        Some("password") if body["password"] == "secret1" => Some(session("access-1", "refresh-1")),
        Some("refresh_token") if body["refresh_token"] == "refresh-1" => {
            Some(session("access-2", "refresh-2"))
        }
        _ => None,
    };
    match granted {
        Some(session) => Json(session).into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" })),
        )
            .into_response(),
    }
}

async fn logout(headers: HeaderMap) -> Response {
    match authorize(&headers) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(_) => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn current_user(headers: HeaderMap) -> Response {
    match authorize(&headers) {
        Ok(()) => Json(user()).into_response(),
        Err(rejection) => rejection,
    }
}

async fn list_todos(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(rejection) = authorize(&headers) {
        return rejection;
    }
    let user_id = eq_filter(&params, "user_id").unwrap_or_default();
    let mut rows: Vec<Value> = stub
        .todos
        .lock()
        .unwrap()
        .iter()
        .filter(|row| row["user_id"] == user_id)
        .cloned()
        .collect();
    if params.get("order").map(String::as_str) == Some("created_at.desc") {
        rows.reverse();
    }
    Json(rows).into_response()
}

async fn insert_todo(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Err(rejection) = authorize(&headers) {
        return rejection;
    }
    if body["user_id"] != USER_ID {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "new row violates row-level security policy for table \"todos\"" })),
        )
            .into_response();
    }
    let mut todos = stub.todos.lock().unwrap();
    let row = json!({
        "id": Uuid::new_v4(),
        "user_id": body["user_id"],
        "text": body["text"],
        "completed": body["completed"],
        "created_at": format!("2024-05-{:02}T09:00:00+00:00", todos.len() + 1),
    });
    todos.push(row.clone());
    (StatusCode::CREATED, Json(vec![row])).into_response()
}

async fn update_todo(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    if let Err(rejection) = authorize(&headers) {
        return rejection;
    }
    let id = eq_filter(&params, "id").unwrap_or_default();
    let user_id = eq_filter(&params, "user_id").unwrap_or_default();
    let mut todos = stub.todos.lock().unwrap();
    let updated: Vec<Value> = todos
        .iter_mut()
        .filter(|row| row["id"] == id && row["user_id"] == user_id)
        .map(|row| {
            row["completed"] = body["completed"].clone();
            row.clone()
        })
        .collect();
    Json(updated).into_response()
}

async fn delete_todo(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(rejection) = authorize(&headers) {
        return rejection;
    }
    let id = eq_filter(&params, "id").unwrap_or_default().to_string();
    let user_id = eq_filter(&params, "user_id").unwrap_or_default().to_string();
    let mut todos = stub.todos.lock().unwrap();
    let before = todos.len();
    todos.retain(|row| !(row["id"] == id.as_str() && row["user_id"] == user_id.as_str()));
    let deleted = if todos.len() < before {
        vec![json!({ "id": id })]
    } else {
        Vec::new()
    };
    Json(deleted).into_response()
}

async fn monthly_stats(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> Response {
    if let Err(rejection) = authorize(&headers) {
        return rejection;
    }
    // The view has no `month` column, so PostgREST refuses to order by it.
    if let Some(order) = params.get("order") {
        let column = order.split('.').next().unwrap_or_default();
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": "42703",
                "message": format!("column monthly_todo_stats.{column} does not exist"),
            })),
        )
            .into_response();
    }
    // Rows shaped the way older views of the aggregate returned them, unordered
    Json(json!([
        { "total_todos": 1, "completed_todos": 2 },
        { "period": "2024-04-01T00:00:00Z", "total_todos": 1, "completed_todos": 1 },
        { "month_year": "2024-05", "total": "3", "completed": 2 },
        { "date": "2024-03-15", "total_todos": 4, "completed_todos": 0 },
    ]))
    .into_response()
}

async fn start_stub() -> (String, Stub) {
    let stub = Stub::default();
    let app = Router::new()
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/logout", post(logout))
        .route("/auth/v1/user", get(current_user))
        .route(
            "/rest/v1/todos",
            get(list_todos)
                .post(insert_todo)
                .patch(update_todo)
                .delete(delete_todo),
        )
        .route("/rest/v1/monthly_todo_stats", get(monthly_stats))
        .with_state(stub.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, stub)
}

async fn gateway() -> (SupabaseGateway, Stub) {
    let (addr, stub) = start_stub().await;
    (SupabaseGateway::new(&addr, ANON_KEY), stub)
}

fn user_id() -> Uuid {
    USER_ID.parse().unwrap()
}

#[tokio::test]
async fn test_sign_up_waits_for_confirmation() {
    let (gateway, _) = gateway().await;

    let outcome = gateway.sign_up("new@example.com", "secret1").await.unwrap();
    assert!(outcome.confirmation_pending);
    assert_eq!(outcome.user.unwrap().email, "new@example.com");

    let err = gateway
        .sign_up("taken@example.com", "secret1")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Validation(msg) if msg == "User already registered"));
}

#[tokio::test]
async fn test_sign_in_publishes_event() {
    let (gateway, _) = gateway().await;
    let mut events = gateway.on_auth_state_change();

    let session = gateway.sign_in("user@example.com", "secret1").await.unwrap();
    assert_eq!(session.access_token, "access-1");
    assert_eq!(session.user.id, user_id());

    match events.recv().await {
        Some(AuthEvent::SignedIn(published)) => assert_eq!(published.access_token, "access-1"),
        other => panic!("unexpected event: {other:?}"),
    }

    let err = gateway
        .sign_in("user@example.com", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Auth(msg) if msg == "Invalid login credentials"));
}

#[tokio::test]
async fn test_current_user_and_refresh() {
    let (gateway, _) = gateway().await;

    let user = gateway.current_user("access-1").await.unwrap().unwrap();
    assert_eq!(user.email, "user@example.com");
    assert!(gateway.current_user("expired").await.unwrap().is_none());

    let mut events = gateway.on_auth_state_change();
    let session = gateway.refresh_session("refresh-1").await.unwrap();
    assert_eq!(session.access_token, "access-2");
    assert!(matches!(
        events.recv().await,
        Some(AuthEvent::TokenRefreshed { session, .. }) if session.refresh_token == "refresh-2"
    ));

    assert!(matches!(
        gateway.refresh_session("refresh-0").await,
        Err(GatewayError::Auth(_))
    ));
}

#[tokio::test]
async fn test_sign_out_publishes_event() {
    let (gateway, _) = gateway().await;
    let mut events = gateway.on_auth_state_change();

    gateway.sign_out("access-1").await.unwrap();
    assert!(matches!(
        events.recv().await,
        Some(AuthEvent::SignedOut { access_token }) if access_token == "access-1"
    ));

    // Already gone on the server
    gateway.sign_out("expired").await.unwrap();
}

#[tokio::test]
async fn test_todo_rows_round_trip_through_rest() {
    let (gateway, stub) = gateway().await;

    let first = gateway
        .insert_todo(
            "access-1",
            &NewTodo {
                user_id: user_id(),
                text: "Buy milk".to_string(),
                completed: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(first.text, "Buy milk");
    assert!(first.created_at.is_some());

    let second = gateway
        .insert_todo(
            "access-1",
            &NewTodo {
                user_id: user_id(),
                text: "Walk dog".to_string(),
                completed: false,
            },
        )
        .await
        .unwrap();

    let listed = gateway
        .list_todos("access-1", user_id(), TodoOrder::NewestFirst)
        .await
        .unwrap();
    assert_eq!(listed, vec![second.clone(), first.clone()]);

    let updated = gateway
        .update_todo("access-1", first.id, user_id(), true)
        .await
        .unwrap();
    assert!(updated.completed);
    assert_eq!(updated.id, first.id);

    gateway
        .delete_todo("access-1", first.id, user_id())
        .await
        .unwrap();
    assert_eq!(stub.todos.lock().unwrap().len(), 1);

    assert!(matches!(
        gateway.delete_todo("access-1", first.id, user_id()).await,
        Err(GatewayError::NotFound)
    ));
    assert!(matches!(
        gateway.update_todo("access-1", first.id, user_id(), false).await,
        Err(GatewayError::NotFound)
    ));
}

#[tokio::test]
async fn test_rest_errors_are_classified() {
    let (gateway, _) = gateway().await;

    assert!(matches!(
        gateway
            .list_todos("expired", user_id(), TodoOrder::Unspecified)
            .await,
        Err(GatewayError::Auth(msg)) if msg == "JWT expired"
    ));

    let err = gateway
        .insert_todo(
            "access-1",
            &NewTodo {
                user_id: Uuid::new_v4(),
                text: "Sneaky".to_string(),
                completed: false,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Auth(msg) if msg.contains("row-level security")));
}

#[tokio::test]
async fn test_monthly_rows_are_normalized() {
    let (gateway, _) = gateway().await;

    let stats = gateway.monthly_stats("access-1", user_id(), 6).await.unwrap();
    assert_eq!(stats.len(), 4);

    assert_eq!(stats[0].month, "2024-05");
    assert_eq!(stats[0].source, MonthSource::MonthYear);
    assert_eq!(stats[0].total_todos, 3);
    assert_eq!(stats[0].completed_todos, 2);

    assert_eq!(stats[1].month, "2024-04");
    assert_eq!(stats[1].source, MonthSource::Period);

    assert_eq!(stats[2].month, "2024-03");
    assert_eq!(stats[2].source, MonthSource::Date);

    // Rows without a month sort last and keep their position-based label.
    assert_eq!(stats[3].month, "month-1");
    assert_eq!(stats[3].source, MonthSource::Synthesized);
    assert!(!stats[3].is_consistent());
}

#[tokio::test]
async fn test_monthly_limit_keeps_newest_months() {
    let (gateway, _) = gateway().await;

    let stats = gateway.monthly_stats("access-1", user_id(), 2).await.unwrap();
    let months: Vec<_> = stats.iter().map(|s| s.month.as_str()).collect();
    assert_eq!(months, ["2024-05", "2024-04"]);
}

#[tokio::test]
async fn test_unreachable_backend_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let gateway = SupabaseGateway::new(&addr, ANON_KEY);
    assert!(matches!(
        gateway.sign_in("user@example.com", "secret1").await,
        Err(GatewayError::Transport(_))
    ));
}
