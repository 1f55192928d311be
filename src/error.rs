use axum::response::{IntoResponse, Response};
use axum::{http::StatusCode, Json};
use serde_json::json;

use crate::gateway::GatewayError;

#[derive(Debug)]
pub enum AppError {
    Validation(String),
    ConfirmationRequired,
    AuthRequired,
    Auth(String),
    NotFound,
    Data(String),
    Transport(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::ConfirmationRequired => StatusCode::BAD_REQUEST,
            AppError::AuthRequired | AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Data(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Text shown to the user; backend messages are passed through unchanged.
    pub fn message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::Auth(msg)
            | AppError::Data(msg)
            | AppError::Transport(msg) => msg.clone(),
            AppError::ConfirmationRequired => "Deletion must be confirmed".to_string(),
            AppError::AuthRequired => "Unauthorized".to_string(),
            AppError::NotFound => "Not found".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.message() }))).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Validation(msg) => AppError::Validation(msg),
            GatewayError::Auth(msg) => AppError::Auth(msg),
            GatewayError::NotFound => AppError::NotFound,
            GatewayError::Data(msg) => AppError::Data(msg),
            GatewayError::Transport(msg) => AppError::Transport(msg),
        }
    }
}
