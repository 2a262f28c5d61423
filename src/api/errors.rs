use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::{sensors::window::WindowError, session::SessionError};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),
}

impl AppError {
    /// For `FromStr` failures on query and path parameters.
    pub fn bad_param(name: &str, e: anyhow::Error) -> Self {
        Self::BadRequest(format!("invalid '{name}': {e}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        };
        if status != StatusCode::NOT_FOUND {
            warn!(status = %status, error = %self, "Request failed");
        }
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Rejected(_) => Self::Unauthorized(e.to_string()),
            SessionError::MissingToken => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<WindowError> for AppError {
    fn from(e: WindowError) -> Self {
        Self::BadRequest(e.to_string())
    }
}
