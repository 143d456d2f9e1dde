use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Non-success answer from the tbot API, forwarded with its own status
    #[error("Upstream {status}: {body}")]
    UpstreamError { status: u16, body: String },

    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamError { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::RequestError(_)
            | AppError::SerializationError(_)
            | AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            AppError::ValidationError(msg) => msg.clone(),
            AppError::UpstreamError { .. } => {
                tracing::warn!("Forwarding upstream failure: {}", self);
                self.to_string()
            }
            AppError::RequestError(e) => {
                tracing::error!("Request error: {:?}", e);
                e.to_string()
            }
            AppError::SerializationError(e) => {
                tracing::error!("Serialization error: {:?}", e);
                e.to_string()
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                msg.clone()
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

pub type AppResult<T> = Result<T, AppError>;
