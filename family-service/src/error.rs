use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use famledger_shared::store::StoreError;
use log::error;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    /// Conflict carrying a machine-readable reason tag so clients can branch
    /// on specific conflicts (e.g. the join-attempt throttle).
    #[error("{1}")]
    Conflict(&'static str, String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn bad_request(message: String) -> Self {
        AppError::BadRequest(message)
    }

    pub fn not_found(message: String) -> Self {
        AppError::NotFound(message)
    }

    pub fn conflict(message: String) -> Self {
        AppError::Conflict("CONFLICT", message)
    }

    pub fn conflict_with_reason(reason: &'static str, message: String) -> Self {
        AppError::Conflict(reason, message)
    }

    pub fn unauthorized(message: String) -> Self {
        AppError::Unauthorized(message)
    }

    pub fn forbidden(message: String) -> Self {
        AppError::Forbidden(message)
    }

    pub fn internal_server_error(message: String) -> Self {
        AppError::InternalServerError(message)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            other => {
                error!("Store failure: {}", other);
                AppError::InternalServerError("Internal storage error".to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, tag, message) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", m),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "NOT_FOUND", m),
            AppError::Conflict(reason, m) => (StatusCode::CONFLICT, reason, m),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", m),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "FORBIDDEN", m),
            AppError::InternalServerError(m) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", m)
            }
        };

        (status, Json(json!({ "error": tag, "message": message }))).into_response()
    }
}
