use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
                details: None,
            }),
            timestamp: chrono::Utc::now(),
        }
    }
}

// Error responses for the HTTP surface
#[derive(Debug)]
pub enum HttpError {
    NotFound(String),
    /// A cycle is already running; the request was not queued.
    AlreadyUpdating,
    InternalServerError(String),
    ServiceUnavailable(String),
}

impl HttpError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::AlreadyUpdating => StatusCode::CONFLICT,
            HttpError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            HttpError::NotFound(_) => "NOT_FOUND",
            HttpError::AlreadyUpdating => "ALREADY_UPDATING",
            HttpError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            HttpError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn message(&self) -> String {
        match self {
            HttpError::NotFound(msg) => msg.clone(),
            HttpError::AlreadyUpdating => "An update is already in progress".to_string(),
            HttpError::InternalServerError(msg) => msg.clone(),
            HttpError::ServiceUnavailable(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiResponse::<()>::error(self.error_code(), self.message());
        (status, Json(body)).into_response()
    }
}

// Common error constructors
impl HttpError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(format!("{} not found", resource.into()))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalServerError(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }
}
