use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use taskmesh_core::TaskmeshError;
use tracing::{error, warn};

/// API error with HTTP status code and message.
///
/// Renders as `{"error": {"message": ..., "statusCode": ...}}`.
#[derive(Debug)]
pub struct ApiError {
    /// Response status.
    pub status: StatusCode,
    /// Human readable message.
    pub message: String,
}

impl ApiError {
    /// Creates a new API error.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Creates a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Creates a 401 Unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// Creates a 404 Not Found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), message = %self.message, "Request failed");
        } else {
            warn!(status = self.status.as_u16(), message = %self.message, "Request rejected");
        }
        let body = Json(json!({
            "error": {
                "message": self.message,
                "statusCode": self.status.as_u16(),
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<TaskmeshError> for ApiError {
    fn from(err: TaskmeshError) -> Self {
        let status = match &err {
            TaskmeshError::AgentNotFound(_) | TaskmeshError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            TaskmeshError::InvalidPriority(_)
            | TaskmeshError::InvalidPayload(_)
            | TaskmeshError::UnknownAgentType(_)
            | TaskmeshError::Json(_) => StatusCode::BAD_REQUEST,
            TaskmeshError::AgentExists(_)
            | TaskmeshError::DuplicateTask(_)
            | TaskmeshError::InvalidTransition { .. }
            | TaskmeshError::AtCapacity { .. } => StatusCode::CONFLICT,
            TaskmeshError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %err, "Internal error");
            return Self::new(status, "Internal server error");
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Validation error: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(format!("Validation error: {}", rejection.body_text()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use taskmesh_core::TaskStatus;
    use uuid::Uuid;

    fn status_of(err: TaskmeshError) -> StatusCode {
        ApiError::from(err).status
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(status_of(TaskmeshError::AgentNotFound("a".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(TaskmeshError::TaskNotFound(Uuid::new_v4())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(TaskmeshError::InvalidPriority(11)), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(TaskmeshError::UnknownAgentType("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(TaskmeshError::AgentExists("a".into())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(TaskmeshError::InvalidTransition {
                from: TaskStatus::Completed,
                to: TaskStatus::Pending
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(TaskmeshError::ShuttingDown), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(TaskmeshError::Delivery("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = ApiError::from(TaskmeshError::Config("secret path".into()));
        assert_eq!(err.message, "Internal server error");
    }
}
