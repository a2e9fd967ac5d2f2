use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::authz::{DataAccessError, PolicyError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("token error: {0}")]
    Token(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn token(err: impl Into<String>) -> Self {
        Self::Token(err.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = self.to_string();
        let error = match &self {
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Configuration(_) => "configuration",
            AppError::Token(_) => "token",
            AppError::Database(_) => "database",
            AppError::Internal(_) => "internal",
        };

        let payload = ErrorResponse {
            error: error.to_string(),
            message,
        };

        (status, Json(payload)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

/// Decisions that could not be made are reported as forbidden without
/// internal detail; call-site mistakes are reported as bad requests.
impl From<PolicyError> for AppError {
    fn from(value: PolicyError) -> Self {
        match value {
            PolicyError::UnknownAbility { .. } | PolicyError::UnknownResourceType(_) => {
                Self::BadRequest(value.to_string())
            }
            PolicyError::Configuration(_)
            | PolicyError::Evaluation { .. }
            | PolicyError::Delegation { .. } => {
                tracing::warn!(error = ?value, "authorization decision failed");
                Self::Forbidden("access denied".to_string())
            }
        }
    }
}

impl From<DataAccessError> for AppError {
    fn from(value: DataAccessError) -> Self {
        match value {
            DataAccessError::NotFound { .. } => Self::NotFound(value.to_string()),
            DataAccessError::Database(err) => Self::Database(err),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{ResourceId, ResourceKind};
    use uuid::Uuid;

    #[test]
    fn evaluation_failures_hide_detail() {
        let err = PolicyError::Delegation {
            delegation: "project".to_string(),
            resource: ResourceId::new(ResourceKind::Build, Uuid::new_v4()),
            source: DataAccessError::backend("connection reset"),
        };
        let app: AppError = err.into();
        assert!(matches!(&app, AppError::Forbidden(message) if message == "access denied"));
        assert_eq!(app.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn unknown_abilities_are_bad_requests() {
        let app: AppError = PolicyError::unknown_ability(ResourceKind::Build, "fly").into();
        assert_eq!(app.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
