use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    /// An error that already carries a machine-readable code for the client.
    #[error("{message}")]
    Coded {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        AppError::DatabaseError(anyhow::Error::new(err))
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DatabaseError(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InternalError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Coded { status, .. } => *status,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            AppError::ValidationError(err) => ErrorResponse {
                error: "Validation error".to_string(),
                error_description: None,
                details: Some(err.to_string()),
            },
            AppError::InternalError(err) => {
                tracing::error!(error = ?err, "Internal server error");
                ErrorResponse {
                    error: "Internal server error".to_string(),
                    error_description: None,
                    details: None,
                }
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                ErrorResponse {
                    error: "Database error".to_string(),
                    error_description: None,
                    details: None,
                }
            }
            AppError::ConfigError(err) => ErrorResponse {
                error: "Configuration error".to_string(),
                error_description: None,
                details: Some(err.to_string()),
            },
            AppError::Coded { code, message, .. } => ErrorResponse {
                error: code.to_string(),
                error_description: Some(message),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}
