use service_core::axum::http::StatusCode;
use service_core::error::AppError;
use std::time::Duration;
use thiserror::Error;

/// Every way an authorization operation can fail. Callers branch on the
/// variant, never on the message.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Client authentication failed")]
    InvalidClient,

    #[error("Grant type is not allowed for this client")]
    UnsupportedGrant,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Subject is not active")]
    InactiveSubject,

    #[error("Refresh token is invalid")]
    InvalidGrant,

    #[error("Refresh token has expired")]
    ExpiredGrant,

    #[error("Refresh token was issued to a different client")]
    ClientMismatch,

    #[error("Access token is invalid")]
    InvalidToken,

    #[error("Access token has expired")]
    ExpiredToken,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Store operation exceeded {0:?}")]
    Timeout(Duration),

    #[error("Unknown permission: {0}")]
    InvalidPermission(String),

    #[error("Unknown role: {0}")]
    InvalidRole(String),

    #[error("System role '{0}' cannot be modified")]
    ImmutableRole(String),

    #[error("Missing permission: {0}")]
    PermissionDenied(String),

    #[error("Missing scope: {0}")]
    InsufficientScope(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AccessError {
    /// Machine-readable code returned to clients, OAuth2 style where one exists.
    pub fn code(&self) -> &'static str {
        match self {
            AccessError::InvalidClient => "invalid_client",
            AccessError::UnsupportedGrant => "unsupported_grant_type",
            AccessError::InvalidRequest(_) => "invalid_request",
            AccessError::InvalidCredentials => "invalid_credentials",
            AccessError::InactiveSubject => "inactive_subject",
            AccessError::InvalidGrant => "invalid_grant",
            AccessError::ExpiredGrant => "expired_grant",
            AccessError::ClientMismatch => "client_mismatch",
            AccessError::InvalidToken => "invalid_token",
            AccessError::ExpiredToken => "expired_token",
            AccessError::StoreUnavailable(_) => "store_unavailable",
            AccessError::Timeout(_) => "timeout",
            AccessError::InvalidPermission(_) => "invalid_permission",
            AccessError::InvalidRole(_) => "invalid_role",
            AccessError::ImmutableRole(_) => "immutable_role",
            AccessError::PermissionDenied(_) => "insufficient_permission",
            AccessError::InsufficientScope(_) => "insufficient_scope",
            AccessError::NotFound(_) => "not_found",
            AccessError::Conflict(_) => "conflict",
            AccessError::Internal(_) => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AccessError::InvalidClient
            | AccessError::InvalidCredentials
            | AccessError::InvalidToken
            | AccessError::ExpiredToken => StatusCode::UNAUTHORIZED,
            AccessError::UnsupportedGrant
            | AccessError::InvalidRequest(_)
            | AccessError::InvalidGrant
            | AccessError::ExpiredGrant
            | AccessError::ClientMismatch
            | AccessError::InvalidPermission(_)
            | AccessError::InvalidRole(_) => StatusCode::BAD_REQUEST,
            AccessError::InactiveSubject
            | AccessError::ImmutableRole(_)
            | AccessError::PermissionDenied(_)
            | AccessError::InsufficientScope(_) => StatusCode::FORBIDDEN,
            AccessError::NotFound(_) => StatusCode::NOT_FOUND,
            AccessError::Conflict(_) => StatusCode::CONFLICT,
            AccessError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AccessError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AccessError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Infrastructure failures, as opposed to a definite refusal.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AccessError::StoreUnavailable(_) | AccessError::Timeout(_) | AccessError::Internal(_)
        )
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Internal(e) => AppError::InternalError(e),
            other => AppError::Coded {
                status: other.status(),
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denial_and_infrastructure_are_distinguishable() {
        let denied = AccessError::PermissionDenied("admin:users".into());
        let down = AccessError::StoreUnavailable("connection refused".into());

        assert!(!denied.is_infrastructure());
        assert!(down.is_infrastructure());
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_app_error_keeps_code() {
        let app: AppError = AccessError::ImmutableRole("Administrador".into()).into();
        match app {
            AppError::Coded { status, code, .. } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(code, "immutable_role");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
