use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use service_core::axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::services::{AccessError, ValidatedToken};
use crate::AppState;

/// Identity of the caller, placed in request extensions by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// `None` for client-credentials tokens.
    pub subject_id: Option<String>,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub role: String,
    pub claims: serde_json::Map<String, serde_json::Value>,
}

impl From<ValidatedToken> for AuthContext {
    fn from(token: ValidatedToken) -> Self {
        Self {
            subject_id: token.subject_id,
            client_id: token.client_id,
            scopes: token.scopes,
            role: token.role,
            claims: token.claims,
        }
    }
}

/// Middleware to require a valid bearer access token
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AppError::Coded {
            status: service_core::axum::http::StatusCode::UNAUTHORIZED,
            code: "invalid_token",
            message: "Missing or invalid Authorization header".to_string(),
        })?;

    let validated = state
        .engine
        .validate_access_token(bearer.token())
        .await
        .map_err(|e| {
            if e.is_infrastructure() {
                tracing::error!(error = %e, "Token validation could not complete");
            } else {
                tracing::debug!(reason = e.code(), "Bearer token rejected");
            }
            AppError::from(e)
        })?;

    req.extensions_mut().insert(AuthContext::from(validated));

    Ok(next.run(req).await)
}

/// Extractor to easily get the caller identity in handlers
pub struct AuthUser(pub AuthContext);

impl AuthUser {
    /// The subject behind the token; client-only tokens have none.
    pub fn subject_id(&self) -> Result<&str, AppError> {
        self.0
            .subject_id
            .as_deref()
            .ok_or_else(|| AccessError::PermissionDenied("subject token required".to_string()).into())
    }
}

#[service_core::axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts.extensions.get::<AuthContext>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth context missing from request extensions"
            ))
        })?;

        Ok(AuthUser(context.clone()))
    }
}
