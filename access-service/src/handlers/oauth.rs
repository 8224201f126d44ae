use service_core::axum::{
    async_trait,
    extract::{FromRequest, Request, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Form, Json,
};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        oauth::{RevokeRequest, TokenRequest, TokenResponse},
        ErrorResponse, MessageResponse,
    },
    services::AccessError,
    utils::ValidatedJson,
    AppState,
};

/// Grant request read from either a JSON or a form-encoded body.
pub struct GrantRequest(pub TokenRequest);

#[async_trait]
impl<S> FromRequest<S> for GrantRequest
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        let request = if is_form {
            Form::<TokenRequest>::from_request(req, state)
                .await
                .map(|Form(body)| body)
                .map_err(|e| AccessError::InvalidRequest(e.body_text()))?
        } else {
            Json::<TokenRequest>::from_request(req, state)
                .await
                .map(|Json(body)| body)
                .map_err(|e| AccessError::InvalidRequest(e.body_text()))?
        };

        request
            .validate()
            .map_err(|e| AccessError::InvalidRequest(e.to_string()))?;

        Ok(GrantRequest(request))
    }
}

/// Issue tokens for the password, refresh_token or client_credentials grant
#[utoipa::path(
    post,
    path = "/api/oauth/token",
    request_body(content = TokenRequest, content_type = "application/json"),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Invalid grant or request", body = ErrorResponse),
        (status = 401, description = "Invalid client or credentials", body = ErrorResponse),
        (status = 403, description = "Subject is not active", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
        (status = 504, description = "Store timeout", body = ErrorResponse)
    ),
    tag = "OAuth"
)]
pub async fn token(
    State(state): State<AppState>,
    GrantRequest(req): GrantRequest,
) -> Result<impl IntoResponse, AppError> {
    let res = state.engine.issue_token(req).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Revoke a refresh token and the access token paired with it
#[utoipa::path(
    post,
    path = "/api/oauth/revoke",
    request_body = RevokeRequest,
    responses(
        (status = 200, description = "Token revoked (also for unknown tokens)", body = MessageResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 503, description = "Store unavailable", body = ErrorResponse),
        (status = 504, description = "Store timeout", body = ErrorResponse)
    ),
    tag = "OAuth"
)]
pub async fn revoke(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RevokeRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.engine.revoke_token(&req.refresh_token).await?;
    Ok((StatusCode::OK, Json(MessageResponse::new("Token revoked"))))
}
