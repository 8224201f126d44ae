//! Route guards built on the permission resolver. Each expects
//! [`super::auth_middleware`] to have run first.
//!
//! Guards fail closed: a resolution error surfaces as 503/504, a denial as
//! 403, and neither lets the request through.

use service_core::axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::middleware::AuthContext;
use crate::services::AccessError;
use crate::AppState;

fn context(req: &Request) -> Result<&AuthContext, AppError> {
    req.extensions().get::<AuthContext>().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!(
            "Auth context missing from request extensions"
        ))
    })
}

/// Subject-less tokens carry no role assignments and are denied outright.
fn subject(context: &AuthContext, required: &str) -> Result<String, AppError> {
    context.subject_id.clone().ok_or_else(|| {
        tracing::warn!(client_id = %context.client_id, required = %required, "Client token used on a subject-guarded route");
        AccessError::PermissionDenied(required.to_string()).into()
    })
}

fn decide(outcome: Result<bool, AccessError>, subject_id: &str, required: &str) -> Result<(), AppError> {
    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => {
            tracing::warn!(subject_id = %subject_id, required = %required, "Permission denied");
            Err(AccessError::PermissionDenied(required.to_string()).into())
        }
        Err(e) => {
            tracing::error!(subject_id = %subject_id, error = %e, "Permission check failed");
            Err(e.into())
        }
    }
}

/// Middleware to require a single permission code
pub async fn require_permission(
    State(state): State<AppState>,
    code: String,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let subject_id = subject(context(&req)?, &code)?;
    let outcome = state.resolver.has_permission(&subject_id, &code).await;
    decide(outcome, &subject_id, &code)?;
    Ok(next.run(req).await)
}

/// Middleware to require at least one of several permission codes
pub async fn require_any_permission(
    State(state): State<AppState>,
    codes: Vec<String>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let required = codes.join(" | ");
    let subject_id = subject(context(&req)?, &required)?;
    let outcome = state.resolver.has_any(&subject_id, &codes).await;
    decide(outcome, &subject_id, &required)?;
    Ok(next.run(req).await)
}

/// Middleware to require every one of several permission codes
pub async fn require_all_permissions(
    State(state): State<AppState>,
    codes: Vec<String>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let required = codes.join(" & ");
    let subject_id = subject(context(&req)?, &required)?;
    let outcome = state.resolver.has_all(&subject_id, &codes).await;
    decide(outcome, &subject_id, &required)?;
    Ok(next.run(req).await)
}

/// Middleware to require module-wide access, i.e. `<module>:*`
pub async fn require_module(
    State(state): State<AppState>,
    module: String,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_permission(State(state), format!("{}:*", module), req, next).await
}

/// Middleware to require an OAuth scope on the access token itself
pub async fn require_scope(scope: String, req: Request, next: Next) -> Result<Response, AppError> {
    let context = context(&req)?;
    if !context.scopes.iter().any(|granted| granted == &scope) {
        tracing::warn!(
            client_id = %context.client_id,
            required_scope = %scope,
            granted_scopes = ?context.scopes,
            "Insufficient scope"
        );
        return Err(AccessError::InsufficientScope(scope).into());
    }
    Ok(next.run(req).await)
}
