use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;
use validator::Validate;

use crate::services::AccessError;

/// JSON body extractor that also runs `validator` rules. A body that does not
/// parse is a 400 and one that parses but breaks a rule is a 422; both carry
/// the `invalid_request` code.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AccessError::InvalidRequest(rejection.body_text()))?;

        if let Err(errors) = value.validate() {
            return Err(AppError::Coded {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                code: "invalid_request",
                message: errors.to_string(),
            });
        }

        Ok(ValidatedJson(value))
    }
}
