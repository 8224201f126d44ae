use service_core::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        admin::{ClientResponse, CreateClientRequest, CreateClientResponse},
        ErrorResponse, MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// Register a new OAuth client. The secret is only returned here.
#[utoipa::path(
    post,
    path = "/api/oauth/clients",
    request_body = CreateClientRequest,
    responses(
        (status = 201, description = "Client registered", body = CreateClientResponse),
        (status = 403, description = "Missing admin:clients", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Clients",
    security(("bearer_auth" = []))
)]
pub async fn create_client(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateClientRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.admin.register_client(req).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

/// List registered clients
#[utoipa::path(
    get,
    path = "/api/oauth/clients",
    responses(
        (status = 200, description = "Clients", body = Vec<ClientResponse>)
    ),
    tag = "Clients",
    security(("bearer_auth" = []))
)]
pub async fn list_clients(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.admin.list_clients().await?))
}

/// Get a client
#[utoipa::path(
    get,
    path = "/api/oauth/clients/{client_id}",
    params(("client_id" = String, Path, description = "Client id")),
    responses(
        (status = 200, description = "Client", body = ClientResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Clients",
    security(("bearer_auth" = []))
)]
pub async fn get_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.admin.get_client(&client_id).await?))
}

/// Delete a client. Tokens already issued to it stay valid until they expire.
#[utoipa::path(
    delete,
    path = "/api/oauth/clients/{client_id}",
    params(("client_id" = String, Path, description = "Client id")),
    responses(
        (status = 200, description = "Client deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    tag = "Clients",
    security(("bearer_auth" = []))
)]
pub async fn delete_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.admin.delete_client(&client_id).await?;
    Ok(Json(MessageResponse::new("Client deleted")))
}
