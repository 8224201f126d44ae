pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{openapi::security::SecurityScheme, Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AccessConfig, Environment};
use crate::services::{AdminService, PermissionResolver, TokenEngine, UserService};

/// Permission required for the permission, role and assignment routes.
pub const MANAGE_PERMISSIONS: &str = "admin:permissions";
/// Permission required for the client registry routes.
pub const MANAGE_CLIENTS: &str = "admin:clients";
/// Permission required for the user administration routes.
pub const MANAGE_USERS: &str = "admin:users";

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::oauth::token,
        handlers::oauth::revoke,
        handlers::permissions::list_permissions,
        handlers::permissions::get_permission,
        handlers::permissions::get_permission_by_code,
        handlers::permissions::list_permissions_by_module,
        handlers::permissions::create_permission,
        handlers::permissions::update_permission,
        handlers::permissions::delete_permission,
        handlers::roles::list_roles,
        handlers::roles::get_role,
        handlers::roles::get_role_by_name,
        handlers::roles::create_role,
        handlers::roles::update_role,
        handlers::roles::delete_role,
        handlers::roles::add_role_permission,
        handlers::roles::remove_role_permission,
        handlers::user_roles::get_user_roles,
        handlers::user_roles::assign_role,
        handlers::user_roles::remove_role,
        handlers::user_roles::assign_permission,
        handlers::user_roles::remove_permission,
        handlers::user_roles::get_user_permissions,
        handlers::user_roles::has_permission,
        handlers::user_roles::my_permissions,
        handlers::clients::create_client,
        handlers::clients::list_clients,
        handlers::clients::get_client,
        handlers::clients::delete_client,
        handlers::users::list_users,
        handlers::users::get_user,
        handlers::users::create_user,
        handlers::users::update_user,
        handlers::users::archive_user,
        handlers::users::delete_user,
        handlers::users::profile,
        handlers::users::change_password,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::oauth::TokenRequest,
            dtos::oauth::TokenResponse,
            dtos::oauth::RevokeRequest,
            dtos::admin::CreatePermissionRequest,
            dtos::admin::UpdatePermissionRequest,
            dtos::admin::PermissionResponse,
            dtos::admin::CreateRoleRequest,
            dtos::admin::UpdateRoleRequest,
            dtos::admin::RolePermissionRequest,
            dtos::admin::RoleResponse,
            dtos::admin::RoleDetailResponse,
            dtos::admin::AssignRoleRequest,
            dtos::admin::AssignPermissionRequest,
            dtos::admin::UserRolesResponse,
            dtos::admin::EffectivePermissionsResponse,
            dtos::admin::HasPermissionResponse,
            dtos::admin::CreateClientRequest,
            dtos::admin::CreateClientResponse,
            dtos::admin::ClientResponse,
            dtos::users::CreateUserRequest,
            dtos::users::UpdateUserRequest,
            dtos::users::ChangePasswordRequest,
            dtos::users::UserResponse,
            models::GrantType,
            models::SubjectStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "OAuth", description = "Token issuance and revocation"),
        (name = "Permissions", description = "Permission catalogue"),
        (name = "Roles", description = "Role management"),
        (name = "User Roles", description = "Role and permission assignment"),
        (name = "Clients", description = "OAuth client registry"),
        (name = "Users", description = "User administration and profile"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AccessConfig,
    pub engine: Arc<TokenEngine>,
    pub resolver: Arc<PermissionResolver>,
    pub admin: Arc<AdminService>,
    pub users: Arc<UserService>,
}

/// Routes guarded by `auth_middleware` followed by a `require_permission`
/// check for `code`.
fn guarded(router: Router<AppState>, state: &AppState, code: &'static str) -> Router<AppState> {
    router
        .layer(from_fn_with_state(
            state.clone(),
            move |state, req, next| middleware::require_permission(state, code.to_string(), req, next),
        ))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware))
}

pub fn build_router(state: AppState) -> Router {
    let permission_routes = Router::new()
        .route(
            "/api/permissions",
            get(handlers::permissions::list_permissions).post(handlers::permissions::create_permission),
        )
        .route(
            "/api/permissions/:id",
            get(handlers::permissions::get_permission)
                .put(handlers::permissions::update_permission)
                .delete(handlers::permissions::delete_permission),
        )
        .route(
            "/api/permissions/code/:code",
            get(handlers::permissions::get_permission_by_code),
        )
        .route(
            "/api/permissions/module/:module",
            get(handlers::permissions::list_permissions_by_module),
        )
        .route(
            "/api/roles",
            get(handlers::roles::list_roles).post(handlers::roles::create_role),
        )
        .route(
            "/api/roles/:id",
            get(handlers::roles::get_role)
                .put(handlers::roles::update_role)
                .delete(handlers::roles::delete_role),
        )
        .route("/api/roles/name/:name", get(handlers::roles::get_role_by_name))
        .route(
            "/api/roles/:id/permissions",
            post(handlers::roles::add_role_permission),
        )
        .route(
            "/api/roles/:id/permissions/:permission_code",
            delete(handlers::roles::remove_role_permission),
        )
        .route(
            "/api/user-roles/assign-role",
            post(handlers::user_roles::assign_role),
        )
        .route(
            "/api/user-roles/remove-role",
            delete(handlers::user_roles::remove_role),
        )
        .route(
            "/api/user-roles/assign-permission",
            post(handlers::user_roles::assign_permission),
        )
        .route(
            "/api/user-roles/remove-permission",
            delete(handlers::user_roles::remove_permission),
        )
        .route("/api/user-roles/:user_id", get(handlers::user_roles::get_user_roles))
        .route(
            "/api/user-roles/:user_id/permissions",
            get(handlers::user_roles::get_user_permissions),
        )
        .route(
            "/api/user-roles/:user_id/has-permission/:permission_code",
            get(handlers::user_roles::has_permission),
        );
    let permission_routes = guarded(permission_routes, &state, MANAGE_PERMISSIONS);

    let client_routes = Router::new()
        .route(
            "/api/oauth/clients",
            get(handlers::clients::list_clients).post(handlers::clients::create_client),
        )
        .route(
            "/api/oauth/clients/:client_id",
            get(handlers::clients::get_client).delete(handlers::clients::delete_client),
        );
    let client_routes = guarded(client_routes, &state, MANAGE_CLIENTS);

    let user_routes = Router::new()
        .route(
            "/api/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        .route(
            "/api/users/:id",
            get(handlers::users::get_user)
                .put(handlers::users::update_user)
                .delete(handlers::users::delete_user),
        )
        .route("/api/users/:id/archive", put(handlers::users::archive_user));
    let user_routes = guarded(user_routes, &state, MANAGE_USERS);

    let me_routes = Router::new()
        .route("/api/me", get(handlers::users::profile))
        .route(
            "/api/me/change-password",
            post(handlers::users::change_password),
        )
        .route("/api/me/permissions", get(handlers::user_roles::my_permissions))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    let mut app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics))
        .route("/api/oauth/token", post(handlers::oauth::token))
        .route("/api/oauth/revoke", post(handlers::oauth::revoke));

    if state.config.environment != Environment::Prod {
        app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    app.merge(permission_routes)
        .merge(client_routes)
        .merge(user_routes)
        .merge(me_routes)
        .with_state(state.clone())
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config))
}

fn cors_layer(config: &AccessConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .security
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}
