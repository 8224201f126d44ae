pub mod auth;
pub mod permission;

pub use auth::{auth_middleware, AuthContext, AuthUser};
pub use permission::{
    require_all_permissions, require_any_permission, require_module, require_permission,
    require_scope,
};
