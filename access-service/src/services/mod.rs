//! Services layer for access-service.
//!
//! The token engine, permission resolver, administrative and user services sit on
//! top of the collaborator traits in [`stores`].

pub mod admin;
pub mod bootstrap;
mod database;
pub mod error;
mod jwt;
pub mod oauth;
pub mod permission;
pub mod stores;
pub mod users;

pub use admin::AdminService;
pub use bootstrap::Bootstrap;
pub use database::MongoDb;
pub use error::AccessError;
pub use jwt::{AccessTokenClaims, JwtService};
pub use oauth::{OAuthSettings, TokenEngine, ValidatedToken};
pub use permission::{EffectivePermissions, PermissionResolver};
pub use users::UserService;
