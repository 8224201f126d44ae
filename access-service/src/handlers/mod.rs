//! HTTP handlers for access-service.

pub mod clients;
pub mod health;
pub mod oauth;
pub mod permissions;
pub mod roles;
pub mod user_roles;
pub mod users;
