use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct AccessConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub mongodb: MongoConfig,
    pub oauth: OAuthConfig,
    pub security: SecurityConfig,
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
    /// Upper bound for every individual store operation.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub jwt_secret: SecretString,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_hours: i64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub seed_defaults: bool,
    pub client: Option<BootstrapClient>,
    pub admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone)]
pub struct BootstrapClient {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: SecretString,
}

const MIN_PROD_SECRET_BYTES: usize = 32;
/// One year.
pub const MAX_ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 365 * 24 * 60;
/// Ten years.
pub const MAX_REFRESH_TOKEN_EXPIRY_HOURS: i64 = 10 * 365 * 24;
const DEV_JWT_SECRET: &str = "dev-only-jwt-secret-do-not-use-in-production";

impl AccessConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = AccessConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("access-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", Some("mongodb://localhost:27017"), is_prod)?,
                database: get_env("MONGODB_DATABASE", Some("access"), is_prod)?,
                timeout_seconds: parse_env("MONGODB_TIMEOUT_SECONDS", "10", is_prod)?,
            },
            oauth: OAuthConfig {
                jwt_secret: SecretString::new(get_env(
                    "JWT_SECRET",
                    Some(DEV_JWT_SECRET),
                    is_prod,
                )?),
                access_token_expiry_minutes: parse_env(
                    "ACCESS_TOKEN_EXPIRY_MINUTES",
                    "120",
                    is_prod,
                )?,
                refresh_token_expiry_hours: parse_env("REFRESH_TOKEN_EXPIRY_HOURS", "168", is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:3000"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            bootstrap: BootstrapConfig {
                seed_defaults: get_optional_env("BOOTSTRAP_DEFAULTS")
                    .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                    .unwrap_or(!is_prod),
                client: match (
                    get_optional_env("BOOTSTRAP_CLIENT_ID"),
                    get_optional_env("BOOTSTRAP_CLIENT_SECRET"),
                ) {
                    (Some(client_id), Some(secret)) => Some(BootstrapClient {
                        client_id,
                        client_secret: SecretString::new(secret),
                    }),
                    _ => None,
                },
                admin: match (
                    get_optional_env("BOOTSTRAP_ADMIN_USERNAME"),
                    get_optional_env("BOOTSTRAP_ADMIN_PASSWORD"),
                ) {
                    (Some(username), Some(password)) => Some(BootstrapAdmin {
                        username,
                        password: SecretString::new(password),
                    }),
                    _ => None,
                },
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.mongodb.timeout_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "MONGODB_TIMEOUT_SECONDS must be positive"
            )));
        }

        if !(1..=MAX_ACCESS_TOKEN_EXPIRY_MINUTES).contains(&self.oauth.access_token_expiry_minutes) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ACCESS_TOKEN_EXPIRY_MINUTES must be between 1 and {}",
                MAX_ACCESS_TOKEN_EXPIRY_MINUTES
            )));
        }

        if !(1..=MAX_REFRESH_TOKEN_EXPIRY_HOURS).contains(&self.oauth.refresh_token_expiry_hours) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TOKEN_EXPIRY_HOURS must be between 1 and {}",
                MAX_REFRESH_TOKEN_EXPIRY_HOURS
            )));
        }

        // Refresh tokens must outlive the access tokens they are paired with.
        let refresh_minutes = self
            .oauth
            .refresh_token_expiry_hours
            .checked_mul(60)
            .ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("REFRESH_TOKEN_EXPIRY_HOURS is out of range"))
            })?;
        if refresh_minutes < self.oauth.access_token_expiry_minutes {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TOKEN_EXPIRY_HOURS must cover ACCESS_TOKEN_EXPIRY_MINUTES"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.oauth.jwt_secret.expose_secret().len() < MIN_PROD_SECRET_BYTES {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_SECRET must be at least {} bytes in production",
                    MIN_PROD_SECRET_BYTES
                )));
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AccessConfig {
        AccessConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "access-service".to_string(),
            service_version: "test".to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            mongodb: MongoConfig {
                uri: "mongodb://localhost:27017".to_string(),
                database: "access".to_string(),
                timeout_seconds: 10,
            },
            oauth: OAuthConfig {
                jwt_secret: SecretString::new("x".repeat(32)),
                access_token_expiry_minutes: 120,
                refresh_token_expiry_hours: 168,
            },
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
            bootstrap: BootstrapConfig {
                seed_defaults: false,
                client: None,
                admin: None,
            },
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_refresh_must_outlive_access() {
        let mut cfg = config();
        cfg.oauth.access_token_expiry_minutes = 180;
        cfg.oauth.refresh_token_expiry_hours = 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_expiry_bounds() {
        let mut cfg = config();
        cfg.oauth.refresh_token_expiry_hours = i64::MAX;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.oauth.access_token_expiry_minutes = MAX_ACCESS_TOKEN_EXPIRY_MINUTES + 1;
        cfg.oauth.refresh_token_expiry_hours = MAX_REFRESH_TOKEN_EXPIRY_HOURS;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.oauth.access_token_expiry_minutes = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.oauth.access_token_expiry_minutes = MAX_ACCESS_TOKEN_EXPIRY_MINUTES;
        cfg.oauth.refresh_token_expiry_hours = MAX_REFRESH_TOKEN_EXPIRY_HOURS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_prod_rejects_short_secret_and_wildcard_origin() {
        let mut cfg = config();
        cfg.environment = Environment::Prod;
        cfg.oauth.jwt_secret = SecretString::new("short".to_string());
        assert!(cfg.validate().is_err());

        let mut cfg = config();
        cfg.environment = Environment::Prod;
        cfg.security.allowed_origins = vec!["*".to_string()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Prod));
        assert!("staging".parse::<Environment>().is_err());
    }
}
