// Configuration management

use crate::core::errors::AppError;
use secrecy::{ExposeSecret, Secret};
use std::env;
use std::path::PathBuf;

/// Minimum accepted length for `JWT_SECRET`
const MIN_JWT_SECRET_LEN: usize = 32;

/// Application configuration loaded from environment variables
///
/// All configuration is validated on load with clear error messages.
/// Secrets are wrapped in `secrecy::Secret` so they never end up in logs.
#[derive(Debug, Clone)]
pub struct Config {
    // Server configuration
    pub bind_address: String,
    pub port: u16,
    pub client_url: String,

    // Database configuration
    pub database_url: String,
    pub database_max_connections: u32,
    pub run_migrations: bool,

    // Redis configuration
    pub redis_url: String,

    // Authentication
    pub jwt_secret: Secret<String>,
    pub jwt_ttl_secs: u64,

    // Stripe
    pub stripe_secret_key: Secret<String>,
    pub stripe_publishable_key: Option<String>,
    pub stripe_webhook_secret: Secret<String>,
    pub stripe_api_base: String,
    pub stripe_timeout_secs: u64,

    // Uploads
    pub upload_dir: PathBuf,
    pub upload_max_bytes: usize,

    // Mail
    pub mail_from: String,
    pub mail_relay_url: Option<String>,
    pub mail_timeout_secs: u64,

    // Middleware configuration
    pub request_timeout_secs: u64,
    pub body_size_limit_bytes: usize,
    pub rate_limit_per_minute: u32,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP`
    pub trust_proxy: bool,

    // Logging configuration
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Supports `.env` file loading in development (via dotenv crate).
    pub fn from_env() -> Result<Self, AppError> {
        #[cfg(not(test))]
        {
            dotenv::dotenv().ok(); // file may not exist
        }

        let config = Self {
            bind_address: Self::get_env_or_default("BIND_ADDRESS", "0.0.0.0"),
            port: Self::parse_port()?,
            client_url: Self::get_env_or_default("CLIENT_URL", "http://localhost:3000"),
            database_url: Self::get_required_env("DATABASE_URL")?,
            database_max_connections: Self::parse_or_default("DATABASE_MAX_CONNECTIONS", 10)?,
            run_migrations: Self::parse_bool_or_default("RUN_MIGRATIONS", true)?,
            redis_url: Self::get_env_or_default("REDIS_URL", "redis://localhost:6379/0"),
            jwt_secret: Secret::new(Self::get_required_env("JWT_SECRET")?),
            jwt_ttl_secs: Self::parse_or_default("JWT_TTL_SECS", 7 * 24 * 3600)?,
            stripe_secret_key: Secret::new(Self::get_required_env("STRIPE_SECRET_KEY")?),
            stripe_publishable_key: Self::get_optional_env("STRIPE_PUBLISHABLE_KEY"),
            stripe_webhook_secret: Secret::new(Self::get_required_env("STRIPE_WEBHOOK_SECRET")?),
            stripe_api_base: Self::get_env_or_default("STRIPE_API_BASE", "https://api.stripe.com"),
            stripe_timeout_secs: Self::parse_or_default("STRIPE_TIMEOUT_SECS", 10)?,
            upload_dir: PathBuf::from(Self::get_env_or_default("UPLOAD_DIR", "uploads")),
            upload_max_bytes: Self::parse_or_default("UPLOAD_MAX_BYTES", 5 * 1024 * 1024)?,
            mail_from: Self::get_env_or_default("MAIL_FROM", "Gifted Giving <noreply@giftedgiving.org>"),
            mail_relay_url: Self::get_optional_env("MAIL_RELAY_URL"),
            mail_timeout_secs: Self::parse_or_default("MAIL_TIMEOUT_SECS", 10)?,
            request_timeout_secs: Self::parse_or_default("REQUEST_TIMEOUT_SECS", 30)?,
            body_size_limit_bytes: Self::parse_or_default("BODY_SIZE_LIMIT_BYTES", 2 * 1024 * 1024)?,
            rate_limit_per_minute: Self::parse_or_default("RATE_LIMIT_PER_MINUTE", 20)?,
            trust_proxy: Self::parse_bool_or_default("TRUST_PROXY", false)?,
            log_level: Self::get_env_or_default("LOG_LEVEL", "info"),
            log_format: Self::get_env_or_default("LOG_FORMAT", "json"),
        };

        config.validate()?;

        Ok(config)
    }

    fn get_env_or_default(key: &str, default: &str) -> String {
        match env::var(key) {
            Ok(value) if !value.is_empty() => value,
            _ => default.to_string(),
        }
    }

    fn get_optional_env(key: &str) -> Option<String> {
        match env::var(key) {
            Ok(value) if !value.is_empty() => Some(value),
            _ => None,
        }
    }

    fn get_required_env(key: &str) -> Result<String, AppError> {
        let value = env::var(key)
            .map_err(|_| AppError::ConfigurationError(format!("{} not set", key)))?;

        if value.trim().is_empty() {
            return Err(AppError::ConfigurationError(format!("{} is empty", key)));
        }

        Ok(value)
    }

    /// Parse port from PORT environment variable
    fn parse_port() -> Result<u16, AppError> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "5000".to_string());
        let port = port_str.parse::<u16>().map_err(|e| {
            AppError::ConfigurationError(format!("Invalid PORT value '{}': {}", port_str, e))
        })?;

        if port == 0 {
            return Err(AppError::ConfigurationError(
                "PORT must be between 1 and 65535".to_string(),
            ));
        }

        Ok(port)
    }

    /// Parse a positive number from the environment or return default
    fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
    where
        T: std::str::FromStr + PartialEq + Default,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) if !value.is_empty() => Self::parse_positive(&value, key),
            _ => Ok(default),
        }
    }

    fn parse_positive<T>(value: &str, key: &str) -> Result<T, AppError>
    where
        T: std::str::FromStr + PartialEq + Default,
        T::Err: std::fmt::Display,
    {
        let parsed = value.parse::<T>().map_err(|e| {
            AppError::ConfigurationError(format!("Invalid {} value '{}': {}", key, value, e))
        })?;

        if parsed == T::default() {
            return Err(AppError::ConfigurationError(format!(
                "{} must be greater than 0",
                key
            )));
        }

        Ok(parsed)
    }

    fn parse_bool_or_default(key: &str, default: bool) -> Result<bool, AppError> {
        match env::var(key) {
            Ok(value) if !value.is_empty() => match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(AppError::ConfigurationError(format!(
                    "Invalid {} value '{}': expected true or false",
                    key, other
                ))),
            },
            _ => Ok(default),
        }
    }

    /// Validate all configuration values
    fn validate(&self) -> Result<(), AppError> {
        Self::validate_url(&self.database_url, "Database URL")?;
        Self::validate_url(&self.redis_url, "Redis URL")?;
        Self::validate_url(&self.stripe_api_base, "Stripe API base")?;
        Self::validate_url(&self.client_url, "Client URL")?;
        if let Some(ref url) = self.mail_relay_url {
            Self::validate_url(url, "Mail relay URL")?;
        }

        Self::validate_jwt_secret(self.jwt_secret.expose_secret())?;
        Self::validate_log_level(&self.log_level)?;
        Self::validate_log_format(&self.log_format)?;

        Ok(())
    }

    fn validate_url(url: &str, description: &str) -> Result<(), AppError> {
        url::Url::parse(url).map_err(|e| {
            AppError::ConfigurationError(format!("Invalid {} '{}': {}", description, url, e))
        })?;
        Ok(())
    }

    fn validate_jwt_secret(secret: &str) -> Result<(), AppError> {
        if secret.chars().count() < MIN_JWT_SECRET_LEN {
            return Err(AppError::ConfigurationError(format!(
                "JWT_SECRET must be at least {} characters",
                MIN_JWT_SECRET_LEN
            )));
        }
        Ok(())
    }

    fn validate_log_level(level: &str) -> Result<(), AppError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&level.to_lowercase().as_str()) {
            return Err(AppError::ConfigurationError(format!(
                "Invalid LOG_LEVEL '{}': must be one of {}",
                level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }

    fn validate_log_format(format: &str) -> Result<(), AppError> {
        if format != "json" && format != "text" {
            return Err(AppError::ConfigurationError(format!(
                "Invalid LOG_FORMAT '{}': must be 'json' or 'text'",
                format
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Config {
    /// Create a test configuration for unit tests
    ///
    /// This bypasses environment variable loading and validation.
    pub fn test_config() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5000,
            client_url: "http://localhost:3000".to_string(),
            database_url: "postgresql://localhost/gifted_giving_test".to_string(),
            database_max_connections: 2,
            run_migrations: false,
            redis_url: "redis://localhost:6379/0".to_string(),
            jwt_secret: Secret::new("test-secret-that-is-at-least-32-characters".to_string()),
            jwt_ttl_secs: 3600,
            stripe_secret_key: Secret::new("sk_test_dummy".to_string()),
            stripe_publishable_key: Some("pk_test_dummy".to_string()),
            stripe_webhook_secret: Secret::new("whsec_test_secret".to_string()),
            stripe_api_base: "http://localhost:12111".to_string(),
            stripe_timeout_secs: 5,
            upload_dir: std::env::temp_dir().join("gifted-giving-test-uploads"),
            upload_max_bytes: 5 * 1024 * 1024,
            mail_from: "Gifted Giving <noreply@giftedgiving.org>".to_string(),
            mail_relay_url: None,
            mail_timeout_secs: 5,
            request_timeout_secs: 30,
            body_size_limit_bytes: 2 * 1024 * 1024,
            rate_limit_per_minute: 20,
            trust_proxy: false,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}
