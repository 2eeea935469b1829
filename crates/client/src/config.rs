//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `FARM_MARKET_API_URL` - API base URL (default: `http://localhost:8000/api/v1`)
//! - `FARM_MARKET_TIMEOUT_SECS` - Per-request timeout in seconds (default: 30)
//! - `FARM_MARKET_EMAIL` / `FARM_MARKET_PASSWORD` - Buyer credentials for login
//! - `FARM_MARKET_ACCESS_TOKEN` - Access token to use instead of logging in
//! - `FARM_MARKET_REFRESH_TOKEN` - Refresh token paired with the access token
//!
//! The email and password must be set together. A refresh token without an
//! access token is rejected.

use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Default API base URL (local development backend).
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Buyer login credentials.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// API client configuration.
///
/// Implements `Debug` manually to redact tokens.
#[derive(Clone)]
pub struct ClientConfig {
    /// API base URL, e.g. `http://localhost:8000/api/v1`
    pub api_url: Url,
    /// Per-request timeout enforced by the HTTP client
    pub timeout: Duration,
    /// Credentials used when no access token is configured
    pub credentials: Option<Credentials>,
    /// Pre-issued access token
    pub access_token: Option<SecretString>,
    /// Pre-issued refresh token
    pub refresh_token: Option<SecretString>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_url", &self.api_url.as_str())
            .field("timeout", &self.timeout)
            .field("credentials", &self.credentials)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ClientConfig {
    /// Configuration for `api_url` with defaults and no authentication.
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            credentials: None,
            access_token: None,
            refresh_token: None,
        }
    }

    /// Parse `api_url` and build a configuration for it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if the URL does not parse or is not HTTP(S).
    pub fn for_url(api_url: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_api_url("FARM_MARKET_API_URL", api_url)?))
    }

    /// Use pre-issued tokens.
    #[must_use]
    pub fn with_tokens(mut self, access: SecretString, refresh: Option<SecretString>) -> Self {
        self.access_token = Some(access);
        self.refresh_token = refresh;
        self
    }

    /// Log in with these credentials.
    #[must_use]
    pub fn with_credentials(mut self, email: impl Into<String>, password: SecretString) -> Self {
        self.credentials = Some(Credentials {
            email: email.into(),
            password,
        });
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is malformed or a paired variable
    /// is missing its partner.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = parse_api_url(
            "FARM_MARKET_API_URL",
            &get_env_or_default("FARM_MARKET_API_URL", DEFAULT_API_URL),
        )?;
        let timeout_secs = get_env_or_default("FARM_MARKET_TIMEOUT_SECS", "30")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("FARM_MARKET_TIMEOUT_SECS".to_string(), e.to_string())
            })?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "FARM_MARKET_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        let credentials = match get_optional_env("FARM_MARKET_EMAIL") {
            Some(email) => Some(Credentials {
                email,
                password: get_required_secret("FARM_MARKET_PASSWORD")?,
            }),
            None => None,
        };

        let access_token = get_optional_env("FARM_MARKET_ACCESS_TOKEN").map(SecretString::from);
        let refresh_token = get_optional_env("FARM_MARKET_REFRESH_TOKEN").map(SecretString::from);
        if refresh_token.is_some() && access_token.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "FARM_MARKET_ACCESS_TOKEN".to_string(),
            ));
        }

        Ok(Self {
            api_url,
            timeout: Duration::from_secs(timeout_secs),
            credentials,
            access_token,
            refresh_token,
        })
    }

    /// Full URL for an API path such as `/basket/`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.api_url.as_str().trim_end_matches('/'))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse and validate an API base URL.
fn parse_api_url(var_name: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}
