/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct.
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: Bind address (default: 0.0.0.0:8080)
/// - `CORS_ORIGINS`: Comma-separated allowed origins, `*` for any (default: `*`)
/// - `FRONTEND_URL`: Frontend base URL (default: http://localhost:5173)
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `DATABASE_MAX_CONNECTIONS`: Pool size (default: 10)
/// - `JWT_SECRET`: Secret key for access token signing (required, >= 32 chars)
/// - `JWT_ACCESS_EXPIRE_MINUTES`: Access token lifetime (default: 60)
/// - `JWT_REFRESH_EXPIRE_HOURS`: Renewal token lifetime, 0 for none (default: 720)
/// - `JWT_REFRESH_INACTIVITY_HOURS`: Renewal inactivity window (default: 48)
/// - `OAUTH_CODE_EXPIRE_MINUTES`: One-time exchange code lifetime (default: 5)
/// - `OAUTH_STATE_EXPIRE_MINUTES`: Login state lifetime (default: 10)
/// - `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`: OAuth client (required)
/// - `GOOGLE_REDIRECT_URI`: OAuth callback (default: `FRONTEND_URL/auth/google/callback`)
/// - `OPENAI_API_KEY`: Assistant key (required)
/// - `OPENAI_MODEL`: Assistant model (default: gpt-4o-mini)
/// - `OPENAI_MAX_RETRIES`: Assistant retries after the first attempt (default: 2)
/// - `HTTP_TIMEOUT_SECONDS`: Timeout for every outbound provider call (default: 15)
/// - `DEFAULT_TIMEZONE`: Timezone for new users and fallbacks (default: Asia/Taipei)
/// - `DEFAULT_CURRENCY`: Currency assumed when none is given (default: TWD)
/// - `LOG_FORMAT`: `json` for JSON logs, anything else for text
/// - `RUST_LOG`: Log filter
///
/// # Example
///
/// ```no_run
/// use voicebook_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub google: GoogleConfig,
    pub openai: OpenAiSettings,
    pub ledger: LedgerSettings,
}

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `["*"]` allows any
    pub cors_origins: Vec<String>,

    pub frontend_url: String,

    /// Timeout applied to every outbound provider call
    pub http_timeout_seconds: u64,

    /// Emit JSON logs
    pub json_logs: bool,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Session token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// Secret key for access token signing
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    #[serde(skip_serializing)]
    pub secret: String,

    pub access_expire_minutes: i64,

    /// 0 disables the absolute renewal lifetime
    pub refresh_expire_hours: i64,

    pub refresh_inactivity_hours: i64,
    pub code_expire_minutes: i64,
    pub state_expire_minutes: i64,
}

/// Google OAuth configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,

    #[serde(skip_serializing)]
    pub client_secret: String,

    pub redirect_uri: String,
}

/// Assistant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiSettings {
    #[serde(skip_serializing)]
    pub api_key: String,

    pub model: String,
    pub max_retries: u32,
}

/// Ledger defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    pub default_timezone: String,
    pub default_currency: String,
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).map_err(|_| anyhow::anyhow!("{} environment variable is required", name))
}

fn parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value", name)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let frontend_url = env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let default_timezone =
            env::var("DEFAULT_TIMEZONE").unwrap_or_else(|_| "Asia/Taipei".to_string());
        if default_timezone.parse::<chrono_tz::Tz>().is_err() {
            anyhow::bail!("DEFAULT_TIMEZONE '{}' is not a valid IANA timezone", default_timezone);
        }

        let redirect_uri = env::var("GOOGLE_REDIRECT_URI")
            .unwrap_or_else(|_| format!("{}/auth/google/callback", frontend_url));

        Ok(Self {
            api: ApiConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parsed("API_PORT", 8080)?,
                cors_origins,
                frontend_url,
                http_timeout_seconds: parsed("HTTP_TIMEOUT_SECONDS", 15)?,
                json_logs: env::var("LOG_FORMAT").map_or(false, |f| f.eq_ignore_ascii_case("json")),
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            },
            jwt: JwtConfig {
                secret: jwt_secret,
                access_expire_minutes: parsed("JWT_ACCESS_EXPIRE_MINUTES", 60)?,
                refresh_expire_hours: parsed("JWT_REFRESH_EXPIRE_HOURS", 720)?,
                refresh_inactivity_hours: parsed("JWT_REFRESH_INACTIVITY_HOURS", 48)?,
                code_expire_minutes: parsed("OAUTH_CODE_EXPIRE_MINUTES", 5)?,
                state_expire_minutes: parsed("OAUTH_STATE_EXPIRE_MINUTES", 10)?,
            },
            google: GoogleConfig {
                client_id: required("GOOGLE_CLIENT_ID")?,
                client_secret: required("GOOGLE_CLIENT_SECRET")?,
                redirect_uri,
            },
            openai: OpenAiSettings {
                api_key: required("OPENAI_API_KEY")?,
                model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                max_retries: parsed("OPENAI_MAX_RETRIES", 2)?,
            },
            ledger: LedgerSettings {
                default_timezone,
                default_currency: env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "TWD".to_string()),
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Timezone used when a user has none or an invalid one stored
    pub fn default_tz(&self) -> chrono_tz::Tz {
        self.ledger
            .default_timezone
            .parse()
            .unwrap_or(chrono_tz::Asia::Taipei)
    }

    /// Configuration for tests and local tooling; no environment access
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                cors_origins: vec!["*".to_string()],
                frontend_url: "http://localhost:5173".to_string(),
                http_timeout_seconds: 15,
                json_logs: false,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/voicebook_test".to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: jwt_secret.to_string(),
                access_expire_minutes: 60,
                refresh_expire_hours: 720,
                refresh_inactivity_hours: 48,
                code_expire_minutes: 5,
                state_expire_minutes: 10,
            },
            google: GoogleConfig {
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                redirect_uri: "http://localhost:5173/auth/google/callback".to_string(),
            },
            openai: OpenAiSettings {
                api_key: "test-key".to_string(),
                model: "gpt-4o-mini".to_string(),
                max_retries: 0,
            },
            ledger: LedgerSettings {
                default_timezone: "Asia/Taipei".to_string(),
                default_currency: "TWD".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_address() {
        let mut config = Config::for_tests("test-secret-key-at-least-32-bytes-long");
        config.api.host = "0.0.0.0".to_string();
        config.api.port = 9000;

        assert_eq!(config.bind_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_default_tz_fallback() {
        let mut config = Config::for_tests("test-secret-key-at-least-32-bytes-long");
        assert_eq!(config.default_tz(), chrono_tz::Asia::Taipei);

        config.ledger.default_timezone = "Europe/Berlin".to_string();
        assert_eq!(config.default_tz(), chrono_tz::Europe::Berlin);

        config.ledger.default_timezone = "Mars/Olympus".to_string();
        assert_eq!(config.default_tz(), chrono_tz::Asia::Taipei);
    }

    #[test]
    fn test_secrets_not_serialized() {
        let config = Config::for_tests("test-secret-key-at-least-32-bytes-long");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("test-secret-key"));
        assert!(!json.contains("test-key"));
    }
}
