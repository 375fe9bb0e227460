//! Application configuration loaded from environment variables.
//!
//! Loading is fail-fast: a missing required variable or an unparsable value
//! stops startup with a message naming the variable.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use enrol_api_import::validation::KNOWN_COLUMNS;
use enrol_api_import::{ImportConfig, TokenConfig};
use enrol_auth::PasswordPolicy;
use thiserror::Error;

const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_NOTIFIER_TIMEOUT_SECS: u64 = 5;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

impl ConfigError {
    fn invalid(var: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            var: var.to_string(),
            message: message.into(),
        }
    }
}

/// Where users and tokens are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// Process-local maps. State is lost on restart.
    Memory,
    Postgres {
        database_url: String,
        max_connections: u32,
    },
}

/// How tokens reach users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifierKind {
    /// Log the delivery (without the token value). Development only.
    Log,
    /// POST the message as JSON to a mail relay.
    Webhook { url: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    pub store: StoreBackend,
    pub notifier: NotifierKind,
    pub notifier_timeout: Duration,
    pub frontend_base_url: String,
    pub tokens: TokenConfig,
    pub import: ImportConfig,
    pub password_policy: PasswordPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is read first if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let host = vars.string_or("HOST", "0.0.0.0");
        let port: u16 = vars.parse_or("PORT", 8080)?;
        if port == 0 {
            return Err(ConfigError::invalid("PORT", "Port must be greater than 0"));
        }
        let rust_log = vars.string_or("RUST_LOG", "info");

        let store = match vars.string_or("STORE_BACKEND", "memory").to_lowercase().as_str() {
            "memory" => StoreBackend::Memory,
            "postgres" => StoreBackend::Postgres {
                database_url: vars.required("DATABASE_URL")?,
                max_connections: vars
                    .parse_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS)?,
            },
            other => {
                return Err(ConfigError::invalid(
                    "STORE_BACKEND",
                    format!("Unknown backend '{other}' (expected memory or postgres)"),
                ))
            }
        };

        let notifier = match vars.string_or("NOTIFIER", "log").to_lowercase().as_str() {
            "log" => NotifierKind::Log,
            "webhook" => {
                let url = vars.required("NOTIFIER_WEBHOOK_URL")?;
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ConfigError::invalid(
                        "NOTIFIER_WEBHOOK_URL",
                        "Must be an http(s) URL",
                    ));
                }
                NotifierKind::Webhook { url }
            }
            other => {
                return Err(ConfigError::invalid(
                    "NOTIFIER",
                    format!("Unknown notifier '{other}' (expected log or webhook)"),
                ))
            }
        };
        let notifier_timeout = Duration::from_secs(
            vars.positive_or("NOTIFIER_TIMEOUT_SECS", DEFAULT_NOTIFIER_TIMEOUT_SECS)?,
        );
        let frontend_base_url = vars.string_or("FRONTEND_BASE_URL", "http://localhost:3000");

        let token_defaults = TokenConfig::default();
        let tokens = TokenConfig {
            access_ttl: chrono::Duration::minutes(vars.positive_or(
                "ACCESS_TOKEN_TTL_MINUTES",
                token_defaults.access_ttl.num_minutes(),
            )?),
            invitation_ttl: chrono::Duration::minutes(vars.positive_or(
                "INVITATION_TOKEN_TTL_MINUTES",
                token_defaults.invitation_ttl.num_minutes(),
            )?),
        };

        let import_defaults = ImportConfig::default();
        let import = ImportConfig {
            max_file_bytes: vars.positive_or("IMPORT_MAX_FILE_BYTES", import_defaults.max_file_bytes)?,
            max_rows: vars.positive_or("IMPORT_MAX_ROWS", import_defaults.max_rows)?,
            concurrency: vars.positive_or("IMPORT_CONCURRENCY", import_defaults.concurrency)?,
            required_columns: match vars.get("IMPORT_REQUIRED_COLUMNS") {
                Some(list) => list
                    .split(',')
                    .map(|c| c.trim().to_lowercase())
                    .filter(|c| !c.is_empty())
                    .collect(),
                None => import_defaults.required_columns,
            },
        };
        if let Some(unknown) = import
            .required_columns
            .iter()
            .find(|c| !KNOWN_COLUMNS.contains(&c.as_str()))
        {
            return Err(ConfigError::invalid(
                "IMPORT_REQUIRED_COLUMNS",
                format!("'{unknown}' is not a recognised column"),
            ));
        }

        let policy_defaults = PasswordPolicy::default();
        let password_policy = PasswordPolicy {
            min_length: vars.positive_or("PASSWORD_MIN_LENGTH", policy_defaults.min_length)?,
            max_length: vars.positive_or("PASSWORD_MAX_LENGTH", policy_defaults.max_length)?,
            require_uppercase: vars
                .bool_or("PASSWORD_REQUIRE_UPPERCASE", policy_defaults.require_uppercase)?,
            require_lowercase: vars
                .bool_or("PASSWORD_REQUIRE_LOWERCASE", policy_defaults.require_lowercase)?,
            require_digit: vars.bool_or("PASSWORD_REQUIRE_DIGIT", policy_defaults.require_digit)?,
            require_special: vars
                .bool_or("PASSWORD_REQUIRE_SPECIAL", policy_defaults.require_special)?,
        };
        if password_policy.min_length > password_policy.max_length {
            return Err(ConfigError::invalid(
                "PASSWORD_MIN_LENGTH",
                "Must not exceed PASSWORD_MAX_LENGTH",
            ));
        }

        Ok(Self {
            host,
            port,
            rust_log,
            store,
            notifier,
            notifier_timeout,
            frontend_base_url,
            tokens,
            import,
            password_policy,
        })
    }

    /// Get the server bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
    }

    fn string_or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(name, format!("'{raw}': {e}"))),
            None => Ok(default),
        }
    }

    fn positive_or<T>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + Default,
        T::Err: std::fmt::Display,
    {
        let value = self.parse_or(name, default)?;
        if value <= T::default() {
            return Err(ConfigError::invalid(name, "Must be greater than 0"));
        }
        Ok(value)
    }

    fn bool_or(&self, name: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(name).map(|v| v.to_lowercase()).as_deref() {
            None => Ok(default),
            Some("true" | "1" | "yes") => Ok(true),
            Some("false" | "0" | "no") => Ok(false),
            Some(other) => Err(ConfigError::invalid(
                name,
                format!("'{other}' is not a boolean"),
            )),
        }
    }
}
