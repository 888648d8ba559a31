use std::env;

use thiserror::Error;

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:3000";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Process-wide settings, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub app_env: String,
    pub app_debug: bool,
    pub database_url: String,
    pub redis_url: Option<String>,
    pub cors_origins: Vec<String>,
    pub secret_key: String,
    pub log_level: String,
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        if database_url.trim().is_empty() {
            return Err(ConfigError::Empty("DATABASE_URL"));
        }

        let secret_key = lookup("SECRET_KEY").ok_or(ConfigError::Missing("SECRET_KEY"))?;
        if secret_key.is_empty() {
            return Err(ConfigError::Empty("SECRET_KEY"));
        }

        let app_debug = match lookup("APP_DEBUG") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid {
                name: "APP_DEBUG",
                value: raw,
            })?,
            None => false,
        };

        let server_port = match lookup("SERVER_PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                name: "SERVER_PORT",
                value: raw,
            })?,
            None => 8000,
        };

        Ok(Config {
            app_env: lookup("APP_ENV").unwrap_or_else(|| "development".to_string()),
            app_debug,
            database_url,
            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            cors_origins: lookup("CORS_ORIGINS")
                .map(|raw| parse_origins(&raw))
                .unwrap_or_else(|| vec![DEFAULT_CORS_ORIGIN.to_string()]),
            secret_key,
            log_level: lookup("LOG_LEVEL")
                .unwrap_or_else(|| "info".to_string())
                .to_lowercase(),
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port,
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Development gets human-readable multi-line log output.
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }

    /// Default `EnvFilter` directives when `RUST_LOG` is not set.
    /// `APP_DEBUG` additionally surfaces every SQL statement.
    pub fn log_filter(&self) -> String {
        let mut filter = format!(
            "makers_api={level},tower_http={level}",
            level = self.log_level
        );
        if self.app_debug {
            filter.push_str(",sqlx::query=debug");
        }
        filter
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
