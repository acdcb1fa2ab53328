//! Configuration for the sapporo-web server
//!
//! Settings come from environment variables on top of built-in defaults.
//! Boolean settings use the strict parser from `sapporo-core`, so a typo in
//! `DEBUG` or `USER_SIGNUP` stops start-up instead of silently flipping a
//! switch.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono_tz::Tz;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use sapporo_core::settings::bool_or;
use sapporo_state_postgres::PostgresConfig;

use crate::error::{ServerError, ServerResult};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// In-memory store and human-readable logs when true
    pub debug: bool,

    /// Emitted as `<html lang>`
    pub language_code: String,

    /// IANA zone used to display timestamps
    pub time_zone: String,

    /// Whether the signup page is available
    pub user_signup: bool,

    /// Database settings, used when `debug` is false
    pub postgres: PostgresConfig,

    /// Raw LOG_LEVEL value
    pub log_level: String,

    /// Host to bind to
    pub bind_address: String,

    /// Port to listen on
    pub port: u16,

    /// File holding the secret key
    pub secret_key_file: PathBuf,

    /// Sessions expire after this many idle seconds
    pub session_idle_timeout_secs: u64,

    /// Timeout for calls to WES endpoints
    pub wes_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            debug: true,
            language_code: "en".to_string(),
            time_zone: "UTC".to_string(),
            user_signup: true,
            postgres: PostgresConfig::default(),
            log_level: String::new(),
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            secret_key_file: PathBuf::from("secret_key.txt"),
            session_idle_timeout_secs: 3600,
            wes_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> ServerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.debug = parse_bool("DEBUG", lookup("DEBUG"), config.debug)?;

        if let Some(language_code) = lookup("LANGUAGE_CODE") {
            config.language_code = language_code;
        }

        if let Some(time_zone) = lookup("TIME_ZONE") {
            config.time_zone = time_zone;
        }

        config.user_signup = parse_bool("USER_SIGNUP", lookup("USER_SIGNUP"), config.user_signup)?;

        if let Some(database) = lookup("POSTGRES_DB") {
            config.postgres.database = database;
        }

        if let Some(user) = lookup("POSTGRES_USER") {
            config.postgres.user = user;
        }

        if let Some(password) = lookup("POSTGRES_PASSWORD") {
            config.postgres.password = password;
        }

        if let Some(host) = lookup("POSTGRES_HOST") {
            config.postgres.host = host;
        }

        if let Some(port) = lookup("POSTGRES_PORT") {
            config.postgres.port = port.trim().parse::<u16>().map_err(|_| {
                ServerError::ConfigError(format!("POSTGRES_PORT must be a port number, got '{}'", port))
            })?;
        }

        if let Some(log_level) = lookup("LOG_LEVEL") {
            config.log_level = log_level;
        }

        if let Some(host) = lookup("SERVER_HOST") {
            config.bind_address = host;
        }

        if let Some(port) = lookup("SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.port = port;
            } else {
                warn!("Invalid SERVER_PORT value: {}", port);
            }
        }

        if let Some(path) = lookup("SECRET_KEY_FILE") {
            config.secret_key_file = PathBuf::from(path);
        }

        if let Some(timeout) = lookup("SESSION_IDLE_TIMEOUT") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                config.session_idle_timeout_secs = timeout;
            } else {
                warn!("Invalid SESSION_IDLE_TIMEOUT value: {}", timeout);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ServerResult<()> {
        if self.language_code.trim().is_empty() {
            return Err(ServerError::ConfigError("LANGUAGE_CODE must not be empty".to_string()));
        }
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| ServerError::ConfigError(format!("Unknown TIME_ZONE: {}", self.time_zone)))?;
        if self.session_idle_timeout_secs == 0 {
            return Err(ServerError::ConfigError(
                "SESSION_IDLE_TIMEOUT must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed time zone; `validate` guarantees the name is known
    pub fn tz(&self) -> Tz {
        self.time_zone.parse().unwrap_or(Tz::UTC)
    }

    /// Default tracing directive. `INFO` selects info, anything else debug.
    pub fn log_directive(&self) -> &'static str {
        if self.log_level.trim().eq_ignore_ascii_case("INFO") {
            "info"
        } else {
            "debug"
        }
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Read the secret key, creating the file with a fresh key if it is missing
    pub fn load_secret_key(&self) -> ServerResult<String> {
        load_or_create_secret_key(&self.secret_key_file)
    }
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> ServerResult<bool> {
    bool_or(value.as_deref(), default).map_err(|err| ServerError::ConfigError(format!("{}: {}", key, err)))
}

/// 32 random bytes, url-safe base64 without padding
pub fn generate_secret_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn load_or_create_secret_key(path: &Path) -> ServerResult<String> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        return contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(str::to_string)
            .ok_or_else(|| {
                ServerError::ConfigError(format!("Secret key file {} is empty", path.display()))
            });
    }

    let key = generate_secret_key();
    std::fs::write(path, &key)?;
    info!(path = %path.display(), "Generated new secret key file");
    Ok(key)
}
