//! # configs
//!
//! Layered application settings.
//!
//! Sources, later ones winning:
//! 1. `config/default.toml` (optional)
//! 2. `config/{APP_ENV}.toml` (optional, `APP_ENV` defaults to `development`)
//! 3. `LEARNHUB__SECTION__KEY` environment variables
//!
//! `.env` is read first so its entries participate as environment variables.

use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn secret<'de, D: Deserializer<'de>>(d: D) -> Result<SecretString, D::Error> {
    String::deserialize(d).map(SecretString::from)
}

fn empty_secret() -> SecretString {
    SecretString::from(String::new())
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub geo: GeoConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// JSON log lines instead of the pretty formatter.
    pub json_logs: bool,
    /// Key for the private (encrypted) cookie jar.
    #[serde(deserialize_with = "secret")]
    pub cookie_key: SecretString,
    /// Salt mixed into the per-comment request identity hash.
    #[serde(deserialize_with = "secret")]
    pub identity_salt: SecretString,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            json_logs: false,
            cookie_key: empty_secret(),
            identity_salt: empty_secret(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: Backend,
    #[serde(deserialize_with = "secret")]
    pub url: SecretString,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            url: empty_secret(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub idle_minutes: i64,
    pub remember_years: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "ado-ident".into(),
            idle_minutes: 120,
            remember_years: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub max_attempts: i64,
    pub window_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Base URL of an ip-api compatible service. Empty disables lookups.
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_secs: 3,
        }
    }
}

impl GeoConfig {
    pub fn enabled(&self) -> bool {
        !self.endpoint.trim().is_empty()
    }
}

fn toml_file(path: &Path) -> File<config::FileSourceFile, FileFormat> {
    File::new(&path.to_string_lossy(), FileFormat::Toml).required(false)
}

impl AppConfig {
    /// Loads `.env`, then the layered sources rooted at `./config`.
    pub fn load() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            debug!(error = %err, "no .env file loaded");
        }
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".into());
        Self::load_from(Path::new("config"), &env)
    }

    pub fn load_from(dir: &Path, env: &str) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(toml_file(&dir.join("default.toml")))
            .add_source(toml_file(&dir.join(format!("{env}.toml"))))
            .add_source(
                Environment::with_prefix("LEARNHUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a single TOML document, without files or environment.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.backend == Backend::Postgres && self.database.url.expose_secret().is_empty() {
            return Err(ConfigError::Invalid(
                "database.url is required for the postgres backend".into(),
            ));
        }
        if self.session.idle_minutes <= 0 {
            return Err(ConfigError::Invalid("session.idle_minutes must be positive".into()));
        }
        if self.auth.max_attempts <= 0 {
            return Err(ConfigError::Invalid("auth.max_attempts must be positive".into()));
        }
        Ok(())
    }
}
