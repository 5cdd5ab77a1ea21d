//! Configuration management for the estate weighbridge server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with the ESTATE__ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    pub server: ServerConfig,

    pub database: DatabaseConfig,

    pub jwt: JwtConfig,

    /// Company-wide defaults for ticket operations
    pub operations: OperationSettings,

    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    pub max_connections: u32,

    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for signing JWT tokens
    pub secret: String,

    /// Issuer written into issued tokens
    pub issuer: String,

    /// Access token lifetime in seconds
    pub token_expiry: i64,

    /// Clock skew tolerated when checking `exp`
    pub leeway_seconds: u64,
}

/// Switches that gate ticket and quality-control operations.
///
/// The values here are the defaults; a row in `company_settings` overrides
/// them for its company.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct OperationSettings {
    /// Post tickets and quality controls right after they are created
    pub auto_post_scale_ticket: bool,

    /// Allow PUT on tickets and quality controls
    pub allow_update_scale_ticket: bool,

    /// Prefix of generated ticket names, e.g. `WB` in `WB/2024/00001`
    pub scale_sequence_prefix: String,
}

impl Default for OperationSettings {
    fn default() -> Self {
        Self {
            auto_post_scale_ticket: false,
            allow_update_scale_ticket: false,
            scale_sequence_prefix: "WB".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    /// `pretty` or `json`
    pub format: String,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("ESTATE_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.port", 8069)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("jwt.issuer", "estate-weighbridge")?
            .set_default("jwt.token_expiry", 36000)?
            .set_default("jwt.leeway_seconds", 60)?
            .set_default("operations.auto_post_scale_ticket", false)?
            .set_default("operations.allow_update_scale_ticket", false)?
            .set_default("operations.scale_sequence_prefix", "WB")?
            .set_default("log.format", "pretty")?
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            .add_source(
                Environment::with_prefix("ESTATE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8069,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_default_to_manual_posting() {
        let settings = OperationSettings::default();
        assert!(!settings.auto_post_scale_ticket);
        assert!(!settings.allow_update_scale_ticket);
        assert_eq!(settings.scale_sequence_prefix, "WB");
    }

    #[test]
    fn server_listens_on_all_interfaces() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8069);
    }
}
