//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub geoip: GeoIpConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Built front end, served for every path without a route
    pub static_dir: String,
    /// Take the client address from X-Real-IP / X-Forwarded-For
    pub trust_proxy_headers: bool,
    /// Disables the permissive development CORS policy
    pub production: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub path: String,
    /// Drop sessions idle for longer than this many days. Unset keeps every
    /// session forever.
    #[serde(default)]
    pub session_retention_days: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeoIpConfig {
    pub database: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Bearer token accepted by the statistics endpoints
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config";

        let builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.static_dir", "dist")?
            .set_default("server.trust_proxy_headers", true)?
            .set_default("server.production", false)?
            .set_default("store.path", "data/visits.json")?
            .set_default("geoip.database", "data/GeoLite2-City.mmdb")?
            .set_default("geoip.timeout_ms", 250)?
            .set_default("auth.token", "")?
            .set_default("logging.level", "info")?
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("VISITS")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Invalid port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        if self.store.path.is_empty() {
            anyhow::bail!("Store path cannot be empty");
        }
        if self.store.session_retention_days == Some(0) {
            anyhow::bail!("session_retention_days must be at least 1 when set");
        }

        if self.geoip.timeout_ms == 0 {
            anyhow::bail!("GeoIP timeout must be greater than zero");
        }

        // Validate logging level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid logging level '{}'. Must be one of: {:?}", self.logging.level, valid_levels);
        }

        Ok(())
    }

    pub fn geoip_timeout(&self) -> Duration {
        Duration::from_millis(self.geoip.timeout_ms)
    }

    pub fn session_retention(&self) -> Option<chrono::Duration> {
        self.store
            .session_retention_days
            .map(|days| chrono::Duration::days(i64::from(days)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
                static_dir: "dist".to_string(),
                trust_proxy_headers: true,
                production: false,
            },
            store: StoreConfig {
                path: "data/visits.json".to_string(),
                session_retention_days: None,
            },
            geoip: GeoIpConfig {
                database: "data/GeoLite2-City.mmdb".to_string(),
                timeout_ms: 250,
            },
            auth: AuthConfig { token: "secret".to_string() },
            logging: LoggingConfig { level: "INFO".to_string() },
        }
    }

    #[test]
    fn sample_is_valid() {
        let config = sample();
        config.validate().unwrap();
        assert_eq!(config.geoip_timeout(), Duration::from_millis(250));
        assert!(config.session_retention().is_none());
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = sample();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.store.path.clear();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.store.session_retention_days = Some(0);
        assert!(config.validate().is_err());

        let mut config = sample();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn retention_in_days() {
        let mut config = sample();
        config.store.session_retention_days = Some(30);
        assert_eq!(config.session_retention(), Some(chrono::Duration::days(30)));
    }
}
