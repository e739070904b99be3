//! Service configuration
//!
//! Loaded in order:
//! 1. `config/default.{toml,yaml,json}` (optional)
//! 2. `config/{PROCTOR_ENV}` (optional, defaults to `development`)
//! 3. Environment variables with the `PROCTOR__` prefix, e.g.
//!    `PROCTOR__SERVER__ADDR=0.0.0.0:9000` or
//!    `PROCTOR__PROCTOR__CRITICAL_GRACE_SECS=5`

use proctor::ProctorConfig;
use serde::{Deserialize, Serialize};

use crate::ApiError;

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub sessions: SessionConfig,
    pub proctor: ProctorConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn, error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Confirmed critical verdicts allowed before the session is terminated
    pub max_attempts: u32,
    /// Sessions without frames for this long are evicted (seconds)
    pub session_idle_secs: u64,
    /// How often the idle sweeper runs (seconds)
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            session_idle_secs: 1800,
            sweep_interval_secs: 60,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ApiError> {
        let env = std::env::var("PROCTOR_ENV").unwrap_or_else(|_| "development".to_string());

        let config: ServiceConfig = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                config::Environment::with_prefix("PROCTOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ApiError> {
        self.proctor.validate()?;

        if self.sessions.max_attempts == 0 {
            return Err(ApiError::InvalidConfig(
                "sessions.max_attempts must be greater than 0".into(),
            ));
        }
        if self.sessions.sweep_interval_secs == 0 {
            return Err(ApiError::InvalidConfig(
                "sessions.sweep_interval_secs must be greater than 0".into(),
            ));
        }
        if self.logging.level.parse::<tracing::Level>().is_err() {
            return Err(ApiError::InvalidConfig(format!(
                "unknown logging.level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sessions.max_attempts, 3);
        assert_eq!(config.proctor, ProctorConfig::default());
    }

    #[test]
    fn test_invalid_values() {
        let mut config = ServiceConfig::default();
        config.logging.level = "loud".into();
        assert!(matches!(config.validate(), Err(ApiError::InvalidConfig(_))));

        let mut config = ServiceConfig::default();
        config.proctor.pose_window = 0;
        assert!(matches!(config.validate(), Err(ApiError::Proctor(_))));
    }

    #[test]
    fn test_nested_overrides() {
        let config: ServiceConfig = config::Config::builder()
            .set_override("proctor.critical_grace_secs", 5.0)
            .unwrap()
            .set_override("sessions.max_attempts", 5)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.proctor.critical_grace_secs, 5.0);
        assert_eq!(config.proctor.yaw_warn_deg, 50.0);
        assert_eq!(config.sessions.max_attempts, 5);
        assert_eq!(config.server.addr, "0.0.0.0:8080");
    }
}
