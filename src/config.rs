//! Layered configuration: defaults, then an optional TOML file, then
//! `SKIRMISH_*` environment variables (nested keys split on `__`)

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encounter::TurnMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub turn_mode: TurnMode,
    /// Real-time length of one round, for round-based effect expiry
    pub round_seconds: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            turn_mode: TurnMode::Checkpoint,
            round_seconds: 6,
        }
    }
}

impl EngineConfig {
    pub fn round_length(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.round_seconds as i64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite file; in-memory storage when absent
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            storage: StorageConfig::default(),
            log_filter: "skirmish=info".to_string(),
        }
    }
}

impl Config {
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("SKIRMISH_").split("__"))
    }

    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Config = Self::figment(file).extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.round_seconds == 0 {
            return Err(ConfigError::Invalid(
                "engine.round_seconds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        Jail::expect_with(|_| {
            let config = Config::load(None).unwrap();
            assert_eq!(config, Config::default());
            assert_eq!(config.engine.turn_mode, TurnMode::Checkpoint);
            assert_eq!(config.engine.round_length(), chrono::Duration::seconds(6));
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "skirmish.toml",
                r#"
                log_filter = "skirmish=debug"

                [engine]
                turn_mode = "auto"
                round_seconds = 10

                [storage]
                db_path = "encounters.db"
                "#,
            )?;
            jail.set_env("SKIRMISH_ENGINE__ROUND_SECONDS", "12");

            let config = Config::load(Some(Path::new("skirmish.toml"))).unwrap();
            assert_eq!(config.engine.turn_mode, TurnMode::Auto);
            assert_eq!(config.engine.round_seconds, 12);
            assert_eq!(config.storage.db_path.as_deref(), Some("encounters.db"));
            assert_eq!(config.log_filter, "skirmish=debug");
            Ok(())
        });
    }

    #[test]
    fn test_rejects_zero_round() {
        Jail::expect_with(|jail| {
            jail.set_env("SKIRMISH_ENGINE__ROUND_SECONDS", "0");
            assert!(matches!(Config::load(None), Err(ConfigError::Invalid(_))));
            Ok(())
        });
    }

    #[test]
    fn test_bad_turn_mode() {
        Jail::expect_with(|jail| {
            jail.set_env("SKIRMISH_ENGINE__TURN_MODE", "sometimes");
            assert!(matches!(Config::load(None), Err(ConfigError::Load(_))));
            Ok(())
        });
    }
}
