use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub temporary: bool,
    pub flush_on_write: bool,
    pub max_write_attempts: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("routing.db"),
            temporary: false,
            flush_on_write: false,
            max_write_attempts: 8,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl LoggingConfig {
    pub fn logging_level(&self) -> Result<Level, ConfigError> {
        self.level.trim().parse::<Level>().map_err(|_| {
            ConfigError::Validation(format!(
                "unsupported log level `{}` (expected trace|debug|info|warn|error)",
                self.level
            ))
        })
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl RoutingConfig {
    /// Defaults, then the TOML file if given, then `ROUTING_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };

        config.apply_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Applies `ROUTING_*` pairs; unrelated keys are ignored.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "ROUTING_DB_PATH" => self.storage.path = PathBuf::from(value),
                "ROUTING_TEMPORARY" => self.storage.temporary = parse_env(&key, &value)?,
                "ROUTING_FLUSH_ON_WRITE" => {
                    self.storage.flush_on_write = parse_env(&key, &value)?
                }
                "ROUTING_MAX_WRITE_ATTEMPTS" => {
                    self.storage.max_write_attempts = parse_env(&key, &value)?
                }
                "ROUTING_LOG_LEVEL" => self.logging.level = value,
                "ROUTING_LOG_FORMAT" => self.logging.format = value.parse()?,
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.max_write_attempts == 0 {
            return Err(ConfigError::Validation(
                "storage.max_write_attempts must be at least 1".to_string(),
            ));
        }
        if !self.storage.temporary && self.storage.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "storage.path is required unless storage.temporary is set".to_string(),
            ));
        }
        self.logging.logging_level()?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = RoutingConfig::from_toml_str("").unwrap();
        assert_eq!(config, RoutingConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = RoutingConfig::from_toml_str(
            r#"
            [storage]
            path = "/var/lib/routing"
            flush_on_write = true

            [logging]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.path, PathBuf::from("/var/lib/routing"));
        assert!(config.storage.flush_on_write);
        assert_eq!(config.storage.max_write_attempts, 8);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn env_overrides_win() {
        let mut config = RoutingConfig::default();
        config
            .apply_overrides(vars(&[
                ("ROUTING_DB_PATH", "/tmp/chains"),
                ("ROUTING_MAX_WRITE_ATTEMPTS", "3"),
                ("ROUTING_LOG_FORMAT", "Pretty"),
                ("HOME", "/root"),
            ]))
            .unwrap();

        assert_eq!(config.storage.path, PathBuf::from("/tmp/chains"));
        assert_eq!(config.storage.max_write_attempts, 3);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn bad_override_is_reported() {
        let mut config = RoutingConfig::default();
        let err = config
            .apply_overrides(vars(&[("ROUTING_TEMPORARY", "maybe")]))
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidEnvOverride { .. }));
    }

    #[test]
    fn validation_rejects_zero_attempts_and_unknown_level() {
        let mut config = RoutingConfig::default();
        config.storage.max_write_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = RoutingConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_level_is_case_insensitive() {
        let logging = LoggingConfig {
            level: " WARN ".to_string(),
            format: LogFormat::Compact,
        };
        assert_eq!(logging.logging_level().unwrap(), Level::WARN);

        let logging = LoggingConfig {
            level: "chatty".to_string(),
            ..LoggingConfig::default()
        };
        assert!(matches!(
            logging.logging_level(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn unknown_format_in_file_is_a_parse_error() {
        let result = RoutingConfig::from_toml_str("[logging]\nformat = \"xml\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
