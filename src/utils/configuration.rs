//! Layered configuration for the embedding engine
//!
//! Sources, lowest precedence first: built-in defaults, an optional
//! TOML file (explicit path, `./genovec.toml`, or the user config
//! directory), then `GENOVEC__`-prefixed environment variables.
//! Configuration errors fail fast before any model state is built.

use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Fail-fast configuration errors. Everything here means no partial
/// state was constructed.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Configuration error: {message}")]
    Invalid { message: String },

    #[error("Validation error: {field} is invalid: {reason}")]
    Validation { field: String, reason: String },

    #[error("Unsupported norm '{norm}' (try \"l2\" or \"none\")")]
    UnsupportedNorm { norm: String },

    #[error("Unsupported annotation format '{format}' (try \"pfamscan\" or \"hmmer\")")]
    UnsupportedFormat { format: String },

    #[error("Unknown model mode '{mode}' (try \"ensemble\", \"core\" or \"accessory\")")]
    UnknownMode { mode: String },
}

impl From<ConfigError> for ConfigurationError {
    fn from(err: ConfigError) -> Self {
        ConfigurationError::Invalid {
            message: err.to_string(),
        }
    }
}

/// Full configuration tree. Partial files are fine; absent sections
/// fall back to the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GenovecConfiguration {
    pub models: ModelConfig,
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory holding one subdirectory per trained model.
    pub model_dir: PathBuf,
    /// Model selection mode: ensemble, core or accessory.
    pub mode: String,
    /// Vector normalization: l2 or none.
    pub norm: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            mode: "core".to_string(),
            norm: "l2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default number of hits to return.
    pub topn: usize,
    /// Inference iterations per model.
    pub steps: usize,
    /// Optional score threshold; hits must score above it.
    pub min_score: Option<f32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            topn: 10,
            steps: 1000,
            min_score: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
    /// Output format (pretty or compact).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Loads, validates and exposes the configuration.
pub struct ConfigurationManager {
    config: GenovecConfiguration,
    config_path: Option<PathBuf>,
}

impl ConfigurationManager {
    /// Built-in defaults, file and environment layers applied.
    pub fn new() -> Result<Self, ConfigurationError> {
        let mut builder = Config::builder();

        // Local project config
        builder = builder.add_source(File::with_name("genovec").required(false));

        // User config
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("genovec").join("config.toml");
            builder = builder.add_source(File::from(user_config).required(false));
        }

        // Environment overrides: GENOVEC__SEARCH__TOPN=25 etc.
        builder = builder.add_source(Environment::with_prefix("GENOVEC").separator("__"));

        let config = match builder.build() {
            Ok(built) => match built.try_deserialize() {
                Ok(config) => config,
                Err(e) => {
                    warn!("failed to deserialize configuration: {e}, using built-in defaults");
                    GenovecConfiguration::default()
                }
            },
            Err(e) => {
                warn!("failed to build configuration: {e}, using built-in defaults");
                GenovecConfiguration::default()
            }
        };

        let manager = Self {
            config,
            config_path: None,
        };
        manager.validate()?;
        Ok(manager)
    }

    /// Pure defaults, no file or environment lookup.
    pub fn new_with_defaults() -> Result<Self, ConfigurationError> {
        let manager = Self {
            config: GenovecConfiguration::default(),
            config_path: None,
        };
        manager.validate()?;
        Ok(manager)
    }

    /// Load from an explicit TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref().to_path_buf();
        let config: GenovecConfiguration = Config::builder()
            .add_source(File::from(path.as_path()))
            .build()?
            .try_deserialize()?;

        let manager = Self {
            config,
            config_path: Some(path),
        };
        manager.validate()?;
        Ok(manager)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        // Norm and mode strings must parse into their closed enums
        self.config
            .models
            .norm
            .parse::<crate::index::Norm>()
            .map(|_| ())?;
        self.config
            .models
            .mode
            .parse::<crate::model::Mode>()
            .map(|_| ())?;

        if self.config.search.topn == 0 {
            return Err(ConfigurationError::Validation {
                field: "search.topn".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.config.search.steps == 0 {
            return Err(ConfigurationError::Validation {
                field: "search.steps".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn config(&self) -> &GenovecConfiguration {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Install the global tracing subscriber per the logging section.
    /// A CLI verbose flag or `RUST_LOG` wins over the configured level.
    pub fn setup_logging(&self, verbose: bool) {
        use tracing_subscriber::EnvFilter;

        let level = if verbose {
            "debug"
        } else {
            &self.config.logging.level
        };
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr);

        let result = match self.config.logging.format.as_str() {
            "compact" => builder.compact().try_init(),
            _ => builder.without_time().with_target(false).try_init(),
        };
        if result.is_ok() {
            info!(
                "logging initialized (level: {level}, format: {})",
                self.config.logging.format
            );
        }
    }
}
