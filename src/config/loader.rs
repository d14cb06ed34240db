//! Configuration loading from disk and the command line.

use std::fs;
use std::path::Path;

use crate::config::cli::Cli;
use crate::config::schema::StunCheckConfig;
use crate::config::validation::{clamp_config, validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Parse a TOML configuration file. Values are not yet clamped or validated.
pub fn load_config(path: &Path) -> Result<StunCheckConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Build the effective configuration: defaults, then the optional file,
/// then environment and flags (merged by clap), then clamping and validation.
pub fn resolve_config(cli: &Cli) -> Result<StunCheckConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => StunCheckConfig::default(),
    };

    cli.apply(&mut config);
    clamp_config(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
