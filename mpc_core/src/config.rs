// Configuration Module
// ====================
// Engine options read from a `key: value` config file. Recognized keys:
// `my_id`, `parties` and `log_level`; missing keys fall back to defaults.

use std::str::FromStr;

use log::LevelFilter;

use helpers::read_config::read_config;

use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// This party's 0-based index.
    pub my_id: usize,
    /// Number of parties in the session.
    pub parties: usize,
    /// Filter threshold for the logger.
    pub log_level: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            my_id: 0,
            parties: 3,
            log_level: LevelFilter::Info,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let mut config = Config::default();
        if let Some(value) = read_config(path, "my_id") {
            config.my_id = value.parse().map_err(|_| {
                EngineError::InvalidArgument(format!("invalid my_id '{value}'"))
            })?;
        }
        if let Some(value) = read_config(path, "parties") {
            config.parties = value.parse().map_err(|_| {
                EngineError::InvalidArgument(format!("invalid party count '{value}'"))
            })?;
        }
        if let Some(value) = read_config(path, "log_level") {
            config.log_level = LevelFilter::from_str(&value).map_err(|_| {
                EngineError::InvalidArgument(format!("invalid log level '{value}'"))
            })?;
        }
        if config.parties < 2 {
            return Err(EngineError::InvalidArgument(format!(
                "need at least two parties, got {}",
                config.parties
            )));
        }
        if config.my_id >= config.parties {
            return Err(EngineError::InvalidArgument(format!(
                "my_id {} out of range for {} parties",
                config.my_id, config.parties
            )));
        }
        Ok(config)
    }
}
