//! Gateway configuration
//!
//! Loaded from an optional TOML file, overridden by command line flags, and
//! validated before any server state is built.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;

use crate::session::DEFAULT_QUEUE_CAPACITY;

/// Errors that can occur while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid port: {0}")]
    InvalidPort(u16),
    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),
    #[error("{name} must be at least 1")]
    Zero { name: &'static str },
    #[error("Invalid {name} length range: min {min} is greater than max {max}")]
    InvalidNameRange {
        name: &'static str,
        min: usize,
        max: usize,
    },
}

/// Runtime configuration of the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Address to bind to
    pub bind: String,
    /// Port to listen on
    pub port: u16,
    /// Log verbosity (trace, debug, info, warn, error)
    pub log_level: String,
    /// Max number of concurrent WebSocket sessions
    pub max_ws_connections: usize,
    /// WebSocket read buffer size in bytes
    pub ws_read_buffer_size: usize,
    /// WebSocket write buffer size in bytes
    pub ws_write_buffer_size: usize,
    /// Frames buffered between a session's reader and writer
    pub queue_capacity: usize,
    pub min_game_name_length: usize,
    pub max_game_name_length: usize,
    pub min_player_name_length: usize,
    pub max_player_name_length: usize,
    /// Seconds to wait for open sessions on shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            max_ws_connections: 256,
            ws_read_buffer_size: 64 * 1024,
            ws_write_buffer_size: 64 * 1024,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            min_game_name_length: 2,
            max_game_name_length: 15,
            min_player_name_length: 2,
            max_player_name_length: 15,
            shutdown_timeout_secs: 10,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a TOML file; missing fields keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: GatewayConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Check every field before the server is constructed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        self.level()?;
        for (name, value) in [
            ("max_ws_connections", self.max_ws_connections),
            ("ws_read_buffer_size", self.ws_read_buffer_size),
            ("ws_write_buffer_size", self.ws_write_buffer_size),
            ("queue_capacity", self.queue_capacity),
            ("min_game_name_length", self.min_game_name_length),
            ("min_player_name_length", self.min_player_name_length),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { name });
            }
        }
        check_range("game name", self.min_game_name_length, self.max_game_name_length)?;
        check_range(
            "player name",
            self.min_player_name_length,
            self.max_player_name_length,
        )?;
        Ok(())
    }

    /// Parsed log level
    pub fn level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn check_range(name: &'static str, min: usize, max: usize) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::InvalidNameRange { name, min, max });
    }
    Ok(())
}
