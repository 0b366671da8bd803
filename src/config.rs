//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, RfspyError};
use crate::rpc::protocol::{USB_RX_WAIT_MS, USB_TX_WAIT_MS};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub usb: UsbConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// USB transport configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UsbConfig {
    #[serde(default = "default_rx_timeout_ms")]
    pub rx_timeout_ms: u64,

    #[serde(default = "default_tx_timeout_ms")]
    pub tx_timeout_ms: u64,

    /// Device resets allowed while locating endpoints
    #[serde(default = "default_reset_tries")]
    pub reset_tries: u32,

    #[serde(default)]
    pub reset_on_exit: bool,
}

/// RPC behaviour
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RpcConfig {
    /// Reject responses with length or echo mismatches
    #[serde(default)]
    pub strict: bool,
}

/// Which dongle to open
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeviceConfig {
    /// Position in address order, used when bus/address are not given
    #[serde(default)]
    pub index: usize,

    #[serde(default)]
    pub bus: Option<u8>,

    #[serde(default)]
    pub address: Option<u8>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write a daily-rotated log file here
    #[serde(default)]
    pub directory: Option<String>,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            rx_timeout_ms: default_rx_timeout_ms(),
            tx_timeout_ms: default_tx_timeout_ms(),
            reset_tries: default_reset_tries(),
            reset_on_exit: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

// Default value functions
fn default_rx_timeout_ms() -> u64 { USB_RX_WAIT_MS }
fn default_tx_timeout_ms() -> u64 { USB_TX_WAIT_MS }
fn default_reset_tries() -> u32 { 5 }
fn default_log_level() -> String { "info".to_string() }

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn invalid(msg: &str) -> RfspyError {
    RfspyError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rfspy::config::Config;
    ///
    /// let config = Config::load("rfspy.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.usb.rx_timeout_ms == 0 || self.usb.rx_timeout_ms > 60000 {
            return Err(invalid("rx_timeout_ms must be between 1 and 60000"));
        }

        if self.usb.tx_timeout_ms == 0 || self.usb.tx_timeout_ms > 60000 {
            return Err(invalid("tx_timeout_ms must be between 1 and 60000"));
        }

        if self.usb.reset_tries > 20 {
            return Err(invalid("reset_tries must be at most 20"));
        }

        if self.device.bus.is_some() != self.device.address.is_some() {
            return Err(invalid("device bus and address must be given together"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        if let Some(directory) = &self.logging.directory {
            if directory.is_empty() {
                return Err(invalid("logging directory cannot be empty when set"));
            }
        }

        Ok(())
    }
}
