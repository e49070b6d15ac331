//! # Configuration Management
//!
//! Centralized configuration for the messaging core.
//!
//! This module provides structured configuration for channels and hubs,
//! including timeouts, message size limits, rate limits, and hub cleanup
//! behavior.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides
//!
//! ## Security Considerations
//! - Default message size limit (1 MiB) bounds memory per envelope
//! - Default rate limit (100 msg/s) is a caller-visible backpressure signal
//! - Origin checks require exact scheme+host+port matches; no wildcards

use crate::error::{ChannelError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default per-request response deadline
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Max allowed payload size (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Default outbound rate limit per channel (messages per second)
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Default interval between hub cleanup sweeps
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_millis(30_000);

/// Default staleness window before a silent client is evicted
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_millis(90_000);

/// How inbound envelopes are routed to per-client channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMode {
    /// One shared listener inspects each envelope's client identity and
    /// lazily creates the matching channel.
    #[default]
    Global,
    /// Channels are registered explicitly and the hub never creates them;
    /// useful for tests and hosts with per-client delivery.
    Individual,
}

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProtocolConfig {
    /// Per-channel protocol settings
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Hub (multi-client registry) settings
    #[serde(default)]
    pub hub: HubConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ProtocolConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ChannelError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ChannelError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ChannelError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Start with defaults
        let mut config = Self::default();

        // Override with environment variables
        if let Ok(timeout) = std::env::var("MESSAGE_CHANNEL_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.channel.default_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(size) = std::env::var("MESSAGE_CHANNEL_MAX_MESSAGE_SIZE") {
            if let Ok(val) = size.parse::<usize>() {
                config.channel.max_message_size = val;
            }
        }

        if let Ok(rate) = std::env::var("MESSAGE_CHANNEL_RATE_LIMIT") {
            if let Ok(val) = rate.parse::<u32>() {
                config.channel.rate_limit = val;
            }
        }

        if let Ok(origin) = std::env::var("MESSAGE_CHANNEL_EXPECTED_ORIGIN") {
            config.channel.expected_origin = Some(origin);
        }

        if let Ok(origin) = std::env::var("MESSAGE_CHANNEL_ORIGIN") {
            config.channel.origin = Some(origin);
        }

        if let Ok(interval) = std::env::var("MESSAGE_CHANNEL_CLEANUP_INTERVAL_MS") {
            if let Ok(val) = interval.parse::<u64>() {
                config.hub.cleanup_interval = Duration::from_millis(val);
            }
        }

        if let Ok(stale) = std::env::var("MESSAGE_CHANNEL_STALE_AFTER_MS") {
            if let Ok(val) = stale.parse::<u64>() {
                config.hub.stale_after = Duration::from_millis(val);
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ChannelError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ChannelError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        errors.extend(self.channel.validate());
        errors.extend(self.hub.validate());
        errors.extend(self.logging.validate());

        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ChannelError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Per-channel protocol settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Default deadline for a published request to receive its response
    #[serde(with = "duration_serde")]
    pub default_timeout: Duration,

    /// Maximum serialized payload size in bytes
    pub max_message_size: usize,

    /// Outbound messages allowed per second
    pub rate_limit: u32,

    /// Expected peer origin (exact scheme+host+port); unchecked when unset
    pub expected_origin: Option<String>,

    /// Origin declared on outbound envelopes
    pub origin: Option<String>,

    /// Whether inbound envelopes must carry the paired peer key once the
    /// readiness handshake has exchanged one
    pub require_peer_key: bool,

    /// Identity attached to outbound envelopes for hub routing
    pub client_id: Option<String>,

    /// Free-form application type announced in the readiness handshake
    pub app_type: Option<String>,

    /// Free-form application name announced in the readiness handshake
    pub app_name: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            rate_limit: DEFAULT_RATE_LIMIT,
            expected_origin: None,
            origin: None,
            require_peer_key: false,
            client_id: None,
            app_type: None,
            app_name: None,
        }
    }
}

impl ChannelConfig {
    /// Validate channel configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        // Validate timeout
        if self.default_timeout.as_millis() < 100 {
            errors.push("Request timeout too short (minimum: 100ms)".to_string());
        } else if self.default_timeout.as_secs() > 300 {
            errors.push("Request timeout too long (maximum: 300s)".to_string());
        }

        // Validate message size
        if self.max_message_size == 0 {
            errors.push("Max message size cannot be 0".to_string());
        } else if self.max_message_size > 100 * 1024 * 1024 {
            errors.push(format!(
                "Max message size too large: {} bytes (maximum recommended: 100 MB)",
                self.max_message_size
            ));
        }

        // Validate rate limit
        if self.rate_limit == 0 {
            errors.push("Rate limit must be greater than 0".to_string());
        } else if self.rate_limit > 100_000 {
            errors.push(format!(
                "Rate limit very high: {} msg/s (ensure the transport can keep up)",
                self.rate_limit
            ));
        }

        // Validate origin shapes
        for (label, origin) in [
            ("expected origin", &self.expected_origin),
            ("declared origin", &self.origin),
        ] {
            if let Some(origin) = origin {
                if origin.is_empty() {
                    errors.push(format!("The {label} cannot be empty when set"));
                } else if url::Url::parse(origin).is_err() {
                    errors.push(format!(
                        "Invalid {label}: '{origin}' (expected format: 'https://host:port')"
                    ));
                }
            }
        }

        errors
    }
}

/// Hub (multi-client registry) settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    /// Interval between stale-client cleanup sweeps
    #[serde(with = "duration_serde")]
    pub cleanup_interval: Duration,

    /// Maximum time a client may go unseen before eviction
    #[serde(with = "duration_serde")]
    pub stale_after: Duration,

    /// Inbound routing mode
    pub routing_mode: RoutingMode,

    /// Maximum number of tracked clients
    pub max_clients: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            routing_mode: RoutingMode::Global,
            max_clients: 1000,
        }
    }
}

impl HubConfig {
    /// Validate hub configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        // Validate cleanup interval
        if self.cleanup_interval.as_millis() < 10 {
            errors.push("Cleanup interval too short (minimum: 10ms)".to_string());
        } else if self.cleanup_interval.as_secs() > 3600 {
            errors.push("Cleanup interval too long (maximum: 1 hour)".to_string());
        }

        // Validate staleness window
        if self.stale_after < self.cleanup_interval {
            errors.push(
                "Staleness window must be at least as long as the cleanup interval".to_string(),
            );
        }

        // Validate max clients
        if self.max_clients == 0 {
            errors.push("Max clients must be greater than 0".to_string());
        } else if self.max_clients > 100_000 {
            errors.push(format!(
                "Max clients very high: {} (ensure system resources can support this)",
                self.max_clients
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("message-channel"),
            log_level: Level::INFO,
            log_to_console: true,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        // Validate app name
        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
