//! Configuration management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{ensure, Result};
use serde::Deserialize;

use crate::model::DeviceModel;
use crate::protocol::DEFAULT_PORT;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub device: Option<DeviceConfig>,
}

/// Per-device connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Known model; skips waiting for `DEVICE?` to pick a capability set
    #[serde(default)]
    pub model: Option<DeviceModel>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Idle time before a keep-alive query is sent
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_command_timeout_ms() -> u64 {
    2000
}

fn default_monitor_interval_secs() -> u64 {
    90
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            model: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            monitor_interval_secs: default_monitor_interval_secs(),
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_model(mut self, model: DeviceModel) -> Self {
        self.model = Some(model);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings that would stall or spin the connection loops.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.host.trim().is_empty(), "device.host must not be empty");
        ensure!(self.connect_timeout_ms > 0, "device.connect_timeout_ms must be positive");
        ensure!(self.command_timeout_ms > 0, "device.command_timeout_ms must be positive");
        ensure!(
            self.monitor_interval_secs > 0,
            "device.monitor_interval_secs must be positive"
        );
        ensure!(
            self.reconnect.initial_delay_ms > 0,
            "device.reconnect.initial_delay_ms must be positive"
        );
        ensure!(
            self.reconnect.max_delay_ms >= self.reconnect.initial_delay_ms,
            "device.reconnect.max_delay_ms must not be below initial_delay_ms"
        );
        Ok(())
    }
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Backoff doubles up to this delay and stays there
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Consecutive failures before the device is reported unavailable
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    10
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ReconnectConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Get config directory (LYNGDORF_CONFIG_DIR, XDG_CONFIG_HOME or platform default)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("LYNGDORF_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library/Application Support/lyngdorf-control");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join("lyngdorf-control");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config/lyngdorf-control");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("lyngdorf-control");
        }
    }

    PathBuf::from(".")
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let mut builder = ::config::Config::builder()
        // config.toml / config.json / config.yaml, whichever exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        // LYNGDORF_DEVICE__HOST, LYNGDORF_DEVICE__RECONNECT__MAX_ATTEMPTS, ...
        .add_source(
            ::config::Environment::with_prefix("LYNGDORF")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    // Short forms take precedence over everything else
    if let Ok(host) = std::env::var("LYNGDORF_HOST") {
        builder = builder.set_override("device.host", host)?;
    }
    if let Ok(port) = std::env::var("LYNGDORF_PORT") {
        if let Ok(port_num) = port.parse::<u16>() {
            builder = builder.set_override("device.port", port_num as i64)?;
        }
    }

    let config: Config = builder.build()?.try_deserialize()?;
    if let Some(device) = &config.device {
        device.validate()?;
    }

    Ok(config)
}
