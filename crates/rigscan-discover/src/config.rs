//! Configuration for fleet discovery.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{DiscoverError, Result};

/// Top-level discover configuration.
///
/// Loaded from `rigscan.toml` `[discover]` section or
/// `RIGSCAN_DISCOVER__` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// Management API port (default: 4028).
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Ports tried once each when the API port refuses connections.
    #[serde(default = "default_fallback_ports")]
    pub fallback_ports: Vec<u16>,

    /// Connect attempts per address during a scan.
    #[serde(default = "default_retries")]
    pub ping_retries: u32,

    /// Timeout for a single reachability attempt, in seconds.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_secs: u64,

    /// Addresses probed concurrently.
    #[serde(default = "default_concurrency")]
    pub scan_concurrency: usize,

    /// Classification attempts per address.
    #[serde(default = "default_retries")]
    pub identify_retries: u32,

    /// Timeout for one classification attempt, in seconds.
    #[serde(default = "default_identify_timeout")]
    pub identify_timeout_secs: u64,

    /// Per-command transport timeout, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Devices receiving a bulk command or configuration push at once.
    #[serde(default = "default_concurrency")]
    pub config_concurrency: usize,

    /// Admin password for BTMiner privileged commands.
    #[serde(default = "default_password")]
    pub btminer_password: String,

    #[serde(default)]
    pub shell: ShellConfig,

    /// UDP bind address for IP-report announcements.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

/// Credentials for the privileged shell channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_shell_user")]
    pub user: String,

    #[serde(default = "default_password")]
    pub password: String,

    #[serde(default = "default_shell_port")]
    pub port: u16,
}

impl DiscoverConfig {
    /// Load the `[discover]` section from `<file_prefix>.{toml,yaml,json}`
    /// and the environment, falling back to defaults when it is absent.
    pub fn load(file_prefix: &str) -> Result<Self> {
        let cfg = ::config::Config::builder()
            .add_source(::config::File::with_name(file_prefix).required(false))
            .add_source(
                ::config::Environment::with_prefix("RIGSCAN_DISCOVER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DiscoverError::Config(e.to_string()))?;

        match cfg.get::<DiscoverConfig>("discover") {
            Ok(c) => Ok(c),
            Err(_) => Ok(DiscoverConfig::default()),
        }
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn identify_timeout(&self) -> Duration {
        Duration::from_secs(self.identify_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

fn default_api_port() -> u16 {
    rigscan_api::DEFAULT_PORT
}

fn default_fallback_ports() -> Vec<u16> {
    vec![4029, 8889]
}

fn default_retries() -> u32 {
    3
}

fn default_ping_timeout() -> u64 {
    5
}

fn default_concurrency() -> usize {
    300
}

fn default_identify_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    10
}

fn default_password() -> String {
    "admin".to_string()
}

fn default_shell_user() -> String {
    "root".to_string()
}

fn default_shell_port() -> u16 {
    22
}

fn default_listen_addr() -> String {
    "0.0.0.0:14235".to_string()
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            user: default_shell_user(),
            password: default_password(),
            port: default_shell_port(),
        }
    }
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            fallback_ports: default_fallback_ports(),
            ping_retries: default_retries(),
            ping_timeout_secs: default_ping_timeout(),
            scan_concurrency: default_concurrency(),
            identify_retries: default_retries(),
            identify_timeout_secs: default_identify_timeout(),
            command_timeout_secs: default_command_timeout(),
            config_concurrency: default_concurrency(),
            btminer_password: default_password(),
            shell: ShellConfig::default(),
            listen_addr: default_listen_addr(),
        }
    }
}
