// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Daemon configuration.

use ofdisco::{ConfigError, DiscoveryConfig};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Message bus endpoint (default: 127.0.0.1:7600)
    #[serde(default = "default_bus_address")]
    pub bus_address: SocketAddr,

    /// Services that receive link status notifications
    #[serde(default)]
    pub subscribers: Vec<String>,

    /// Maximum bus frame size (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Statistics reporting interval (seconds, 0 to disable)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Discovery engine settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

fn default_bus_address() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 7600))
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1 MB
}

fn default_stats_interval() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bus_address: default_bus_address(),
            subscribers: Vec::new(),
            max_message_size: default_max_message_size(),
            stats_interval_secs: default_stats_interval(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size < 1024 {
            return Err(ConfigError::Invalid(
                "max_message_size must be at least 1024".into(),
            ));
        }
        if let Some(name) = self.subscribers.iter().find(|name| name.is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "subscriber name {:?} is empty",
                name
            )));
        }
        self.discovery.validate()
    }
}
