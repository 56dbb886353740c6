// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery engine configuration.

use crate::types::MacAddr;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Ethernet-within-IP encapsulation of probe frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpEncapsulation {
    #[serde(default)]
    pub enabled: bool,

    /// Source address of the outer IPv4 header
    #[serde(default = "unspecified")]
    pub source: Ipv4Addr,

    /// Destination address of the outer IPv4 header
    #[serde(default = "unspecified")]
    pub destination: Ipv4Addr,
}

fn unspecified() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

impl Default for IpEncapsulation {
    fn default() -> Self {
        Self {
            enabled: false,
            source: unspecified(),
            destination: unspecified(),
        }
    }
}

/// Discovery engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Destination MAC of probe frames (default: LLDP nearest-bridge group)
    #[serde(default = "default_probe_destination")]
    pub probe_destination: MacAddr,

    /// Optional IP encapsulation of probe frames
    #[serde(default)]
    pub ip_encapsulation: IpEncapsulation,

    /// Keep discovery running regardless of disable requests
    #[serde(default)]
    pub always_on: bool,

    /// Per-switch timeout of forwarding registration requests (ms)
    #[serde(default = "default_peer_timeout")]
    pub peer_timeout_ms: u64,

    /// Probe timer tick period (ms)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Name this controller registers for event forwarding
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Name of the process that enumerates switch processes
    #[serde(default = "default_fleet_manager")]
    pub fleet_manager: String,
}

fn default_probe_destination() -> MacAddr {
    MacAddr::LLDP_MULTICAST
}

fn default_peer_timeout() -> u64 {
    5000
}

fn default_tick_interval() -> u64 {
    500
}

fn default_service_name() -> String {
    "topology".to_string()
}

fn default_fleet_manager() -> String {
    "switch_manager".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_destination: default_probe_destination(),
            ip_encapsulation: IpEncapsulation::default(),
            always_on: false,
            peer_timeout_ms: default_peer_timeout(),
            tick_interval_ms: default_tick_interval(),
            service_name: default_service_name(),
            fleet_manager: default_fleet_manager(),
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_millis(self.peer_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peer_timeout_ms == 0 {
            return Err(ConfigError::Invalid("peer_timeout_ms cannot be 0".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms cannot be 0".into()));
        }
        if !self.probe_destination.is_multicast() {
            return Err(ConfigError::Invalid(format!(
                "probe_destination {} is not a group address",
                self.probe_destination
            )));
        }
        if self.service_name.is_empty() || self.service_name.contains('\0') {
            return Err(ConfigError::Invalid("service_name is empty or has NUL".into()));
        }
        if self.fleet_manager.is_empty() {
            return Err(ConfigError::Invalid("fleet_manager cannot be empty".into()));
        }
        let encap = &self.ip_encapsulation;
        if encap.enabled && (encap.source.is_unspecified() || encap.destination.is_unspecified()) {
            return Err(ConfigError::Invalid(
                "ip_encapsulation requires source and destination addresses".into(),
            ));
        }
        Ok(())
    }
}
