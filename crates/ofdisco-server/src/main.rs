// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topology discovery daemon
//!
//! Connects to the controller message bus, registers for packet-in and
//! port-status forwarding on every switch process, then probes every up
//! port and publishes link status changes.
//!
//! # Usage
//!
//! ```bash
//! # Bus on localhost, defaults everywhere
//! ofdisco-server
//!
//! # Publish links to a routing service, never stop probing
//! ofdisco-server --bus 10.0.0.5:7600 --subscribers routing --always-on
//!
//! # Carry probes inside Ethernet-within-IP
//! ofdisco-server --ip-encap-src 10.0.0.1 --ip-encap-dst 10.0.0.2
//!
//! # Write an example configuration
//! ofdisco-server gen-config --output ofdisco.json
//! ```

use clap::{Parser, Subcommand};
use ofdisco::MacAddr;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod server;

pub use config::ServerConfig;

/// OpenFlow topology discovery daemon
#[derive(Parser, Debug)]
#[command(name = "ofdisco-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (JSON format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Message bus address
    #[arg(short, long)]
    bus: Option<SocketAddr>,

    /// Service name registered for event forwarding
    #[arg(long)]
    service_name: Option<String>,

    /// Services that receive link status (comma-separated)
    #[arg(short, long, value_delimiter = ',')]
    subscribers: Option<Vec<String>>,

    /// Keep probing even when asked to disable
    #[arg(long)]
    always_on: bool,

    /// Destination MAC of probe frames
    #[arg(long)]
    probe_destination: Option<MacAddr>,

    /// Outer IPv4 source when carrying probes in Ethernet-within-IP
    #[arg(long, requires = "ip_encap_dst")]
    ip_encap_src: Option<Ipv4Addr>,

    /// Outer IPv4 destination when carrying probes in Ethernet-within-IP
    #[arg(long, requires = "ip_encap_src")]
    ip_encap_dst: Option<Ipv4Addr>,

    /// Statistics reporting interval (seconds, 0 to disable)
    #[arg(long)]
    stats_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "ofdisco.json")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;

    info!("+----------------------------------------------------+");
    info!(
        "|       OpenFlow Topology Discovery v{}           |",
        env!("CARGO_PKG_VERSION")
    );
    info!("+----------------------------------------------------+");
    info!("|  Bus:      {:38} |", config.bus_address);
    info!("|  Service:  {:38} |", config.discovery.service_name);
    info!(
        "|  Probes:   {:38} |",
        if config.discovery.ip_encapsulation.enabled {
            "ethernet-within-ip"
        } else {
            "ethernet"
        }
    );
    info!(
        "|  Mode:     {:38} |",
        if config.discovery.always_on {
            "always-on"
        } else {
            "on demand"
        }
    );
    info!("|  Notify:   {:38} |", config.subscribers.join(","));
    info!("+----------------------------------------------------+");

    let shutdown = Arc::new(Notify::new());
    let signal = Arc::clone(&shutdown);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received, stopping discovery...");
        signal.notify_one();
    });

    server::serve(config, shutdown).await?;

    info!("Discovery daemon stopped");
    Ok(())
}

fn build_config(args: &Args) -> Result<ServerConfig, ofdisco::ConfigError> {
    let mut config = match args.config {
        Some(ref path) => {
            info!("Loading config from {:?}", path);
            ServerConfig::from_file(path)?
        }
        None => ServerConfig::default(),
    };

    // Command line wins over the file
    if let Some(bus) = args.bus {
        config.bus_address = bus;
    }
    if let Some(ref name) = args.service_name {
        config.discovery.service_name = name.clone();
    }
    if let Some(ref subscribers) = args.subscribers {
        config.subscribers = subscribers.clone();
    }
    if args.always_on {
        config.discovery.always_on = true;
    }
    if let Some(mac) = args.probe_destination {
        config.discovery.probe_destination = mac;
    }
    if let (Some(source), Some(destination)) = (args.ip_encap_src, args.ip_encap_dst) {
        config.discovery.ip_encapsulation.enabled = true;
        config.discovery.ip_encapsulation.source = source;
        config.discovery.ip_encapsulation.destination = destination;
    }
    if let Some(secs) = args.stats_interval {
        config.stats_interval_secs = secs;
    }

    config.validate()?;
    Ok(config)
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();
    config.subscribers = vec!["routing".to_string()];
    config.to_file(&output)?;
    println!("Generated configuration: {}", output.display());
    Ok(())
}

fn cmd_validate(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_file(&path)?;
    println!("Configuration is valid: {}", path.display());
    println!("  Bus:         {}", config.bus_address);
    println!("  Service:     {}", config.discovery.service_name);
    println!("  Subscribers: {}", config.subscribers.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_defaults() {
        let args = Args::parse_from([
            "ofdisco-server",
            "--bus",
            "10.1.1.1:7700",
            "--subscribers",
            "routing,monitor",
            "--always-on",
            "--ip-encap-src",
            "10.0.0.1",
            "--ip-encap-dst",
            "10.0.0.2",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.bus_address.port(), 7700);
        assert_eq!(config.subscribers.len(), 2);
        assert!(config.discovery.always_on);
        assert!(config.discovery.ip_encapsulation.enabled);
    }

    #[test]
    fn test_ip_encap_needs_both_ends() {
        let result = Args::try_parse_from(["ofdisco-server", "--ip-encap-src", "10.0.0.1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unicast_probe_destination_rejected() {
        let args = Args::parse_from([
            "ofdisco-server",
            "--probe-destination",
            "00:11:22:33:44:55",
        ]);
        assert!(build_config(&args).is_err());
    }

    #[test]
    fn test_gen_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ofdisco.json");
        cmd_gen_config(path.clone()).unwrap();
        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.subscribers, vec!["routing".to_string()]);
    }
}
