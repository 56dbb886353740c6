// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! OpenFlow physical topology discovery engine
//!
//! Learns which switch ports are wired to which by sending LLDP probes out
//! of every up port and watching where they come back in.
//!
//! # Components
//!
//! - **Probe Codec** ([`probe`]): LLDP probe frames, optionally carried in
//!   Ethernet-within-IP
//! - **Link Probe State Machine** ([`linkprobe`]): per-port probing driven by
//!   a deadline-ordered [`timer::TimerQueue`]
//! - **Forwarding Coordinator** ([`coordinator`]): registers event forwarding
//!   with every switch process before discovery starts
//! - **Discovery Controller** ([`controller`]): wires switch/port status and
//!   packet-in into the state machine and installs probe flow rules
//! - **Topology Store** ([`topology`]): switch / port / link table
//!
//! # Quick Start
//!
//! ```no_run
//! use ofdisco::{DiscoveryConfig, DiscoveryController, DiscoveryMetrics};
//! # use ofdisco::{FlowCommand, FlowProgrammer, FlowRule, PortKey, ProbeTransmitter};
//! # use ofdisco::TransportError;
//! # struct Bus;
//! # impl ProbeTransmitter for Bus {
//! #     fn transmit(&mut self, _: PortKey, _: Vec<u8>) -> Result<(), TransportError> { Ok(()) }
//! # }
//! # impl FlowProgrammer for Bus {
//! #     fn program(&mut self, _: u64, _: FlowCommand, _: &FlowRule) -> Result<(), TransportError> { Ok(()) }
//! # }
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! let metrics = Arc::new(DiscoveryMetrics::new());
//! let mut controller = DiscoveryController::new(
//!     DiscoveryConfig::default(),
//!     Box::new(Bus),
//!     Box::new(Bus),
//!     metrics,
//! );
//! controller.enable(Instant::now());
//! controller.tick(Instant::now());
//! for change in controller.drain_link_changes() {
//!     println!("{:?}", change);
//! }
//! ```

pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod flow;
pub mod linkprobe;
pub mod metrics;
pub mod probe;
pub mod timer;
pub mod topology;
pub mod transport;
pub mod types;
pub mod wire;

pub use config::{ConfigError, DiscoveryConfig, IpEncapsulation};
pub use controller::DiscoveryController;
pub use coordinator::{FanOutCallback, FanOutResult, ForwardOp, ForwardingCoordinator};
pub use error::{CodecError, CommitError, TransportError, WireError};
pub use flow::{FlowAction, FlowCommand, FlowMatch, FlowModRecord, FlowProgrammer, FlowRule};
pub use linkprobe::{
    LinkProbeFsm, LinkStatusSink, ProbeContext, ProbeEntry, ProbeEvent, ProbeState,
    ProbeTransmitter,
};
pub use metrics::{DiscoveryMetrics, MetricsSnapshot};
pub use probe::{ProbeCodec, ProbeMode};
pub use timer::TimerQueue;
pub use topology::{LinkTo, PortRecord, SwitchRecord, TopologyEvent, TopologyStore};
pub use transport::{switch_service_name, MessageTransport, Peer, RequestToken, TransactionId};
pub use types::{LinkStatus, MacAddr, PortKey, PortNo, SwitchId};
pub use wire::{
    EventForwardReply, EventForwardRequest, EventType, LinkStatusRecord, MessageType, OpResult,
    PacketRecord, PortStatusRecord, SwitchStatusRecord,
};
