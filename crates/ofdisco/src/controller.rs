// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery controller.
//!
//! Feeds switch/port status, received probes and timer ticks into the link
//! probe state machine, and installs the flow rules that bring probes back
//! to the controller. Link changes computed by the topology store are
//! collected for publication with [`DiscoveryController::drain_link_changes`].

use crate::config::DiscoveryConfig;
use crate::flow::{discovery_rules, FlowCommand, FlowProgrammer};
use crate::linkprobe::{LinkProbeFsm, ProbeContext, ProbeTransmitter};
use crate::metrics::DiscoveryMetrics;
use crate::probe::ProbeCodec;
use crate::topology::{TopologyEvent, TopologyStore};
use crate::types::{MacAddr, PortKey, SwitchId};
use crate::wire::{LinkStatusRecord, PacketRecord, PortStatusRecord, SwitchStatusRecord};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

pub struct DiscoveryController {
    config: DiscoveryConfig,
    fsm: LinkProbeFsm,
    store: TopologyStore,
    transmitter: Box<dyn ProbeTransmitter>,
    flows: Box<dyn FlowProgrammer>,
    enabled: bool,
    /// Status changes drive the state machine.
    hooks_installed: bool,
    /// Packet-in is inspected for probes.
    packet_in: bool,
    link_changes: Vec<LinkStatusRecord>,
    metrics: Arc<DiscoveryMetrics>,
}

impl DiscoveryController {
    pub fn new(
        config: DiscoveryConfig,
        transmitter: Box<dyn ProbeTransmitter>,
        flows: Box<dyn FlowProgrammer>,
        metrics: Arc<DiscoveryMetrics>,
    ) -> Self {
        let fsm = LinkProbeFsm::new(ProbeCodec::from_config(&config), Arc::clone(&metrics));
        Self::with_fsm(config, fsm, transmitter, flows, metrics)
    }

    /// Build around an existing state machine (seeded RNG in tests).
    pub fn with_fsm(
        config: DiscoveryConfig,
        fsm: LinkProbeFsm,
        transmitter: Box<dyn ProbeTransmitter>,
        flows: Box<dyn FlowProgrammer>,
        metrics: Arc<DiscoveryMetrics>,
    ) -> Self {
        Self {
            config,
            fsm,
            store: TopologyStore::new(),
            transmitter,
            flows,
            enabled: false,
            hooks_installed: false,
            packet_in: false,
            link_changes: Vec::new(),
            metrics,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    pub fn topology(&self) -> &TopologyStore {
        &self.store
    }

    pub fn probes(&self) -> &LinkProbeFsm {
        &self.fsm
    }

    pub fn metrics(&self) -> &Arc<DiscoveryMetrics> {
        &self.metrics
    }

    /// Start discovery on every known switch and up port.
    ///
    /// Enabling twice resends flow rules but never duplicates probe entries.
    /// The drop-all rule stays installed for the whole session, through every
    /// re-probe round, until [`disable`](Self::disable) deletes it.
    pub fn enable(&mut self, now: Instant) {
        if self.enabled {
            warn!("discovery already enabled");
        }
        self.enabled = true;

        let switches: Vec<SwitchId> = self.store.switches().map(|sw| sw.id).collect();
        for switch in &switches {
            self.program_rules(*switch, FlowCommand::Add);
        }
        self.packet_in = true;
        self.hooks_installed = true;

        let ports: Vec<(PortKey, MacAddr)> = self
            .store
            .ports()
            .filter(|port| port.up)
            .map(|port| (port.key, port.mac))
            .collect();
        let mut ctx = ProbeContext {
            transmitter: self.transmitter.as_mut(),
            sink: &mut self.store,
        };
        for (key, mac) in &ports {
            self.fsm.port_up(*key, *mac, now, &mut ctx);
        }
        info!(
            switches = switches.len(),
            ports = ports.len(),
            "discovery enabled"
        );
        self.dispatch_topology_events(now);
    }

    /// Stop discovery and remove its flow rules. Ignored when always-on.
    pub fn disable(&mut self) {
        if self.config.always_on {
            info!("always-on discovery ignores disable");
            return;
        }
        if !self.enabled {
            warn!("discovery is not enabled");
            return;
        }

        let switches: Vec<SwitchId> = self.store.switches().map(|sw| sw.id).collect();
        for switch in switches {
            self.program_rules(switch, FlowCommand::Delete);
        }
        self.packet_in = false;
        self.hooks_installed = false;
        self.fsm.clear();
        self.enabled = false;
        info!("discovery disabled");
    }

    pub fn switch_status(&mut self, record: &SwitchStatusRecord, now: Instant) {
        debug!(switch = record.switch, up = record.up, "switch status");
        self.store.update_switch(record.switch, record.up);
        self.dispatch_topology_events(now);
    }

    pub fn port_status(&mut self, record: &PortStatusRecord, now: Instant) {
        let key = PortKey::new(record.switch, record.port);
        let result = if record.removed {
            self.store.remove_port(key)
        } else {
            self.store
                .update_port(key, &record.name, record.mac, record.up)
        };
        if let Err(err) = result {
            debug!(port = %key, error = %err, "port status dropped");
        }
        self.dispatch_topology_events(now);
    }

    /// Apply a link-status update record sent by another process.
    pub fn link_status_update(&mut self, payload: &[u8], now: Instant) {
        let record = match LinkStatusRecord::decode(payload) {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, "malformed link status update");
                return;
            }
        };
        if let Err(err) = self.store.apply_link_status(&record) {
            debug!(port = %record.from_port_key(), error = %err, "link status update dropped");
        }
        self.dispatch_topology_events(now);
    }

    pub fn packet_in(&mut self, record: &PacketRecord, now: Instant) {
        let local = PortKey::new(record.switch, record.port);
        if !self.packet_in {
            trace!(port = %local, "packet-in while discovery disabled");
            return;
        }
        let codec = self.fsm.codec();
        if !codec.is_probe(&record.data) {
            debug!(port = %local, len = record.data.len(), "non-probe packet-in ignored");
            return;
        }
        let peer = match codec.decode(&record.data) {
            Ok(peer) => peer,
            Err(err) => {
                DiscoveryMetrics::incr(&self.metrics.decode_errors);
                warn!(port = %local, error = %err, "malformed probe");
                return;
            }
        };
        DiscoveryMetrics::incr(&self.metrics.probes_received);
        if self.fsm.entry(local).is_none() {
            debug!(port = %local, peer = %peer, "probe on untracked port");
            return;
        }

        let mut ctx = ProbeContext {
            transmitter: self.transmitter.as_mut(),
            sink: &mut self.store,
        };
        self.fsm.received_probe(local, peer, now, &mut ctx);
        self.dispatch_topology_events(now);
    }

    /// Fire expired probe timers.
    pub fn tick(&mut self, now: Instant) -> usize {
        let mut ctx = ProbeContext {
            transmitter: self.transmitter.as_mut(),
            sink: &mut self.store,
        };
        let fired = self.fsm.tick(now, &mut ctx);
        self.dispatch_topology_events(now);
        fired
    }

    /// Take link changes not yet published.
    pub fn drain_link_changes(&mut self) -> Vec<LinkStatusRecord> {
        std::mem::take(&mut self.link_changes)
    }

    fn dispatch_topology_events(&mut self, now: Instant) {
        loop {
            let events = self.store.drain_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                self.on_topology_event(event, now);
            }
        }
    }

    fn on_topology_event(&mut self, event: TopologyEvent, now: Instant) {
        if let TopologyEvent::Link(record) = event {
            self.link_changes.push(record);
            return;
        }
        if !self.hooks_installed {
            return;
        }

        match event {
            TopologyEvent::SwitchUp(switch) => self.program_rules(switch, FlowCommand::Add),
            TopologyEvent::SwitchDown(switch) => {
                let removed = self.fsm.remove_switch(switch);
                debug!(switch, removed, "switch probe entries dropped");
            }
            TopologyEvent::PortUp { key, mac } => {
                let mut ctx = ProbeContext {
                    transmitter: self.transmitter.as_mut(),
                    sink: &mut self.store,
                };
                self.fsm.port_up(key, mac, now, &mut ctx);
            }
            TopologyEvent::PortDown(key) => {
                let mut ctx = ProbeContext {
                    transmitter: self.transmitter.as_mut(),
                    sink: &mut self.store,
                };
                self.fsm.port_down(key, now, &mut ctx);
            }
            TopologyEvent::PortExternal { key, external } => {
                trace!(port = %key, external, "port external flag changed");
            }
            TopologyEvent::Link(_) => {}
        }
    }

    fn program_rules(&mut self, switch: SwitchId, command: FlowCommand) {
        for rule in discovery_rules(self.fsm.codec()) {
            if let Err(err) = self.flows.program(switch, command, &rule) {
                warn!(switch, ?command, error = %err, "flow rule not programmed");
            }
        }
    }
}
