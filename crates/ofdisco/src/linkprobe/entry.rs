// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::types::{MacAddr, PortKey};
use std::time::Instant;

/// Discovery state of one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeState {
    /// No entry (port down, removed, or never seen).
    Inactive,
    /// Waiting a random delay before the first probe.
    SendDelay,
    /// Probe sent, waiting for it to come back on a neighbor.
    Wait,
    /// Neighbor decided (link up, unstable, or none).
    Confirmed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvent {
    PortUp { mac: MacAddr },
    PortDown,
    Timeout,
    /// A probe sent by `peer` arrived on this port.
    ReceivedProbe(PortKey),
}

/// Probe bookkeeping for one (switch, port).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeEntry {
    pub key: PortKey,
    pub mac: MacAddr,
    pub state: ProbeState,
    pub retry_count: u32,
    pub expires_at: Instant,
    pub link_up: bool,
    /// Last confirmed neighbor.
    pub peer: Option<PortKey>,
    /// Neighbor state may be stale; re-probe at the next confirmation tick.
    pub dirty: bool,
}

impl ProbeEntry {
    pub(crate) fn new(key: PortKey, mac: MacAddr, now: Instant) -> Self {
        Self {
            key,
            mac,
            state: ProbeState::Inactive,
            retry_count: 0,
            expires_at: now,
            link_up: false,
            peer: None,
            dirty: false,
        }
    }
}
