// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Flow rules installed while discovery runs.
//!
//! Two rules per switch: probes go to the controller at high priority, and
//! everything else is dropped at the lowest priority.
//!
//! ```text
//! FlowModRecord (24B)
//! +----------+-----+--------+----------+-------+-----+---------+--------+--------+
//! | switch 8 | cmd | action | priority | match | pad | dl_type | nw_src | nw_dst |
//! +----------+-----+--------+----------+-------+-----+---------+--------+--------+
//! ```

use crate::error::{TransportError, WireError};
use crate::probe::{ProbeCodec, ProbeMode, ETHERTYPE_IPV4, ETHERTYPE_LLDP};
use crate::types::SwitchId;
use std::net::Ipv4Addr;

pub const PROBE_REDIRECT_PRIORITY: u16 = 0xffff;
pub const DROP_ALL_PRIORITY: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowMatch {
    /// Any frame.
    Any,
    EtherType(u16),
    /// IPv4 protocol 97 between the two endpoints.
    EtherIp {
        source: Ipv4Addr,
        destination: Ipv4Addr,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    ToController,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowRule {
    pub priority: u16,
    pub matcher: FlowMatch,
    pub action: FlowAction,
}

impl FlowRule {
    /// Redirect probe frames of `codec`'s framing to the controller.
    pub fn probe_redirect(codec: &ProbeCodec) -> Self {
        let matcher = match codec.mode() {
            ProbeMode::Ethernet => FlowMatch::EtherType(ETHERTYPE_LLDP),
            ProbeMode::EtherIp {
                source,
                destination,
            } => FlowMatch::EtherIp {
                source,
                destination,
            },
        };
        Self {
            priority: PROBE_REDIRECT_PRIORITY,
            matcher,
            action: FlowAction::ToController,
        }
    }

    pub fn drop_all() -> Self {
        Self {
            priority: DROP_ALL_PRIORITY,
            matcher: FlowMatch::Any,
            action: FlowAction::Drop,
        }
    }
}

/// Rules installed on every switch while discovery is enabled.
pub fn discovery_rules(codec: &ProbeCodec) -> [FlowRule; 2] {
    [FlowRule::probe_redirect(codec), FlowRule::drop_all()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlowCommand {
    Add = 0,
    Delete = 1,
}

/// Pushes flow table modifications to a switch.
pub trait FlowProgrammer {
    fn program(
        &mut self,
        switch: SwitchId,
        command: FlowCommand,
        rule: &FlowRule,
    ) -> Result<(), TransportError>;
}

const MATCH_ANY: u8 = 0;
const MATCH_ETHERTYPE: u8 = 1;
const MATCH_ETHERIP: u8 = 2;

/// Flow modification sent to a switch process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowModRecord {
    pub switch: SwitchId,
    pub command: FlowCommand,
    pub rule: FlowRule,
}

impl FlowModRecord {
    pub const LEN: usize = 24;
    const NAME: &'static str = "flow mod";

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        buf[0..8].copy_from_slice(&self.switch.to_be_bytes());
        buf[8] = self.command as u8;
        buf[9] = match self.rule.action {
            FlowAction::ToController => 0,
            FlowAction::Drop => 1,
        };
        buf[10..12].copy_from_slice(&self.rule.priority.to_be_bytes());
        match self.rule.matcher {
            FlowMatch::Any => buf[12] = MATCH_ANY,
            FlowMatch::EtherType(ty) => {
                buf[12] = MATCH_ETHERTYPE;
                buf[14..16].copy_from_slice(&ty.to_be_bytes());
            }
            FlowMatch::EtherIp {
                source,
                destination,
            } => {
                buf[12] = MATCH_ETHERIP;
                buf[14..16].copy_from_slice(&ETHERTYPE_IPV4.to_be_bytes());
                buf[16..20].copy_from_slice(&source.octets());
                buf[20..24].copy_from_slice(&destination.octets());
            }
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() != Self::LEN {
            return Err(WireError::Length {
                record: Self::NAME,
                expected: Self::LEN,
                actual: buf.len(),
            });
        }
        let field = |field: &'static str, value: u8| WireError::Field {
            record: Self::NAME,
            field,
            value: u64::from(value),
        };
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&buf[0..8]);
        let command = match buf[8] {
            0 => FlowCommand::Add,
            1 => FlowCommand::Delete,
            other => return Err(field("command", other)),
        };
        let action = match buf[9] {
            0 => FlowAction::ToController,
            1 => FlowAction::Drop,
            other => return Err(field("action", other)),
        };
        let matcher = match buf[12] {
            MATCH_ANY => FlowMatch::Any,
            MATCH_ETHERTYPE => FlowMatch::EtherType(u16::from_be_bytes([buf[14], buf[15]])),
            MATCH_ETHERIP => FlowMatch::EtherIp {
                source: Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]),
                destination: Ipv4Addr::new(buf[20], buf[21], buf[22], buf[23]),
            },
            other => return Err(field("match", other)),
        };
        Ok(Self {
            switch: u64::from_be_bytes(raw),
            command,
            rule: FlowRule {
                priority: u16::from_be_bytes([buf[10], buf[11]]),
                matcher,
                action,
            },
        })
    }
}
