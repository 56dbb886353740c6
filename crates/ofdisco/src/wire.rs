// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-layout records exchanged with other controller processes.
//!
//! All multi-byte integers are big-endian.
//!
//! ```text
//! LinkStatusRecord (24B)
//! +---------------+---------------+---------+---------+------+-------+
//! | from_switch 8 | to_switch 8   | from_pt | to_pt   | stat | pad 3 |
//! +---------------+---------------+---------+---------+------+-------+
//!
//! EventForwardRequest (8B + names)
//! +------+-------+-------------+--------------------------------+
//! | type | pad 3 | n_services  | name\0name\0...                |
//! +------+-------+-------------+--------------------------------+
//!
//! EventForwardReply (8B + names)
//! +------+--------+-------+-------------+-----------------------+
//! | type | result | pad 2 | n_services  | name\0name\0...       |
//! +------+--------+-------+-------------+-----------------------+
//! ```

use crate::error::WireError;
use crate::types::{LinkStatus, MacAddr, PortKey, PortNo, SwitchId};

/// Bus message types owned by the discovery engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    EventForwardAdd = 0x0101,
    EventForwardDelete = 0x0102,
    EventForwardReply = 0x0103,
    SwitchListRequest = 0x0104,
    SwitchListReply = 0x0105,
    LinkStatus = 0x0201,
    LinkStatusUpdate = 0x0202,
    SwitchStatus = 0x0301,
    PortStatus = 0x0302,
    PacketIn = 0x0303,
    PacketOut = 0x0304,
    FlowMod = 0x0305,
}

impl MessageType {
    pub fn from_u16(value: u16) -> Option<Self> {
        let ty = match value {
            0x0101 => Self::EventForwardAdd,
            0x0102 => Self::EventForwardDelete,
            0x0103 => Self::EventForwardReply,
            0x0104 => Self::SwitchListRequest,
            0x0105 => Self::SwitchListReply,
            0x0201 => Self::LinkStatus,
            0x0202 => Self::LinkStatusUpdate,
            0x0301 => Self::SwitchStatus,
            0x0302 => Self::PortStatus,
            0x0303 => Self::PacketIn,
            0x0304 => Self::PacketOut,
            0x0305 => Self::FlowMod,
            _ => return None,
        };
        Some(ty)
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Switch event classes a switch process can forward to a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    Vendor = 0,
    PacketIn = 1,
    PortStatus = 2,
    StateNotify = 3,
}

impl EventType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Vendor),
            1 => Some(Self::PacketIn),
            2 => Some(Self::PortStatus),
            3 => Some(Self::StateNotify),
            _ => None,
        }
    }
}

/// Result code of an event-forward operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpResult {
    Succeeded = 0,
    Failed = 1,
}

impl OpResult {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Succeeded),
            1 => Some(Self::Failed),
            _ => None,
        }
    }
}

fn be_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn be_u64(buf: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[at..at + 8]);
    u64::from_be_bytes(raw)
}

fn exact_len(record: &'static str, buf: &[u8], expected: usize) -> Result<(), WireError> {
    if buf.len() != expected {
        return Err(WireError::Length {
            record,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn min_len(record: &'static str, buf: &[u8], expected: usize) -> Result<(), WireError> {
    if buf.len() < expected {
        return Err(WireError::Length {
            record,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Link status between two switch ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatusRecord {
    pub from_switch: SwitchId,
    pub to_switch: SwitchId,
    pub from_port: PortNo,
    pub to_port: PortNo,
    pub status: LinkStatus,
}

impl LinkStatusRecord {
    pub const LEN: usize = 24;
    const NAME: &'static str = "link status";

    pub fn from_port_key(&self) -> PortKey {
        PortKey::new(self.from_switch, self.from_port)
    }

    pub fn to_port_key(&self) -> PortKey {
        PortKey::new(self.to_switch, self.to_port)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        buf[0..8].copy_from_slice(&self.from_switch.to_be_bytes());
        buf[8..16].copy_from_slice(&self.to_switch.to_be_bytes());
        buf[16..18].copy_from_slice(&self.from_port.to_be_bytes());
        buf[18..20].copy_from_slice(&self.to_port.to_be_bytes());
        buf[20] = self.status as u8;
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        exact_len(Self::NAME, buf, Self::LEN)?;
        let status = LinkStatus::from_u8(buf[20]).ok_or(WireError::Field {
            record: Self::NAME,
            field: "status",
            value: u64::from(buf[20]),
        })?;
        Ok(Self {
            from_switch: be_u64(buf, 0),
            to_switch: be_u64(buf, 8),
            from_port: be_u16(buf, 16),
            to_port: be_u16(buf, 18),
            status,
        })
    }
}

fn encode_services(buf: &mut Vec<u8>, services: &[String]) {
    for name in services {
        buf.extend_from_slice(name.as_bytes());
        buf.push(0);
    }
}

fn decode_services(
    record: &'static str,
    buf: &[u8],
    count: u32,
) -> Result<Vec<String>, WireError> {
    let text = std::str::from_utf8(buf).map_err(|_| WireError::Utf8 { record })?;
    let names: Vec<String> = text
        .split('\0')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    if names.len() != count as usize {
        return Err(WireError::Field {
            record,
            field: "n_services",
            value: u64::from(count),
        });
    }
    Ok(names)
}

/// Add/delete event-forward entry request.
///
/// The operation is carried by the message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventForwardRequest {
    pub event_type: EventType,
    pub services: Vec<String>,
}

impl EventForwardRequest {
    pub const HEADER_LEN: usize = 8;
    const NAME: &'static str = "event forward request";

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::HEADER_LEN];
        buf[0] = self.event_type as u8;
        buf[4..8].copy_from_slice(&(self.services.len() as u32).to_be_bytes());
        encode_services(&mut buf, &self.services);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        min_len(Self::NAME, buf, Self::HEADER_LEN)?;
        let event_type = EventType::from_u8(buf[0]).ok_or(WireError::Field {
            record: Self::NAME,
            field: "event_type",
            value: u64::from(buf[0]),
        })?;
        let services = decode_services(Self::NAME, &buf[Self::HEADER_LEN..], be_u32(buf, 4))?;
        Ok(Self {
            event_type,
            services,
        })
    }
}

/// Reply to an event-forward request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventForwardReply {
    pub event_type: EventType,
    pub result: OpResult,
    pub services: Vec<String>,
}

impl EventForwardReply {
    pub const HEADER_LEN: usize = 8;
    const NAME: &'static str = "event forward reply";

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::HEADER_LEN];
        buf[0] = self.event_type as u8;
        buf[1] = self.result as u8;
        buf[4..8].copy_from_slice(&(self.services.len() as u32).to_be_bytes());
        encode_services(&mut buf, &self.services);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        min_len(Self::NAME, buf, Self::HEADER_LEN)?;
        let event_type = EventType::from_u8(buf[0]).ok_or(WireError::Field {
            record: Self::NAME,
            field: "event_type",
            value: u64::from(buf[0]),
        })?;
        let result = OpResult::from_u8(buf[1]).ok_or(WireError::Field {
            record: Self::NAME,
            field: "result",
            value: u64::from(buf[1]),
        })?;
        let services = decode_services(Self::NAME, &buf[Self::HEADER_LEN..], be_u32(buf, 4))?;
        Ok(Self {
            event_type,
            result,
            services,
        })
    }
}

/// Flat array of switch IDs.
pub fn encode_switch_list(switches: &[SwitchId]) -> Vec<u8> {
    switches.iter().flat_map(|id| id.to_be_bytes()).collect()
}

pub fn decode_switch_list(buf: &[u8]) -> Result<Vec<SwitchId>, WireError> {
    if buf.len() % 8 != 0 {
        return Err(WireError::Length {
            record: "switch list",
            expected: buf.len() - buf.len() % 8,
            actual: buf.len(),
        });
    }
    Ok(buf.chunks_exact(8).map(|c| be_u64(c, 0)).collect())
}

/// Switch connected / disconnected notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchStatusRecord {
    pub switch: SwitchId,
    pub up: bool,
}

impl SwitchStatusRecord {
    pub const LEN: usize = 16;
    const NAME: &'static str = "switch status";

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        buf[0..8].copy_from_slice(&self.switch.to_be_bytes());
        buf[8] = u8::from(self.up);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        exact_len(Self::NAME, buf, Self::LEN)?;
        Ok(Self {
            switch: be_u64(buf, 0),
            up: buf[8] != 0,
        })
    }
}

/// Port added / modified / removed notification.
///
/// ```text
/// | switch 8 | port 2 | mac 6 | name 16 (NUL padded) | up 1 | removed 1 | pad 6 |
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatusRecord {
    pub switch: SwitchId,
    pub port: PortNo,
    pub mac: MacAddr,
    pub name: String,
    pub up: bool,
    pub removed: bool,
}

impl PortStatusRecord {
    pub const LEN: usize = 40;
    pub const MAX_NAME_LEN: usize = 16;
    const NAME: &'static str = "port status";

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        buf[0..8].copy_from_slice(&self.switch.to_be_bytes());
        buf[8..10].copy_from_slice(&self.port.to_be_bytes());
        buf[10..16].copy_from_slice(&self.mac.octets());
        // Cut on a char boundary so decode still sees valid UTF-8.
        let mut n = self.name.len().min(Self::MAX_NAME_LEN);
        while !self.name.is_char_boundary(n) {
            n -= 1;
        }
        buf[16..16 + n].copy_from_slice(&self.name.as_bytes()[..n]);
        buf[32] = u8::from(self.up);
        buf[33] = u8::from(self.removed);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        exact_len(Self::NAME, buf, Self::LEN)?;
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&buf[10..16]);
        let raw_name = &buf[16..32];
        let end = raw_name.iter().position(|&b| b == 0).unwrap_or(raw_name.len());
        let name = std::str::from_utf8(&raw_name[..end])
            .map_err(|_| WireError::Utf8 { record: Self::NAME })?
            .to_string();
        Ok(Self {
            switch: be_u64(buf, 0),
            port: be_u16(buf, 8),
            mac: MacAddr(mac),
            name,
            up: buf[32] != 0,
            removed: buf[33] != 0,
        })
    }
}

/// Packet received on a switch port (packet-in) or to be sent (packet-out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    pub switch: SwitchId,
    pub port: PortNo,
    pub data: Vec<u8>,
}

impl PacketRecord {
    pub const HEADER_LEN: usize = 16;
    const NAME: &'static str = "packet";

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::HEADER_LEN];
        buf[0..8].copy_from_slice(&self.switch.to_be_bytes());
        buf[8..10].copy_from_slice(&self.port.to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        min_len(Self::NAME, buf, Self::HEADER_LEN)?;
        Ok(Self {
            switch: be_u64(buf, 0),
            port: be_u16(buf, 8),
            data: buf[Self::HEADER_LEN..].to_vec(),
        })
    }
}
