// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery probe frame codec.
//!
//! A probe is an LLDP frame carrying the sending switch ID and port number.
//! In IP-encapsulation mode the LLDP frame is carried inside IPv4/EtherIP
//! within an outer Ethernet frame.
//!
//! ```text
//! plain:  | dst | src | 0x88cc | LLDPDU | pad to 60 |
//! IP:     | dst | src | 0x0800 | IPv4 | EtherIP | plain frame |
//! ```

pub mod etherip;
pub mod lldp;

use crate::config::DiscoveryConfig;
use crate::error::CodecError;
use crate::types::{MacAddr, PortKey, PortNo, SwitchId};
use std::net::Ipv4Addr;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_LLDP: u16 = 0x88cc;

pub const ETH_HEADER_LEN: usize = 14;
/// Minimum Ethernet frame size, excluding FCS.
pub const ETH_MIN_FRAME_LEN: usize = 60;

/// Framing applied around the LLDPDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMode {
    Ethernet,
    EtherIp {
        source: Ipv4Addr,
        destination: Ipv4Addr,
    },
}

/// Builds and parses probe frames for one configuration.
#[derive(Debug, Clone)]
pub struct ProbeCodec {
    destination: MacAddr,
    mode: ProbeMode,
}

impl ProbeCodec {
    pub fn new(destination: MacAddr, mode: ProbeMode) -> Self {
        Self { destination, mode }
    }

    pub fn from_config(config: &DiscoveryConfig) -> Self {
        let encap = &config.ip_encapsulation;
        let mode = if encap.enabled {
            ProbeMode::EtherIp {
                source: encap.source,
                destination: encap.destination,
            }
        } else {
            ProbeMode::Ethernet
        };
        Self::new(config.probe_destination, mode)
    }

    pub fn destination(&self) -> MacAddr {
        self.destination
    }

    pub fn mode(&self) -> ProbeMode {
        self.mode
    }

    /// Build the probe sent from `mac` on `(switch, port)`.
    pub fn encode(&self, mac: MacAddr, switch: SwitchId, port: PortNo) -> Vec<u8> {
        let inner = self.ethernet(mac, ETHERTYPE_LLDP, &lldp::encode_probe(switch, port));
        match self.mode {
            ProbeMode::Ethernet => inner,
            ProbeMode::EtherIp {
                source,
                destination,
            } => {
                let packet = etherip::wrap(&inner, source, destination);
                self.ethernet(mac, ETHERTYPE_IPV4, &packet)
            }
        }
    }

    /// Extract the sender `(switch, port)` from a received probe.
    pub fn decode(&self, frame: &[u8]) -> Result<PortKey, CodecError> {
        match self.mode {
            ProbeMode::Ethernet => self.decode_lldp_frame(frame),
            ProbeMode::EtherIp {
                source,
                destination,
            } => {
                let payload = expect_ethertype(frame, ETHERTYPE_IPV4)?;
                let inner = etherip::unwrap(payload, source, destination)?;
                self.decode_lldp_frame(inner)
            }
        }
    }

    /// Cheap classification of a packet-in payload.
    ///
    /// Checks only the outer ethertype (and the IP protocol in IP mode).
    pub fn is_probe(&self, frame: &[u8]) -> bool {
        match self.mode {
            ProbeMode::Ethernet => ethertype(frame) == Some(ETHERTYPE_LLDP),
            ProbeMode::EtherIp { .. } => {
                ethertype(frame) == Some(ETHERTYPE_IPV4)
                    && frame.len() > ETH_HEADER_LEN + 9
                    && frame[ETH_HEADER_LEN + 9] == etherip::IPPROTO_ETHERIP
            }
        }
    }

    fn decode_lldp_frame(&self, frame: &[u8]) -> Result<PortKey, CodecError> {
        let pdu = expect_ethertype(frame, ETHERTYPE_LLDP)?;
        if frame[0..6] != self.destination.octets() {
            return Err(CodecError::Destination);
        }
        lldp::decode_probe(pdu)
    }

    fn ethernet(&self, source: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
        let len = (ETH_HEADER_LEN + payload.len()).max(ETH_MIN_FRAME_LEN);
        let mut frame = Vec::with_capacity(len);
        frame.extend_from_slice(&self.destination.octets());
        frame.extend_from_slice(&source.octets());
        frame.extend_from_slice(&ethertype.to_be_bytes());
        frame.extend_from_slice(payload);
        frame.resize(len, 0);
        frame
    }
}

fn ethertype(frame: &[u8]) -> Option<u16> {
    if frame.len() < ETH_HEADER_LEN {
        return None;
    }
    Some(u16::from_be_bytes([frame[12], frame[13]]))
}

fn expect_ethertype(frame: &[u8], expected: u16) -> Result<&[u8], CodecError> {
    let found = ethertype(frame).ok_or(CodecError::Truncated {
        needed: ETH_HEADER_LEN,
        actual: frame.len(),
    })?;
    if found != expected {
        return Err(CodecError::EtherType(found));
    }
    Ok(&frame[ETH_HEADER_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORT_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);

    fn ip_codec() -> ProbeCodec {
        ProbeCodec::new(
            MacAddr::LLDP_MULTICAST,
            ProbeMode::EtherIp {
                source: Ipv4Addr::new(192, 168, 1, 1),
                destination: Ipv4Addr::new(192, 168, 1, 2),
            },
        )
    }

    #[test]
    fn test_plain_roundtrip() {
        let codec = ProbeCodec::new(MacAddr::LLDP_MULTICAST, ProbeMode::Ethernet);
        for (switch, port) in [(0u64, 0u16), (0x5678, 72), (u64::MAX, u16::MAX)] {
            let frame = codec.encode(PORT_MAC, switch, port);
            assert_eq!(frame.len(), ETH_MIN_FRAME_LEN);
            assert!(codec.is_probe(&frame));
            assert_eq!(codec.decode(&frame).unwrap(), PortKey::new(switch, port));
        }
    }

    #[test]
    fn test_ip_roundtrip() {
        let codec = ip_codec();
        for (switch, port) in [(1u64, 1u16), (0x5678, 72), (u64::MAX, u16::MAX)] {
            let frame = codec.encode(PORT_MAC, switch, port);
            assert_eq!(ethertype(&frame), Some(ETHERTYPE_IPV4));
            assert!(codec.is_probe(&frame));
            assert_eq!(codec.decode(&frame).unwrap(), PortKey::new(switch, port));
        }
    }

    #[test]
    fn test_frame_header() {
        let codec = ProbeCodec::new(MacAddr::LLDP_MULTICAST, ProbeMode::Ethernet);
        let frame = codec.encode(PORT_MAC, 1, 2);
        assert_eq!(&frame[0..6], &MacAddr::LLDP_MULTICAST.octets());
        assert_eq!(&frame[6..12], &PORT_MAC.octets());
        assert_eq!(&frame[12..14], &[0x88, 0xcc]);
    }

    #[test]
    fn test_wrong_destination_rejected() {
        let codec = ProbeCodec::new(MacAddr::LLDP_MULTICAST, ProbeMode::Ethernet);
        let mut frame = codec.encode(PORT_MAC, 1, 2);
        frame[5] = 0x03;
        assert_eq!(codec.decode(&frame), Err(CodecError::Destination));
    }

    #[test]
    fn test_plain_codec_rejects_ip_frame() {
        let plain = ProbeCodec::new(MacAddr::LLDP_MULTICAST, ProbeMode::Ethernet);
        let frame = ip_codec().encode(PORT_MAC, 1, 2);
        assert!(!plain.is_probe(&frame));
        assert_eq!(plain.decode(&frame), Err(CodecError::EtherType(ETHERTYPE_IPV4)));
    }

    #[test]
    fn test_ip_codec_rejects_plain_frame() {
        let plain = ProbeCodec::new(MacAddr::LLDP_MULTICAST, ProbeMode::Ethernet);
        let frame = plain.encode(PORT_MAC, 1, 2);
        assert!(!ip_codec().is_probe(&frame));
        assert_eq!(
            ip_codec().decode(&frame),
            Err(CodecError::EtherType(ETHERTYPE_LLDP))
        );
    }

    #[test]
    fn test_short_frame() {
        let codec = ProbeCodec::new(MacAddr::LLDP_MULTICAST, ProbeMode::Ethernet);
        assert!(!codec.is_probe(&[0u8; 10]));
        assert!(matches!(
            codec.decode(&[0u8; 10]),
            Err(CodecError::Truncated { .. })
        ));
    }
}
