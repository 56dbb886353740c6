// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ethernet-within-IP (RFC 3378) wrapping of probe frames.
//!
//! ```text
//! +-----------+-------------------+-------------+------------------+
//! | IPv4 (20) | EtherIP hdr (2)   | inner Ethernet frame             |
//! | proto=97  | version=3, rsvd=0 |                                  |
//! +-----------+-------------------+-------------+------------------+
//! ```

use crate::error::CodecError;
use std::net::Ipv4Addr;

pub const IPPROTO_ETHERIP: u8 = 97;
pub const ETHERIP_VERSION: u8 = 3;

const IPV4_HEADER_LEN: usize = 20;
const ETHERIP_HEADER_LEN: usize = 2;
const DEFAULT_TTL: u8 = 64;

/// Internet checksum (RFC 1071) over `data`.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for pair in &mut chunks {
        sum += u32::from(u16::from_be_bytes([pair[0], pair[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Wrap `inner` (a full Ethernet frame) in IPv4 + EtherIP headers.
pub fn wrap(inner: &[u8], source: Ipv4Addr, destination: Ipv4Addr) -> Vec<u8> {
    let total_len = IPV4_HEADER_LEN + ETHERIP_HEADER_LEN + inner.len();
    let mut buf = vec![0u8; IPV4_HEADER_LEN];

    buf[0] = 0x45; // version 4, IHL 5
    buf[2..4].copy_from_slice(&(total_len as u16).to_be_bytes());
    buf[8] = DEFAULT_TTL;
    buf[9] = IPPROTO_ETHERIP;
    buf[12..16].copy_from_slice(&source.octets());
    buf[16..20].copy_from_slice(&destination.octets());
    let sum = checksum(&buf);
    buf[10..12].copy_from_slice(&sum.to_be_bytes());

    buf.reserve(ETHERIP_HEADER_LEN + inner.len());
    buf.push(ETHERIP_VERSION << 4);
    buf.push(0);
    buf.extend_from_slice(inner);
    buf
}

/// Validate IPv4 + EtherIP headers and return the inner Ethernet frame.
pub fn unwrap(
    packet: &[u8],
    source: Ipv4Addr,
    destination: Ipv4Addr,
) -> Result<&[u8], CodecError> {
    if packet.len() < IPV4_HEADER_LEN {
        return Err(CodecError::Truncated {
            needed: IPV4_HEADER_LEN,
            actual: packet.len(),
        });
    }
    if packet[0] >> 4 != 4 {
        return Err(CodecError::IpHeader("version"));
    }
    let header_len = usize::from(packet[0] & 0x0f) * 4;
    if header_len < IPV4_HEADER_LEN {
        return Err(CodecError::IpHeader("header length"));
    }
    let total_len = usize::from(u16::from_be_bytes([packet[2], packet[3]]));
    if total_len < header_len + ETHERIP_HEADER_LEN || total_len > packet.len() {
        return Err(CodecError::IpHeader("total length"));
    }
    if checksum(&packet[..header_len]) != 0 {
        return Err(CodecError::IpHeader("checksum"));
    }
    if packet[9] != IPPROTO_ETHERIP {
        return Err(CodecError::IpProtocol(packet[9]));
    }
    let src = Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]);
    let dst = Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]);
    if src != source || dst != destination {
        return Err(CodecError::IpEndpoint);
    }

    let etherip = &packet[header_len..total_len];
    let version = etherip[0] >> 4;
    if version != ETHERIP_VERSION {
        return Err(CodecError::EtherIpVersion(version));
    }
    Ok(&etherip[ETHERIP_HEADER_LEN..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    #[test]
    fn test_checksum_known_vector() {
        // Example header from RFC 1071 discussions (checksum field zeroed).
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(checksum(&header), 0xb861);
    }

    #[test]
    fn test_wrap_header_fields() {
        let inner = [0xaa; 60];
        let packet = wrap(&inner, SRC, DST);

        assert_eq!(packet.len(), 20 + 2 + 60);
        assert_eq!(packet[9], IPPROTO_ETHERIP);
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 82);
        assert_eq!(checksum(&packet[..20]), 0);
        assert_eq!(packet[20], 0x30);
        assert_eq!(unwrap(&packet, SRC, DST).unwrap(), &inner[..]);
    }

    #[test]
    fn test_unwrap_wrong_endpoints() {
        let packet = wrap(&[0u8; 60], SRC, DST);
        assert_eq!(unwrap(&packet, DST, SRC), Err(CodecError::IpEndpoint));
    }

    #[test]
    fn test_unwrap_wrong_protocol() {
        let mut packet = wrap(&[0u8; 60], SRC, DST);
        packet[9] = 17;
        packet[10] = 0;
        packet[11] = 0;
        let sum = checksum(&packet[..20]);
        packet[10..12].copy_from_slice(&sum.to_be_bytes());
        assert_eq!(unwrap(&packet, SRC, DST), Err(CodecError::IpProtocol(17)));
    }

    #[test]
    fn test_unwrap_bad_checksum() {
        let mut packet = wrap(&[0u8; 60], SRC, DST);
        packet[8] ^= 0xff;
        assert_eq!(
            unwrap(&packet, SRC, DST),
            Err(CodecError::IpHeader("checksum"))
        );
    }

    #[test]
    fn test_unwrap_truncated_payload() {
        let packet = wrap(&[0u8; 60], SRC, DST);
        assert_eq!(
            unwrap(&packet[..50], SRC, DST),
            Err(CodecError::IpHeader("total length"))
        );
    }
}
