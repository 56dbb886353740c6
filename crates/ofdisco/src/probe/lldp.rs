// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! LLDPDU encoder/decoder (IEEE 802.1AB TLV sequence).
//!
//! ```text
//!  0                   1
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+----------------------+
//! |  type (7)   |   length (9)    |  value (length B)   |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+----------------------+
//! ```
//!
//! The probe carries Chassis ID (switch ID as text), Port ID (port number as
//! text), TTL and End. Both identifiers use subtype 7 (locally assigned).

use crate::error::CodecError;
use crate::types::{PortKey, PortNo, SwitchId};

pub const TLV_END: u8 = 0;
pub const TLV_CHASSIS_ID: u8 = 1;
pub const TLV_PORT_ID: u8 = 2;
pub const TLV_TTL: u8 = 3;
pub const TLV_PORT_DESCRIPTION: u8 = 4;
pub const TLV_SYSTEM_NAME: u8 = 5;
pub const TLV_SYSTEM_DESCRIPTION: u8 = 6;
pub const TLV_SYSTEM_CAPABILITIES: u8 = 7;
pub const TLV_MANAGEMENT_ADDRESS: u8 = 8;
pub const TLV_ORGANIZATION_SPECIFIC: u8 = 127;

pub const SUBTYPE_LOCALLY_ASSIGNED: u8 = 7;

/// Largest identifier value (subtype octet + 255 octets of text).
pub const MAX_ID_TLV_LEN: usize = 256;

/// Largest identifier text.
pub const MAX_ID_TEXT_LEN: usize = MAX_ID_TLV_LEN - 1;

pub const PROBE_TTL_SECS: u16 = 120;

const TLV_HEADER_LEN: usize = 2;

fn push_tlv(buf: &mut Vec<u8>, tlv_type: u8, value: &[u8]) {
    let header = (u16::from(tlv_type) << 9) | (value.len() as u16 & 0x01ff);
    buf.extend_from_slice(&header.to_be_bytes());
    buf.extend_from_slice(value);
}

fn push_id_tlv(buf: &mut Vec<u8>, tlv_type: u8, text: &str) -> Result<(), CodecError> {
    if text.len() > MAX_ID_TEXT_LEN {
        return Err(CodecError::IdentifierTooLong {
            max: MAX_ID_TEXT_LEN,
        });
    }
    let mut value = Vec::with_capacity(text.len() + 1);
    value.push(SUBTYPE_LOCALLY_ASSIGNED);
    value.extend_from_slice(text.as_bytes());
    push_tlv(buf, tlv_type, &value);
    Ok(())
}

/// Encode a probe LLDPDU with arbitrary identifier text.
///
/// `encode_probe` is the normal entry point; this one exists so callers
/// (and tests) can emit non-canonical but valid renderings.
pub fn encode_with_text(chassis: &str, port: &str) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(chassis.len() + port.len() + 16);
    push_id_tlv(&mut buf, TLV_CHASSIS_ID, chassis)?;
    push_id_tlv(&mut buf, TLV_PORT_ID, port)?;
    push_tlv(&mut buf, TLV_TTL, &PROBE_TTL_SECS.to_be_bytes());
    push_tlv(&mut buf, TLV_END, &[]);
    Ok(buf)
}

/// Encode the LLDPDU for `(switch, port)`.
///
/// Chassis is rendered in hexadecimal with a `0x` prefix, port in decimal.
pub fn encode_probe(switch: SwitchId, port: PortNo) -> Vec<u8> {
    let chassis = format!("{:#x}", switch);
    let port = port.to_string();
    // Neither rendering can exceed MAX_ID_TEXT_LEN.
    encode_with_text(&chassis, &port).unwrap_or_default()
}

fn parse_identifier(text: &[u8]) -> Result<u64, CodecError> {
    let s = std::str::from_utf8(text)
        .map_err(|_| CodecError::Identifier(String::from_utf8_lossy(text).into_owned()))?;
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
            u64::from_str_radix(hex, 16).ok()
        }
        Some(_) => None,
        None if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse::<u64>().ok(),
        None => None,
    };
    parsed.ok_or_else(|| CodecError::Identifier(s.to_string()))
}

fn id_value(tlv_type: u8, value: &[u8]) -> Result<u64, CodecError> {
    if value.len() < 2 || value.len() > MAX_ID_TLV_LEN {
        return Err(CodecError::TlvLength {
            tlv_type,
            length: value.len(),
        });
    }
    // value[0] is the subtype; any subtype whose text parses is accepted.
    parse_identifier(&value[1..])
}

/// Walk a TLV sequence and extract `(switch, port)`.
///
/// Chassis ID, Port ID and TTL must appear first, in that order. Optional
/// informational TLVs are skipped; reserved types are fatal. Bytes after
/// the End TLV (frame padding) are ignored.
pub fn decode_probe(mut buf: &[u8]) -> Result<PortKey, CodecError> {
    let mut chassis: Option<SwitchId> = None;
    let mut port: Option<PortNo> = None;
    let mut ttl_seen = false;

    loop {
        if buf.len() < TLV_HEADER_LEN {
            return Err(CodecError::Truncated {
                needed: TLV_HEADER_LEN,
                actual: buf.len(),
            });
        }
        let header = u16::from_be_bytes([buf[0], buf[1]]);
        let tlv_type = (header >> 9) as u8;
        let length = usize::from(header & 0x01ff);
        if buf.len() < TLV_HEADER_LEN + length {
            return Err(CodecError::Truncated {
                needed: TLV_HEADER_LEN + length,
                actual: buf.len(),
            });
        }
        let value = &buf[TLV_HEADER_LEN..TLV_HEADER_LEN + length];

        match tlv_type {
            TLV_END => {
                if length != 0 {
                    return Err(CodecError::TlvLength { tlv_type, length });
                }
                break;
            }
            TLV_CHASSIS_ID => {
                if chassis.is_some() {
                    return Err(CodecError::TlvType(tlv_type));
                }
                chassis = Some(id_value(tlv_type, value)?);
            }
            TLV_PORT_ID => {
                if chassis.is_none() || port.is_some() {
                    return Err(CodecError::TlvType(tlv_type));
                }
                let raw = id_value(tlv_type, value)?;
                let port_no = PortNo::try_from(raw)
                    .map_err(|_| CodecError::Identifier(raw.to_string()))?;
                port = Some(port_no);
            }
            TLV_TTL => {
                if port.is_none() || ttl_seen {
                    return Err(CodecError::TlvType(tlv_type));
                }
                if length != 2 {
                    return Err(CodecError::TlvLength { tlv_type, length });
                }
                ttl_seen = true;
            }
            TLV_PORT_DESCRIPTION
            | TLV_SYSTEM_NAME
            | TLV_SYSTEM_DESCRIPTION
            | TLV_SYSTEM_CAPABILITIES
            | TLV_MANAGEMENT_ADDRESS
            | TLV_ORGANIZATION_SPECIFIC => {
                if !ttl_seen {
                    return Err(CodecError::TlvType(tlv_type));
                }
                tracing::trace!(tlv_type, length, "skipping informational TLV");
            }
            other => return Err(CodecError::TlvType(other)),
        }

        buf = &buf[TLV_HEADER_LEN + length..];
    }

    match (chassis, port, ttl_seen) {
        (None, _, _) => Err(CodecError::MissingTlv("chassis ID")),
        (_, None, _) => Err(CodecError::MissingTlv("port ID")),
        (_, _, false) => Err(CodecError::MissingTlv("TTL")),
        (Some(switch), Some(port), true) => Ok(PortKey::new(switch, port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let pdu = encode_probe(0x1234, 7);
        // Chassis: type 1, len 1 + "0x1234".len()
        assert_eq!(pdu[0], TLV_CHASSIS_ID << 1);
        assert_eq!(pdu[1], 7);
        assert_eq!(pdu[2], SUBTYPE_LOCALLY_ASSIGNED);
        assert_eq!(&pdu[3..9], b"0x1234");
        // Port: type 2, len 2
        assert_eq!(pdu[9], TLV_PORT_ID << 1);
        assert_eq!(pdu[10], 2);
        assert_eq!(pdu[12], b'7');
        // TTL then End
        assert_eq!(pdu[13], TLV_TTL << 1);
        assert_eq!(&pdu[15..17], &PROBE_TTL_SECS.to_be_bytes());
        assert_eq!(&pdu[17..], &[0, 0]);
    }

    #[test]
    fn test_decode_extremes() {
        let key = decode_probe(&encode_probe(u64::MAX, u16::MAX)).unwrap();
        assert_eq!(key, PortKey::new(u64::MAX, u16::MAX));

        let key = decode_probe(&encode_probe(0, 0)).unwrap();
        assert_eq!(key, PortKey::new(0, 0));
    }

    #[test]
    fn test_decode_decimal_chassis() {
        let pdu = encode_with_text("4660", "72").unwrap();
        assert_eq!(decode_probe(&pdu).unwrap(), PortKey::new(0x1234, 72));
    }

    #[test]
    fn test_max_length_identifier_accepted() {
        let chassis = format!("0x{}1", "0".repeat(MAX_ID_TEXT_LEN - 3));
        assert_eq!(chassis.len(), MAX_ID_TEXT_LEN);
        let port = format!("{}9", "0".repeat(MAX_ID_TEXT_LEN - 1));

        let pdu = encode_with_text(&chassis, &port).unwrap();
        assert_eq!(decode_probe(&pdu).unwrap(), PortKey::new(1, 9));
    }

    #[test]
    fn test_one_byte_over_rejected() {
        // Build the oversized TLV by hand; the encoder refuses to.
        let mut value = vec![SUBTYPE_LOCALLY_ASSIGNED];
        value.extend(std::iter::repeat(b'0').take(MAX_ID_TEXT_LEN + 1));
        let mut pdu = Vec::new();
        push_tlv(&mut pdu, TLV_CHASSIS_ID, &value);
        let chassis_tlv_len = TLV_HEADER_LEN + 1 + "0x1".len();
        pdu.extend_from_slice(&encode_probe(1, 1)[chassis_tlv_len..]);

        assert_eq!(
            decode_probe(&pdu),
            Err(CodecError::TlvLength {
                tlv_type: TLV_CHASSIS_ID,
                length: MAX_ID_TLV_LEN + 1
            })
        );
        assert!(encode_with_text(&"0".repeat(MAX_ID_TEXT_LEN + 1), "1").is_err());
    }

    #[test]
    fn test_skips_system_name() {
        let mut pdu = encode_probe(5, 6);
        let end = pdu.len() - 2;
        let mut tail = Vec::new();
        push_tlv(&mut tail, TLV_SYSTEM_NAME, b"edge-sw-1");
        pdu.splice(end..end, tail);

        assert_eq!(decode_probe(&pdu).unwrap(), PortKey::new(5, 6));
    }

    #[test]
    fn test_reserved_type_is_fatal() {
        let mut pdu = encode_probe(5, 6);
        let end = pdu.len() - 2;
        let mut tail = Vec::new();
        push_tlv(&mut tail, 42, b"x");
        pdu.splice(end..end, tail);

        assert_eq!(decode_probe(&pdu), Err(CodecError::TlvType(42)));
    }

    #[test]
    fn test_port_out_of_range() {
        let pdu = encode_with_text("0x1", "65536").unwrap();
        assert!(matches!(decode_probe(&pdu), Err(CodecError::Identifier(_))));
    }

    #[test]
    fn test_non_numeric_identifier() {
        let pdu = encode_with_text("switch-a", "1").unwrap();
        assert!(matches!(decode_probe(&pdu), Err(CodecError::Identifier(_))));
        let pdu = encode_with_text("0x", "1").unwrap();
        assert!(matches!(decode_probe(&pdu), Err(CodecError::Identifier(_))));
    }

    #[test]
    fn test_missing_end_is_truncated() {
        let pdu = encode_probe(1, 2);
        let cut = &pdu[..pdu.len() - 2];
        assert!(matches!(
            decode_probe(cut),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_port_before_chassis_rejected() {
        let mut pdu = Vec::new();
        push_tlv(&mut pdu, TLV_PORT_ID, &[SUBTYPE_LOCALLY_ASSIGNED, b'1']);
        push_tlv(&mut pdu, TLV_END, &[]);
        assert_eq!(decode_probe(&pdu), Err(CodecError::TlvType(TLV_PORT_ID)));
    }

    #[test]
    fn test_missing_ttl() {
        let mut pdu = Vec::new();
        push_tlv(&mut pdu, TLV_CHASSIS_ID, &[SUBTYPE_LOCALLY_ASSIGNED, b'1']);
        push_tlv(&mut pdu, TLV_PORT_ID, &[SUBTYPE_LOCALLY_ASSIGNED, b'1']);
        push_tlv(&mut pdu, TLV_END, &[]);
        assert_eq!(decode_probe(&pdu), Err(CodecError::MissingTlv("TTL")));
    }
}
