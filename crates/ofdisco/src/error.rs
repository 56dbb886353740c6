// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the discovery engine.

use crate::types::{PortKey, SwitchId};
use thiserror::Error;

/// Probe frame decode/encode errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("frame truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("unexpected ethertype {0:#06x}")]
    EtherType(u16),

    #[error("destination MAC mismatch")]
    Destination,

    #[error("unexpected IP protocol {0}")]
    IpProtocol(u8),

    #[error("IP endpoint mismatch")]
    IpEndpoint,

    #[error("malformed IP header: {0}")]
    IpHeader(&'static str),

    #[error("unsupported EtherIP version {0}")]
    EtherIpVersion(u8),

    #[error("TLV type {tlv_type} has invalid length {length}")]
    TlvLength { tlv_type: u8, length: usize },

    #[error("unexpected TLV type {0}")]
    TlvType(u8),

    #[error("missing mandatory {0} TLV")]
    MissingTlv(&'static str),

    #[error("identifier is not an unsigned integer: {0}")]
    Identifier(String),

    #[error("identifier text exceeds {max} bytes")]
    IdentifierTooLong { max: usize },
}

/// Fixed-layout record errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("{record}: invalid length {actual} (expected {expected})")]
    Length {
        record: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{record}: invalid field {field} = {value}")]
    Field {
        record: &'static str,
        field: &'static str,
        value: u64,
    },

    #[error("{record}: service list is not valid UTF-8")]
    Utf8 { record: &'static str },
}

/// Rejection of a link-status commit by the topology store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("switch {0:#x} not found")]
    SwitchNotFound(SwitchId),

    #[error("port {0} not found")]
    PortNotFound(PortKey),

    #[error("port {0} is down")]
    PortDown(PortKey),

    #[error("no link recorded on port {0}")]
    NoLink(PortKey),
}

/// A message could not be dispatched to its destination.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("destination {0} unreachable")]
    Unreachable(String),

    #[error("transport closed")]
    Closed,

    #[error("encode failed: {0}")]
    Encode(String),
}
