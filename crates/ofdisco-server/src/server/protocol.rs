// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message bus wire protocol.
//!
//! Every frame is one JSON object behind a length prefix:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```
//!
//! Payloads of `message`, `request` and `reply` are the binary records of
//! [`ofdisco::wire`], tagged with their numeric message type.

use ofdisco::{MessageType, RequestToken};
use serde::{Deserialize, Serialize};

/// Bus frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BusMessage {
    /// Claim a service name on the bus.
    #[serde(rename = "hello")]
    Hello { service: String },

    /// One-way message.
    #[serde(rename = "message")]
    Message {
        source: String,
        destination: String,
        msg_type: u16,
        payload: Vec<u8>,
    },

    /// Message that expects a reply carrying the same token.
    #[serde(rename = "request")]
    Request {
        source: String,
        destination: String,
        msg_type: u16,
        payload: Vec<u8>,
        token: RequestToken,
    },

    #[serde(rename = "reply")]
    Reply {
        source: String,
        destination: String,
        msg_type: u16,
        payload: Vec<u8>,
        token: RequestToken,
    },

    /// Error reported by the bus (unknown destination, duplicate name).
    #[serde(rename = "error")]
    Error { code: u32, message: String },
}

impl BusMessage {
    pub fn message(
        source: &str,
        destination: &str,
        msg_type: MessageType,
        payload: Vec<u8>,
    ) -> Self {
        Self::Message {
            source: source.to_string(),
            destination: destination.to_string(),
            msg_type: msg_type.as_u16(),
            payload,
        }
    }

    pub fn request(
        source: &str,
        destination: &str,
        msg_type: MessageType,
        payload: Vec<u8>,
        token: RequestToken,
    ) -> Self {
        Self::Request {
            source: source.to_string(),
            destination: destination.to_string(),
            msg_type: msg_type.as_u16(),
            payload,
            token,
        }
    }
}
