// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Seams to the inter-process message transport.
//!
//! Every send is fire-and-forget: a returned `Ok` only means the message was
//! queued. Replies arrive later as fresh events carrying the same
//! [`RequestToken`].

use crate::error::TransportError;
use crate::types::SwitchId;
use crate::wire::MessageType;
use serde::{Deserialize, Serialize};

/// Fan-out transaction identifier.
pub type TransactionId = u64;

/// Addressee of a coordinator request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Peer {
    FleetManager,
    Switch(SwitchId),
}

/// Correlation token of one (transaction, peer) request.
///
/// Used only to look the transaction up; it never keeps one alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestToken {
    pub transaction: TransactionId,
    pub peer: Peer,
}

/// Bus name of the process that owns `switch`.
pub fn switch_service_name(switch: SwitchId) -> String {
    format!("switch.{:#x}", switch)
}

/// Request/reply and fire-and-forget delivery by destination name.
pub trait MessageTransport {
    fn send(
        &mut self,
        destination: &str,
        msg_type: MessageType,
        payload: Vec<u8>,
    ) -> Result<(), TransportError>;

    fn request(
        &mut self,
        destination: &str,
        msg_type: MessageType,
        payload: Vec<u8>,
        token: RequestToken,
    ) -> Result<(), TransportError>;
}
