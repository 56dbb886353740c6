// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Engine-side sending handle.
//!
//! Frames are queued on an unbounded channel drained by the connection's
//! writer task, so every send returns immediately.

use super::protocol::BusMessage;
use ofdisco::{
    switch_service_name, FlowCommand, FlowModRecord, FlowProgrammer, FlowRule, MessageTransport,
    MessageType, PacketRecord, PortKey, ProbeTransmitter, RequestToken, SwitchId, TransportError,
};
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct BusHandle {
    service: String,
    outbound: mpsc::UnboundedSender<BusMessage>,
}

impl BusHandle {
    pub fn new(service: impl Into<String>, outbound: mpsc::UnboundedSender<BusMessage>) -> Self {
        Self {
            service: service.into(),
            outbound,
        }
    }

    pub fn push(&self, msg: BusMessage) -> Result<(), TransportError> {
        self.outbound.send(msg).map_err(|_| TransportError::Closed)
    }
}

impl MessageTransport for BusHandle {
    fn send(
        &mut self,
        destination: &str,
        msg_type: MessageType,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        self.push(BusMessage::message(
            &self.service,
            destination,
            msg_type,
            payload,
        ))
    }

    fn request(
        &mut self,
        destination: &str,
        msg_type: MessageType,
        payload: Vec<u8>,
        token: RequestToken,
    ) -> Result<(), TransportError> {
        self.push(BusMessage::request(
            &self.service,
            destination,
            msg_type,
            payload,
            token,
        ))
    }
}

impl ProbeTransmitter for BusHandle {
    /// Packet-out through the switch process owning `port`.
    fn transmit(&mut self, port: PortKey, frame: Vec<u8>) -> Result<(), TransportError> {
        let record = PacketRecord {
            switch: port.switch,
            port: port.port,
            data: frame,
        };
        self.send(
            &switch_service_name(port.switch),
            MessageType::PacketOut,
            record.encode(),
        )
    }
}

impl FlowProgrammer for BusHandle {
    fn program(
        &mut self,
        switch: SwitchId,
        command: FlowCommand,
        rule: &FlowRule,
    ) -> Result<(), TransportError> {
        let record = FlowModRecord {
            switch,
            command,
            rule: *rule,
        };
        self.send(
            &switch_service_name(switch),
            MessageType::FlowMod,
            record.encode(),
        )
    }
}
