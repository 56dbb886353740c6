// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::transport::TransactionId;
use crate::types::SwitchId;
use crate::wire::{EventType, MessageType};
use std::collections::BTreeSet;

/// Aggregate outcome of a fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FanOutResult {
    Succeeded,
    Failed,
}

/// Completion callback, invoked exactly once per fan-out.
pub type FanOutCallback = Box<dyn FnOnce(FanOutResult)>;

/// Forwarding entry operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardOp {
    Add,
    Delete,
}

impl ForwardOp {
    pub fn message_type(self) -> MessageType {
        match self {
            Self::Add => MessageType::EventForwardAdd,
            Self::Delete => MessageType::EventForwardDelete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Waiting for the fleet manager to accept the entry.
    Register,
    /// Waiting for the switch list.
    List,
    /// Waiting for each switch.
    Gather,
}

pub(crate) struct Transaction {
    pub id: TransactionId,
    pub op: ForwardOp,
    pub event_type: EventType,
    pub service: String,
    pub phase: Phase,
    pub awaited: BTreeSet<SwitchId>,
    pub result: FanOutResult,
    pub callback: Option<FanOutCallback>,
}

impl Transaction {
    pub fn new(
        id: TransactionId,
        op: ForwardOp,
        event_type: EventType,
        service: String,
        callback: FanOutCallback,
    ) -> Self {
        Self {
            id,
            op,
            event_type,
            service,
            phase: Phase::Register,
            awaited: BTreeSet::new(),
            result: FanOutResult::Succeeded,
            callback: Some(callback),
        }
    }

    pub fn fail(&mut self) {
        self.result = FanOutResult::Failed;
    }
}
