// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Scatter/gather registration of event forwarding across the switch fleet.
//!
//! A fan-out runs in three phases, each driven by a reply:
//!
//! 1. add (or delete) the forwarding entry on the fleet manager
//! 2. fetch the switch list from the fleet manager
//! 3. send the same request to every switch process and gather replies
//!
//! Every outstanding request carries a [`RequestToken`] and a timeout. Replies
//! and timeouts are matched by token only, so anything arriving after its
//! transaction finished is dropped.

mod transaction;

pub use transaction::{FanOutCallback, FanOutResult, ForwardOp};

use crate::config::DiscoveryConfig;
use crate::metrics::DiscoveryMetrics;
use crate::timer::TimerQueue;
use crate::transport::{switch_service_name, MessageTransport, Peer, RequestToken, TransactionId};
use crate::types::SwitchId;
use crate::wire::{
    decode_switch_list, EventForwardReply, EventForwardRequest, EventType, MessageType, OpResult,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use transaction::{Phase, Transaction};

/// Tracks fan-out transactions and their per-peer timeouts.
pub struct ForwardingCoordinator {
    transport: Box<dyn MessageTransport>,
    fleet_manager: String,
    peer_timeout: Duration,
    transactions: HashMap<TransactionId, Transaction>,
    timeouts: TimerQueue<RequestToken>,
    next_id: TransactionId,
    metrics: Arc<DiscoveryMetrics>,
}

impl ForwardingCoordinator {
    pub fn new(
        transport: Box<dyn MessageTransport>,
        fleet_manager: impl Into<String>,
        peer_timeout: Duration,
        metrics: Arc<DiscoveryMetrics>,
    ) -> Self {
        Self {
            transport,
            fleet_manager: fleet_manager.into(),
            peer_timeout,
            transactions: HashMap::new(),
            timeouts: TimerQueue::new(),
            next_id: 1,
            metrics,
        }
    }

    pub fn from_config(
        transport: Box<dyn MessageTransport>,
        config: &DiscoveryConfig,
        metrics: Arc<DiscoveryMetrics>,
    ) -> Self {
        Self::new(
            transport,
            config.fleet_manager.clone(),
            config.peer_timeout(),
            metrics,
        )
    }

    /// Number of transactions still waiting for a result.
    pub fn pending(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_pending(&self, id: TransactionId) -> bool {
        self.transactions.contains_key(&id)
    }

    /// Switches `id` is still waiting on.
    pub fn awaited(&self, id: TransactionId) -> Option<Vec<SwitchId>> {
        self.transactions
            .get(&id)
            .map(|txn| txn.awaited.iter().copied().collect())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timeouts.next_deadline()
    }

    /// Ask every switch process to forward `event_type` events to `service`.
    ///
    /// Returns the transaction ID, or `None` when the first request could not
    /// be sent (the callback has then already run with `Failed`).
    pub fn fan_out_register(
        &mut self,
        event_type: EventType,
        service: &str,
        callback: FanOutCallback,
        now: Instant,
    ) -> Option<TransactionId> {
        self.fan_out(ForwardOp::Add, event_type, service, callback, now)
    }

    /// Inverse of [`fan_out_register`](Self::fan_out_register).
    pub fn fan_out_unregister(
        &mut self,
        event_type: EventType,
        service: &str,
        callback: FanOutCallback,
        now: Instant,
    ) -> Option<TransactionId> {
        self.fan_out(ForwardOp::Delete, event_type, service, callback, now)
    }

    fn fan_out(
        &mut self,
        op: ForwardOp,
        event_type: EventType,
        service: &str,
        callback: FanOutCallback,
        now: Instant,
    ) -> Option<TransactionId> {
        let id = self.next_id;
        self.next_id += 1;

        let txn = Transaction::new(id, op, event_type, service.to_string(), callback);
        let payload = request_payload(&txn);
        let previous = self.transactions.insert(id, txn);
        assert!(previous.is_none(), "duplicate fan-out transaction id {id}");

        let token = RequestToken {
            transaction: id,
            peer: Peer::FleetManager,
        };
        match self
            .transport
            .request(&self.fleet_manager, op.message_type(), payload, token)
        {
            Ok(()) => {
                self.timeouts.schedule(token, now + self.peer_timeout);
                debug!(transaction = id, ?op, ?event_type, service, "fan-out started");
                Some(id)
            }
            Err(err) => {
                warn!(transaction = id, fleet_manager = %self.fleet_manager, error = %err,
                    "fleet manager unreachable");
                self.complete(id, FanOutResult::Failed);
                None
            }
        }
    }

    /// Route a reply carrying `token` to its transaction.
    pub fn handle_reply(
        &mut self,
        token: RequestToken,
        msg_type: MessageType,
        payload: &[u8],
        now: Instant,
    ) {
        let id = token.transaction;
        let Some(txn) = self.transactions.get(&id) else {
            debug!(transaction = id, ?msg_type, "reply for finished transaction dropped");
            return;
        };
        if !self.timeouts.contains(&token) {
            debug!(transaction = id, peer = ?token.peer, "reply for expired request dropped");
            return;
        }
        let expected = match (txn.phase, token.peer) {
            (Phase::Register, Peer::FleetManager) | (Phase::Gather, Peer::Switch(_)) => {
                MessageType::EventForwardReply
            }
            (Phase::List, Peer::FleetManager) => MessageType::SwitchListReply,
            (phase, peer) => {
                warn!(transaction = id, ?phase, ?peer, "reply from unexpected peer ignored");
                return;
            }
        };
        if msg_type != expected {
            warn!(transaction = id, ?msg_type, ?expected, "unexpected reply type ignored");
            return;
        }

        self.timeouts.cancel(&token);
        match (txn.phase, token.peer) {
            (Phase::Register, _) => self.on_registered(id, payload, now),
            (Phase::List, _) => self.on_switch_list(id, payload, now),
            (Phase::Gather, Peer::Switch(switch)) => self.on_switch_reply(id, switch, payload),
            (Phase::Gather, Peer::FleetManager) => {}
        }
    }

    /// Fail every request whose timeout has passed.
    pub fn poll_timeouts(&mut self, now: Instant) -> usize {
        let expired = self.timeouts.pop_expired(now);
        for token in &expired {
            DiscoveryMetrics::incr(&self.metrics.peer_timeouts);
            let id = token.transaction;
            match token.peer {
                Peer::FleetManager => {
                    warn!(transaction = id, fleet_manager = %self.fleet_manager,
                        "fleet manager timed out");
                    self.complete(id, FanOutResult::Failed);
                }
                Peer::Switch(switch) => {
                    warn!(transaction = id, switch, "switch timed out");
                    if let Some(txn) = self.transactions.get_mut(&id) {
                        txn.awaited.remove(&switch);
                        txn.fail();
                    }
                    self.check_complete(id);
                }
            }
        }
        expired.len()
    }

    /// Force every pending transaction to `Failed`.
    pub fn shutdown(&mut self) {
        let mut ids: Vec<TransactionId> = self.transactions.keys().copied().collect();
        ids.sort_unstable();
        for id in ids {
            warn!(transaction = id, "pending fan-out failed at shutdown");
            self.complete(id, FanOutResult::Failed);
        }
        self.timeouts.clear();
    }

    fn on_registered(&mut self, id: TransactionId, payload: &[u8], now: Instant) {
        if !reply_succeeded(id, payload) {
            warn!(transaction = id, "fleet manager refused forwarding entry");
            self.complete(id, FanOutResult::Failed);
            return;
        }
        if let Some(txn) = self.transactions.get_mut(&id) {
            txn.phase = Phase::List;
        }
        let token = RequestToken {
            transaction: id,
            peer: Peer::FleetManager,
        };
        match self.transport.request(
            &self.fleet_manager,
            MessageType::SwitchListRequest,
            Vec::new(),
            token,
        ) {
            Ok(()) => self.timeouts.schedule(token, now + self.peer_timeout),
            Err(err) => {
                warn!(transaction = id, error = %err, "switch list request failed");
                self.complete(id, FanOutResult::Failed);
            }
        }
    }

    fn on_switch_list(&mut self, id: TransactionId, payload: &[u8], now: Instant) {
        let switches = match decode_switch_list(payload) {
            Ok(switches) => switches,
            Err(err) => {
                warn!(transaction = id, error = %err, "malformed switch list");
                self.complete(id, FanOutResult::Failed);
                return;
            }
        };
        let Some(txn) = self.transactions.get_mut(&id) else {
            return;
        };
        txn.phase = Phase::Gather;
        let msg_type = txn.op.message_type();
        let payload = request_payload(txn);

        let mut seen = BTreeSet::new();
        for switch in switches {
            if !seen.insert(switch) {
                warn!(transaction = id, switch, "duplicate switch in list ignored");
                continue;
            }
            let token = RequestToken {
                transaction: id,
                peer: Peer::Switch(switch),
            };
            let destination = switch_service_name(switch);
            match self
                .transport
                .request(&destination, msg_type, payload.clone(), token)
            {
                Ok(()) => {
                    txn.awaited.insert(switch);
                    self.timeouts.schedule(token, now + self.peer_timeout);
                }
                Err(err) => {
                    warn!(transaction = id, switch, error = %err, "switch unreachable");
                    txn.fail();
                }
            }
        }
        debug!(transaction = id, awaited = txn.awaited.len(), "gathering switch replies");
        self.check_complete(id);
    }

    fn on_switch_reply(&mut self, id: TransactionId, switch: SwitchId, payload: &[u8]) {
        let succeeded = reply_succeeded(id, payload);
        if let Some(txn) = self.transactions.get_mut(&id) {
            txn.awaited.remove(&switch);
            if !succeeded {
                warn!(transaction = id, switch, "switch refused forwarding entry");
                txn.fail();
            }
        }
        self.check_complete(id);
    }

    fn check_complete(&mut self, id: TransactionId) {
        let result = match self.transactions.get(&id) {
            Some(txn) if txn.phase == Phase::Gather && txn.awaited.is_empty() => txn.result,
            _ => return,
        };
        self.complete(id, result);
    }

    fn complete(&mut self, id: TransactionId, result: FanOutResult) {
        let Some(mut txn) = self.transactions.remove(&id) else {
            return;
        };
        self.timeouts.cancel(&RequestToken {
            transaction: id,
            peer: Peer::FleetManager,
        });
        for switch in &txn.awaited {
            self.timeouts.cancel(&RequestToken {
                transaction: id,
                peer: Peer::Switch(*switch),
            });
        }

        match result {
            FanOutResult::Succeeded => {
                DiscoveryMetrics::incr(&self.metrics.transactions_succeeded);
                info!(transaction = txn.id, op = ?txn.op, event_type = ?txn.event_type,
                    "fan-out succeeded");
            }
            FanOutResult::Failed => {
                DiscoveryMetrics::incr(&self.metrics.transactions_failed);
                warn!(transaction = txn.id, op = ?txn.op, event_type = ?txn.event_type,
                    "fan-out failed");
            }
        }
        if let Some(callback) = txn.callback.take() {
            callback(result);
        }
    }
}

impl Drop for ForwardingCoordinator {
    fn drop(&mut self) {
        if !self.transactions.is_empty() {
            self.shutdown();
        }
    }
}

fn request_payload(txn: &Transaction) -> Vec<u8> {
    EventForwardRequest {
        event_type: txn.event_type,
        services: vec![txn.service.clone()],
    }
    .encode()
}

fn reply_succeeded(id: TransactionId, payload: &[u8]) -> bool {
    match EventForwardReply::decode(payload) {
        Ok(reply) => reply.result == OpResult::Succeeded,
        Err(err) => {
            warn!(transaction = id, error = %err, "malformed forwarding reply");
            false
        }
    }
}

#[cfg(test)]
mod tests;
