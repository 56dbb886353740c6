// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use super::*;
use crate::error::TransportError;
use crate::wire::encode_switch_list;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

const FLEET: &str = "switch_manager";
const SERVICE: &str = "topology";

#[derive(Debug, Clone)]
struct Sent {
    destination: String,
    msg_type: MessageType,
    payload: Vec<u8>,
    token: RequestToken,
}

#[derive(Clone, Default)]
struct MockBus {
    sent: Rc<RefCell<Vec<Sent>>>,
    unreachable: Rc<RefCell<HashSet<String>>>,
}

impl MessageTransport for MockBus {
    fn send(
        &mut self,
        destination: &str,
        _msg_type: MessageType,
        _payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        Err(TransportError::Unreachable(destination.to_string()))
    }

    fn request(
        &mut self,
        destination: &str,
        msg_type: MessageType,
        payload: Vec<u8>,
        token: RequestToken,
    ) -> Result<(), TransportError> {
        if self.unreachable.borrow().contains(destination) {
            return Err(TransportError::Unreachable(destination.to_string()));
        }
        self.sent.borrow_mut().push(Sent {
            destination: destination.to_string(),
            msg_type,
            payload,
            token,
        });
        Ok(())
    }
}

struct Harness {
    coordinator: ForwardingCoordinator,
    bus: MockBus,
    results: Rc<RefCell<Vec<FanOutResult>>>,
    metrics: Arc<DiscoveryMetrics>,
    start: Instant,
}

impl Harness {
    fn new() -> Self {
        let bus = MockBus::default();
        let metrics = Arc::new(DiscoveryMetrics::new());
        Self {
            coordinator: ForwardingCoordinator::new(
                Box::new(bus.clone()),
                FLEET,
                Duration::from_secs(5),
                Arc::clone(&metrics),
            ),
            bus,
            results: Rc::new(RefCell::new(Vec::new())),
            metrics,
            start: Instant::now(),
        }
    }

    fn at(&self, ms: u64) -> Instant {
        self.start + Duration::from_millis(ms)
    }

    fn callback(&self) -> FanOutCallback {
        let results = Rc::clone(&self.results);
        Box::new(move |result| results.borrow_mut().push(result))
    }

    fn register(&mut self) -> Option<TransactionId> {
        let callback = self.callback();
        let now = self.at(0);
        self.coordinator
            .fan_out_register(EventType::PacketIn, SERVICE, callback, now)
    }

    fn last_sent(&self) -> Sent {
        self.bus.sent.borrow().last().cloned().expect("a request was sent")
    }

    fn sent_to(&self, destination: &str) -> Vec<Sent> {
        self.bus
            .sent
            .borrow()
            .iter()
            .filter(|sent| sent.destination == destination)
            .cloned()
            .collect()
    }

    fn reply(&mut self, token: RequestToken, msg_type: MessageType, payload: Vec<u8>) {
        let now = self.at(100);
        self.coordinator.handle_reply(token, msg_type, &payload, now);
    }

    /// Accept the fleet manager entry and hand out `switches`.
    fn start_gather(&mut self, switches: &[SwitchId]) -> TransactionId {
        let id = self.register().expect("fan-out started");
        let add = self.last_sent();
        self.reply(add.token, MessageType::EventForwardReply, ok_reply());
        let list = self.last_sent();
        assert_eq!(list.msg_type, MessageType::SwitchListRequest);
        self.reply(list.token, MessageType::SwitchListReply, encode_switch_list(switches));
        id
    }

    fn switch_token(&self, switch: SwitchId) -> RequestToken {
        self.sent_to(&switch_service_name(switch))[0].token
    }

    fn results(&self) -> Vec<FanOutResult> {
        self.results.borrow().clone()
    }
}

fn reply_with(result: OpResult) -> Vec<u8> {
    EventForwardReply {
        event_type: EventType::PacketIn,
        result,
        services: vec![SERVICE.to_string()],
    }
    .encode()
}

fn ok_reply() -> Vec<u8> {
    reply_with(OpResult::Succeeded)
}

#[test]
fn test_first_request_goes_to_fleet_manager() {
    let mut h = Harness::new();
    let id = h.register().unwrap();

    let sent = h.last_sent();
    assert_eq!(sent.destination, FLEET);
    assert_eq!(sent.msg_type, MessageType::EventForwardAdd);
    assert_eq!(
        sent.token,
        RequestToken {
            transaction: id,
            peer: Peer::FleetManager
        }
    );
    let request = EventForwardRequest::decode(&sent.payload).unwrap();
    assert_eq!(request.event_type, EventType::PacketIn);
    assert_eq!(request.services, vec![SERVICE.to_string()]);
    assert!(h.coordinator.is_pending(id));
}

#[test]
fn test_all_switches_succeed() {
    let mut h = Harness::new();
    let id = h.start_gather(&[1, 2, 3]);
    assert_eq!(h.coordinator.awaited(id), Some(vec![1, 2, 3]));

    for switch in [1, 2, 3] {
        let sent = h.sent_to(&switch_service_name(switch));
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].msg_type, MessageType::EventForwardAdd);
        assert!(h.results().is_empty());
        h.reply(sent[0].token, MessageType::EventForwardReply, ok_reply());
    }

    assert_eq!(h.results(), vec![FanOutResult::Succeeded]);
    assert_eq!(h.coordinator.pending(), 0);
    assert_eq!(h.coordinator.next_deadline(), None);
    assert_eq!(h.metrics.snapshot().transactions_succeeded, 1);
}

#[test]
fn test_one_switch_times_out() {
    let mut h = Harness::new();
    let id = h.start_gather(&[1, 2, 3]);
    let late = h.switch_token(2);

    for switch in [1, 3] {
        let token = h.switch_token(switch);
        h.reply(token, MessageType::EventForwardReply, ok_reply());
    }
    assert!(h.results().is_empty());
    assert_eq!(h.coordinator.awaited(id), Some(vec![2]));

    assert_eq!(h.coordinator.poll_timeouts(h.at(4000)), 0);
    assert_eq!(h.coordinator.poll_timeouts(h.at(5100)), 1);
    assert_eq!(h.results(), vec![FanOutResult::Failed]);
    assert!(!h.coordinator.is_pending(id));

    // Late reply and a second poll find nothing.
    h.reply(late, MessageType::EventForwardReply, ok_reply());
    assert_eq!(h.coordinator.poll_timeouts(h.at(20_000)), 0);
    assert_eq!(h.results(), vec![FanOutResult::Failed]);
    assert_eq!(h.metrics.snapshot().peer_timeouts, 1);
}

#[test]
fn test_switch_failure_waits_for_others() {
    let mut h = Harness::new();
    h.start_gather(&[1, 2, 3]);

    let token = h.switch_token(1);
    h.reply(token, MessageType::EventForwardReply, reply_with(OpResult::Failed));
    assert!(h.results().is_empty());

    for switch in [2, 3] {
        let token = h.switch_token(switch);
        h.reply(token, MessageType::EventForwardReply, ok_reply());
    }
    assert_eq!(h.results(), vec![FanOutResult::Failed]);
}

#[test]
fn test_fleet_manager_refusal_fails_immediately() {
    let mut h = Harness::new();
    let id = h.register().unwrap();
    let add = h.last_sent();

    h.reply(add.token, MessageType::EventForwardReply, reply_with(OpResult::Failed));
    assert_eq!(h.results(), vec![FanOutResult::Failed]);
    assert!(!h.coordinator.is_pending(id));
    assert_eq!(h.bus.sent.borrow().len(), 1);
}

#[test]
fn test_fleet_manager_unreachable() {
    let mut h = Harness::new();
    h.bus.unreachable.borrow_mut().insert(FLEET.to_string());

    assert_eq!(h.register(), None);
    assert_eq!(h.results(), vec![FanOutResult::Failed]);
    assert_eq!(h.coordinator.pending(), 0);
}

#[test]
fn test_fleet_manager_timeout() {
    let mut h = Harness::new();
    h.register().unwrap();
    assert_eq!(h.coordinator.poll_timeouts(h.at(5000)), 1);
    assert_eq!(h.results(), vec![FanOutResult::Failed]);
}

#[test]
fn test_empty_switch_list_succeeds() {
    let mut h = Harness::new();
    let id = h.start_gather(&[]);
    assert_eq!(h.results(), vec![FanOutResult::Succeeded]);
    assert!(!h.coordinator.is_pending(id));
}

#[test]
fn test_malformed_switch_list_fails() {
    let mut h = Harness::new();
    h.register().unwrap();
    let add = h.last_sent();
    h.reply(add.token, MessageType::EventForwardReply, ok_reply());
    let list = h.last_sent();

    h.reply(list.token, MessageType::SwitchListReply, vec![0u8; 7]);
    assert_eq!(h.results(), vec![FanOutResult::Failed]);
}

#[test]
fn test_duplicate_switch_ids_ignored() {
    let mut h = Harness::new();
    let id = h.start_gather(&[7, 7, 8]);

    assert_eq!(h.sent_to(&switch_service_name(7)).len(), 1);
    assert_eq!(h.coordinator.awaited(id), Some(vec![7, 8]));
}

#[test]
fn test_undispatchable_switch_collapses_early() {
    let mut h = Harness::new();
    h.bus
        .unreachable
        .borrow_mut()
        .insert(switch_service_name(2));
    let id = h.start_gather(&[1, 2]);
    assert_eq!(h.coordinator.awaited(id), Some(vec![1]));

    let token = h.switch_token(1);
    h.reply(token, MessageType::EventForwardReply, ok_reply());
    assert_eq!(h.results(), vec![FanOutResult::Failed]);
}

#[test]
fn test_all_switches_undispatchable() {
    let mut h = Harness::new();
    for switch in [1, 2] {
        h.bus
            .unreachable
            .borrow_mut()
            .insert(switch_service_name(switch));
    }
    let id = h.start_gather(&[1, 2]);
    assert_eq!(h.results(), vec![FanOutResult::Failed]);
    assert!(!h.coordinator.is_pending(id));
}

#[test]
fn test_unexpected_reply_type_ignored() {
    let mut h = Harness::new();
    let id = h.register().unwrap();
    let add = h.last_sent();

    h.reply(add.token, MessageType::SwitchListReply, encode_switch_list(&[1]));
    assert!(h.coordinator.is_pending(id));
    assert!(h.results().is_empty());

    h.reply(add.token, MessageType::EventForwardReply, ok_reply());
    assert_eq!(h.last_sent().msg_type, MessageType::SwitchListRequest);
}

#[test]
fn test_unregister_uses_delete() {
    let mut h = Harness::new();
    let callback = h.callback();
    let now = h.at(0);
    h.coordinator
        .fan_out_unregister(EventType::PortStatus, SERVICE, callback, now)
        .unwrap();
    assert_eq!(h.last_sent().msg_type, MessageType::EventForwardDelete);
}

#[test]
fn test_transaction_ids_are_unique() {
    let mut h = Harness::new();
    let a = h.register().unwrap();
    let b = h.register().unwrap();
    assert!(b > a);
    assert_eq!(h.coordinator.pending(), 2);
}

#[test]
fn test_shutdown_fails_pending() {
    let mut h = Harness::new();
    h.start_gather(&[1, 2]);
    h.register().unwrap();

    h.coordinator.shutdown();
    assert_eq!(h.results(), vec![FanOutResult::Failed, FanOutResult::Failed]);
    assert_eq!(h.coordinator.pending(), 0);
    assert_eq!(h.coordinator.next_deadline(), None);
}

#[test]
fn test_drop_completes_pending() {
    let h = {
        let mut h = Harness::new();
        h.register().unwrap();
        h
    };
    let results = Rc::clone(&h.results);
    drop(h);
    assert_eq!(*results.borrow(), vec![FanOutResult::Failed]);
}
