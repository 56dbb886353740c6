// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link probe transition table.
//!
//! ```text
//! Inactive  --PortUp-------------> SendDelay  [500, 2000) ms, retry = 1
//! SendDelay --Timeout (sent)-----> Wait       [2000, 4000) ms, retry = 2
//! SendDelay --Timeout (failed)---> Wait       [4000, 8000) ms
//! Wait      --ReceivedProbe------> Confirmed  5 s, retry = 12, commit Up
//! Wait      --Timeout, retry > 0-> Wait       resend
//! Wait      --Timeout, retry = 0-> Confirmed  commit Unstable / Down
//! Confirmed --Timeout, retry > 0-> Confirmed  5 s (unless dirty)
//! Confirmed --Timeout, otherwise-> SendDelay
//! *         --PortDown-----------> Inactive
//! ```
//!
//! A refused commit leaves the entry `Confirmed` with retry = 24.

use super::entry::{ProbeEntry, ProbeEvent, ProbeState};
use super::{LinkStatusSink, ProbeTransmitter};
use crate::error::CommitError;
use crate::metrics::DiscoveryMetrics;
use crate::probe::ProbeCodec;
use crate::timer::TimerQueue;
use crate::types::{LinkStatus, MacAddr, PortKey, SwitchId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// First probe delay after a port comes up (ms).
pub const SEND_DELAY_MS: Range<u64> = 500..2000;
/// Wait for a probe to come back (ms).
pub const WAIT_MS: Range<u64> = 2000..4000;
/// Backoff after the transport refused a probe (ms).
pub const SEND_RETRY_MS: Range<u64> = 4000..8000;
pub const CONFIRM_INTERVAL: Duration = Duration::from_millis(5000);

pub const WAIT_RETRIES: u32 = 2;
pub const CONFIRMED_RETRIES: u32 = 12;
pub const REJECTED_RETRIES: u32 = 24;

/// Collaborators a transition may call.
pub struct ProbeContext<'a> {
    pub transmitter: &'a mut dyn ProbeTransmitter,
    pub sink: &'a mut dyn LinkStatusSink,
}

/// Condition under which the neighbor's entry gets marked dirty.
enum PeerCheck {
    Confirmed,
    LinkUpDiffers(bool),
}

/// Owns every probe entry and the timer queue they are scheduled on.
pub struct LinkProbeFsm {
    entries: HashMap<PortKey, ProbeEntry>,
    timers: TimerQueue<PortKey>,
    codec: ProbeCodec,
    rng: StdRng,
    metrics: Arc<DiscoveryMetrics>,
}

impl LinkProbeFsm {
    pub fn new(codec: ProbeCodec, metrics: Arc<DiscoveryMetrics>) -> Self {
        Self::with_rng(codec, metrics, StdRng::from_entropy())
    }

    /// Use a caller-provided RNG for probe delays.
    pub fn with_rng(codec: ProbeCodec, metrics: Arc<DiscoveryMetrics>, rng: StdRng) -> Self {
        Self {
            entries: HashMap::new(),
            timers: TimerQueue::new(),
            codec,
            rng,
            metrics,
        }
    }

    pub fn codec(&self) -> &ProbeCodec {
        &self.codec
    }

    pub fn entry(&self, key: PortKey) -> Option<&ProbeEntry> {
        self.entries.get(&key)
    }

    pub fn state(&self, key: PortKey) -> ProbeState {
        self.entries
            .get(&key)
            .map_or(ProbeState::Inactive, |entry| entry.state)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ProbeEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_scheduled(&self, key: PortKey) -> bool {
        self.timers.contains(&key)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn port_up(
        &mut self,
        key: PortKey,
        mac: MacAddr,
        now: Instant,
        ctx: &mut ProbeContext<'_>,
    ) -> ProbeState {
        self.handle(key, ProbeEvent::PortUp { mac }, now, ctx)
    }

    pub fn port_down(&mut self, key: PortKey, now: Instant, ctx: &mut ProbeContext<'_>) -> ProbeState {
        self.handle(key, ProbeEvent::PortDown, now, ctx)
    }

    /// A probe sent by `peer` arrived on `local`.
    pub fn received_probe(
        &mut self,
        local: PortKey,
        peer: PortKey,
        now: Instant,
        ctx: &mut ProbeContext<'_>,
    ) -> ProbeState {
        self.handle(local, ProbeEvent::ReceivedProbe(peer), now, ctx)
    }

    /// Deliver `Timeout` to every entry whose deadline has passed.
    ///
    /// Returns the number of entries that fired.
    pub fn tick(&mut self, now: Instant, ctx: &mut ProbeContext<'_>) -> usize {
        let expired = self.timers.pop_expired(now);
        for key in &expired {
            self.handle(*key, ProbeEvent::Timeout, now, ctx);
        }
        expired.len()
    }

    /// Apply one event to the entry of `key`, returning its new state.
    ///
    /// `PortUp` creates the entry when absent; every other event on a
    /// missing entry is ignored.
    pub fn handle(
        &mut self,
        key: PortKey,
        event: ProbeEvent,
        now: Instant,
        ctx: &mut ProbeContext<'_>,
    ) -> ProbeState {
        if let ProbeEvent::PortUp { mac } = event {
            self.entries
                .entry(key)
                .or_insert_with(|| ProbeEntry::new(key, mac, now));
        }
        let Some(entry) = self.entries.get_mut(&key) else {
            trace!(port = %key, ?event, "no probe entry");
            return ProbeState::Inactive;
        };

        let mut step = Step {
            codec: &self.codec,
            rng: &mut self.rng,
            metrics: self.metrics.as_ref(),
            now,
        };
        let before = entry.state;
        let dirty_peer = step.apply(entry, event, ctx);
        let state = entry.state;
        if before != state {
            trace!(port = %key, ?before, ?state, ?event, "probe transition");
        }

        if state == ProbeState::Inactive {
            self.entries.remove(&key);
            self.timers.cancel(&key);
        } else if self.timers.deadline_of(&key) != Some(entry.expires_at) {
            self.timers.schedule(key, entry.expires_at);
        }

        if let Some((peer, check)) = dirty_peer {
            self.mark_dirty(peer, check);
        }
        state
    }

    /// Drop every entry of `switch`.
    pub fn remove_switch(&mut self, switch: SwitchId) -> usize {
        let keys: Vec<PortKey> = self
            .entries
            .keys()
            .filter(|key| key.switch == switch)
            .copied()
            .collect();
        for key in &keys {
            self.entries.remove(key);
            self.timers.cancel(key);
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.timers.clear();
    }

    fn mark_dirty(&mut self, peer: PortKey, check: PeerCheck) {
        let Some(entry) = self.entries.get_mut(&peer) else {
            return;
        };
        let stale = match check {
            PeerCheck::Confirmed => entry.state == ProbeState::Confirmed,
            PeerCheck::LinkUpDiffers(link_up) => entry.link_up != link_up,
        };
        if stale {
            debug!(port = %peer, "neighbor marked dirty");
            entry.dirty = true;
        }
    }
}

/// Borrowed pieces of the machine needed while one entry is mutably held.
struct Step<'a> {
    codec: &'a ProbeCodec,
    rng: &'a mut StdRng,
    metrics: &'a DiscoveryMetrics,
    now: Instant,
}

impl Step<'_> {
    fn after(&mut self, range: Range<u64>) -> Instant {
        self.now + Duration::from_millis(self.rng.gen_range(range))
    }

    fn apply(
        &mut self,
        entry: &mut ProbeEntry,
        event: ProbeEvent,
        ctx: &mut ProbeContext<'_>,
    ) -> Option<(PortKey, PeerCheck)> {
        use ProbeState::{Confirmed, Inactive, SendDelay, Wait};

        match (entry.state, event) {
            (Inactive, ProbeEvent::PortUp { mac }) => {
                entry.mac = mac;
                self.enter_send_delay(entry);
            }
            (SendDelay, ProbeEvent::PortDown) => {
                entry.state = Inactive;
                return entry.peer.map(|peer| (peer, PeerCheck::Confirmed));
            }
            (Wait | Confirmed, ProbeEvent::PortDown) => {
                entry.state = Inactive;
            }
            (SendDelay, ProbeEvent::Timeout) => {
                entry.state = Wait;
                if self.send_probe(entry, ctx) {
                    entry.retry_count = WAIT_RETRIES;
                }
            }
            (Wait, ProbeEvent::ReceivedProbe(peer)) => {
                self.enter_confirmed(entry);
                entry.peer = Some(peer);
                entry.link_up = true;
                match ctx.sink.commit(entry.key, Some(peer), LinkStatus::Up) {
                    Ok(()) => {
                        DiscoveryMetrics::incr(&self.metrics.links_confirmed);
                        debug!(port = %entry.key, peer = %peer, "link confirmed");
                    }
                    Err(err) => self.rejected(entry, &err),
                }
                return Some((peer, PeerCheck::LinkUpDiffers(true)));
            }
            (Wait, ProbeEvent::Timeout) => {
                entry.retry_count = entry.retry_count.saturating_sub(1);
                if entry.retry_count > 0 {
                    self.send_probe(entry, ctx);
                } else {
                    let status = if entry.link_up {
                        LinkStatus::Unstable
                    } else {
                        LinkStatus::Down
                    };
                    let peer = entry.peer.take();
                    entry.link_up = false;
                    self.enter_confirmed(entry);
                    debug!(port = %entry.key, ?status, "no probe returned");
                    if let Err(err) = ctx.sink.commit(entry.key, peer, status) {
                        self.rejected(entry, &err);
                    }
                }
            }
            (Confirmed, ProbeEvent::Timeout) => {
                entry.retry_count = entry.retry_count.saturating_sub(1);
                if entry.retry_count > 0 && !entry.dirty {
                    entry.expires_at = self.now + CONFIRM_INTERVAL;
                } else {
                    self.enter_send_delay(entry);
                }
            }
            (Confirmed, ProbeEvent::ReceivedProbe(peer)) => {
                if !entry.link_up {
                    entry.dirty = true;
                    if let Err(err) = ctx.sink.commit(entry.key, Some(peer), LinkStatus::Unstable)
                    {
                        DiscoveryMetrics::incr(&self.metrics.commit_rejections);
                        warn!(port = %entry.key, peer = %peer, error = %err, "unstable link not committed");
                    }
                }
            }
            _ => {}
        }
        None
    }

    fn enter_send_delay(&mut self, entry: &mut ProbeEntry) {
        entry.state = ProbeState::SendDelay;
        entry.retry_count = 1;
        entry.expires_at = self.after(SEND_DELAY_MS);
    }

    fn enter_confirmed(&mut self, entry: &mut ProbeEntry) {
        entry.state = ProbeState::Confirmed;
        entry.retry_count = CONFIRMED_RETRIES;
        entry.expires_at = self.now + CONFIRM_INTERVAL;
    }

    fn rejected(&mut self, entry: &mut ProbeEntry, err: &CommitError) {
        DiscoveryMetrics::incr(&self.metrics.commit_rejections);
        debug!(port = %entry.key, error = %err, "link commit rejected");
        entry.retry_count = REJECTED_RETRIES;
    }

    /// Send one probe and schedule the wait for it. Returns whether the
    /// transport accepted the frame.
    fn send_probe(&mut self, entry: &mut ProbeEntry, ctx: &mut ProbeContext<'_>) -> bool {
        let frame = self.codec.encode(entry.mac, entry.key.switch, entry.key.port);
        match ctx.transmitter.transmit(entry.key, frame) {
            Ok(()) => {
                DiscoveryMetrics::incr(&self.metrics.probes_sent);
                entry.dirty = false;
                entry.expires_at = self.after(WAIT_MS);
                true
            }
            Err(err) => {
                DiscoveryMetrics::incr(&self.metrics.probe_send_failures);
                debug!(port = %entry.key, error = %err, "probe send failed");
                entry.expires_at = self.after(SEND_RETRY_MS);
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "fsm_tests.rs"]
mod tests;
