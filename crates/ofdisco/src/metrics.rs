// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery counters.
//!
//! Shared through `Arc` between the engine and whoever reports statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Discovery metrics.
#[derive(Debug, Default)]
pub struct DiscoveryMetrics {
    /// Probe frames handed to the transport.
    pub probes_sent: AtomicU64,
    /// Probe frames the transport refused.
    pub probe_send_failures: AtomicU64,
    /// Probe frames decoded from packet-in.
    pub probes_received: AtomicU64,
    /// Packet-in payloads that looked like probes but failed to decode.
    pub decode_errors: AtomicU64,
    /// Link-up commits accepted by the topology store.
    pub links_confirmed: AtomicU64,
    /// Commits refused by the topology store.
    pub commit_rejections: AtomicU64,
    /// Fan-out transactions completed with success.
    pub transactions_succeeded: AtomicU64,
    /// Fan-out transactions completed with failure.
    pub transactions_failed: AtomicU64,
    /// Per-peer request timeouts.
    pub peer_timeouts: AtomicU64,
}

/// Point-in-time copy of [`DiscoveryMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub probes_sent: u64,
    pub probe_send_failures: u64,
    pub probes_received: u64,
    pub decode_errors: u64,
    pub links_confirmed: u64,
    pub commit_rejections: u64,
    pub transactions_succeeded: u64,
    pub transactions_failed: u64,
    pub peer_timeouts: u64,
}

impl DiscoveryMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            probes_sent: self.probes_sent.load(Ordering::Relaxed),
            probe_send_failures: self.probe_send_failures.load(Ordering::Relaxed),
            probes_received: self.probes_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            links_confirmed: self.links_confirmed.load(Ordering::Relaxed),
            commit_rejections: self.commit_rejections.load(Ordering::Relaxed),
            transactions_succeeded: self.transactions_succeeded.load(Ordering::Relaxed),
            transactions_failed: self.transactions_failed.load(Ordering::Relaxed),
            peer_timeouts: self.peer_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_increments() {
        let metrics = DiscoveryMetrics::new();
        DiscoveryMetrics::incr(&metrics.probes_sent);
        DiscoveryMetrics::incr(&metrics.probes_sent);
        DiscoveryMetrics::incr(&metrics.peer_timeouts);

        let snap = metrics.snapshot();
        assert_eq!(snap.probes_sent, 2);
        assert_eq!(snap.peer_timeouts, 1);
        assert_eq!(snap.decode_errors, 0);
    }
}
