// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-port link probe state machine.
//!
//! Each up port owns a [`ProbeEntry`] that cycles through
//! `SendDelay -> Wait -> Confirmed`, sending probes on timeout and committing
//! link status to a [`LinkStatusSink`] when a probe comes back (or does not).

mod entry;
mod fsm;

pub use entry::{ProbeEntry, ProbeEvent, ProbeState};
pub use fsm::{
    LinkProbeFsm, ProbeContext, CONFIRMED_RETRIES, CONFIRM_INTERVAL, REJECTED_RETRIES,
    SEND_DELAY_MS, SEND_RETRY_MS, WAIT_MS, WAIT_RETRIES,
};

use crate::error::{CommitError, TransportError};
use crate::types::{LinkStatus, PortKey};

/// Sends a probe frame out of a switch port.
pub trait ProbeTransmitter {
    fn transmit(&mut self, port: PortKey, frame: Vec<u8>) -> Result<(), TransportError>;
}

/// Receives link-status decisions made by the state machine.
pub trait LinkStatusSink {
    /// Commit the status of the link seen from `local`.
    ///
    /// `peer` is the far end when known. An `Err` means the commit was
    /// refused and nothing changed.
    fn commit(
        &mut self,
        local: PortKey,
        peer: Option<PortKey>,
        status: LinkStatus,
    ) -> Result<(), CommitError>;
}
