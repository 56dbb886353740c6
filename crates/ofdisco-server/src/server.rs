// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery daemon core.
//!
//! One bus connection, two I/O tasks (frame reader and frame writer), and a
//! single engine loop that owns the controller and the forwarding
//! coordinator. Everything the engine sends goes through [`BusHandle`].

use crate::config::ServerConfig;
use ofdisco::{
    ConfigError, DiscoveryController, DiscoveryMetrics, EventType, FanOutCallback, FanOutResult,
    ForwardOp, ForwardingCoordinator, MessageTransport, MessageType, PacketRecord,
    PortStatusRecord, SwitchStatusRecord, TransportError,
};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

pub mod connection;
pub mod outbound;
pub mod protocol;

pub use connection::{FrameReader, FrameWriter};
pub use outbound::BusHandle;
pub use protocol::BusMessage;

/// Events forwarded to this service while discovery runs.
pub const FORWARDED_EVENTS: [EventType; 2] = [EventType::PacketIn, EventType::PortStatus];

type Completion = (ForwardOp, EventType, FanOutResult);

/// Daemon errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot connect to bus at {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("bus connection lost")]
    Disconnected,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Discovery engine attached to the bus.
pub struct DiscoveryService {
    config: ServerConfig,
    bus: BusHandle,
    controller: DiscoveryController,
    coordinator: ForwardingCoordinator,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    /// Registrations still outstanding before discovery may start.
    awaiting: HashSet<EventType>,
    registration_failed: bool,
    metrics: Arc<DiscoveryMetrics>,
}

impl DiscoveryService {
    pub fn new(config: ServerConfig, bus: BusHandle) -> Self {
        let metrics = Arc::new(DiscoveryMetrics::new());
        let controller = DiscoveryController::new(
            config.discovery.clone(),
            Box::new(bus.clone()),
            Box::new(bus.clone()),
            Arc::clone(&metrics),
        );
        let coordinator = ForwardingCoordinator::from_config(
            Box::new(bus.clone()),
            &config.discovery,
            Arc::clone(&metrics),
        );
        let (completions_tx, completions) = mpsc::unbounded_channel();

        Self {
            config,
            bus,
            controller,
            coordinator,
            completions_tx,
            completions,
            awaiting: HashSet::new(),
            registration_failed: false,
            metrics,
        }
    }

    #[allow(dead_code)]
    pub fn controller(&self) -> &DiscoveryController {
        &self.controller
    }

    #[allow(dead_code)]
    pub fn coordinator(&self) -> &ForwardingCoordinator {
        &self.coordinator
    }

    pub fn metrics(&self) -> &Arc<DiscoveryMetrics> {
        &self.metrics
    }

    /// Register event forwarding; discovery is enabled once every
    /// registration succeeded.
    pub fn start(&mut self, now: Instant) {
        let service = self.config.discovery.service_name.clone();
        self.registration_failed = false;
        for event in FORWARDED_EVENTS {
            self.awaiting.insert(event);
            let callback = self.completion_callback(ForwardOp::Add, event);
            if let Some(id) = self
                .coordinator
                .fan_out_register(event, &service, callback, now)
            {
                debug!(transaction = id, ?event, "forwarding registration started");
            }
        }
        self.process_completions(now);
    }

    /// Disable discovery and withdraw forwarding registrations.
    pub fn stop(&mut self, now: Instant) {
        self.controller.disable();
        self.awaiting.clear();

        let service = self.config.discovery.service_name.clone();
        for event in FORWARDED_EVENTS {
            let callback = self.completion_callback(ForwardOp::Delete, event);
            self.coordinator
                .fan_out_unregister(event, &service, callback, now);
        }
        self.process_completions(now);
    }

    /// Fail whatever is still in flight.
    pub fn finish(&mut self) {
        self.coordinator.shutdown();
        self.process_completions(Instant::now());
    }

    pub fn handle_message(&mut self, msg: BusMessage, now: Instant) {
        match msg {
            BusMessage::Reply {
                source,
                msg_type,
                payload,
                token,
                ..
            } => match MessageType::from_u16(msg_type) {
                Some(ty) => self.coordinator.handle_reply(token, ty, &payload, now),
                None => warn!(%source, msg_type, "reply with unknown message type"),
            },
            BusMessage::Message {
                source,
                msg_type,
                payload,
                ..
            } => self.dispatch(&source, msg_type, &payload, now),
            BusMessage::Request {
                source, msg_type, ..
            } => {
                warn!(%source, msg_type, "unexpected request ignored");
            }
            BusMessage::Error { code, message } => {
                warn!(code, %message, "bus reported error");
            }
            BusMessage::Hello { service } => {
                debug!(%service, "hello from bus");
            }
        }
        self.process_completions(now);
        self.publish_link_changes();
    }

    /// Timer work: probe deadlines and request timeouts.
    pub fn on_tick(&mut self, now: Instant) {
        let fired = self.controller.tick(now);
        let expired = self.coordinator.poll_timeouts(now);
        if fired > 0 || expired > 0 {
            trace!(fired, expired, "timers fired");
        }
        self.process_completions(now);
        self.publish_link_changes();
    }

    fn dispatch(&mut self, source: &str, msg_type: u16, payload: &[u8], now: Instant) {
        match MessageType::from_u16(msg_type) {
            Some(MessageType::SwitchStatus) => match SwitchStatusRecord::decode(payload) {
                Ok(record) => self.controller.switch_status(&record, now),
                Err(err) => warn!(%source, error = %err, "malformed switch status"),
            },
            Some(MessageType::PortStatus) => match PortStatusRecord::decode(payload) {
                Ok(record) => self.controller.port_status(&record, now),
                Err(err) => warn!(%source, error = %err, "malformed port status"),
            },
            Some(MessageType::PacketIn) => match PacketRecord::decode(payload) {
                Ok(record) => self.controller.packet_in(&record, now),
                Err(err) => warn!(%source, error = %err, "malformed packet-in"),
            },
            Some(MessageType::LinkStatusUpdate) => self.controller.link_status_update(payload, now),
            Some(other) => debug!(%source, ?other, "message not handled here"),
            None => warn!(%source, msg_type, "unknown message type"),
        }
    }

    fn completion_callback(&self, op: ForwardOp, event: EventType) -> FanOutCallback {
        let tx = self.completions_tx.clone();
        Box::new(move |result| {
            // The receiver lives as long as the service.
            let _ = tx.send((op, event, result));
        })
    }

    fn process_completions(&mut self, now: Instant) {
        while let Ok((op, event, result)) = self.completions.try_recv() {
            self.on_completion(op, event, result, now);
        }
    }

    fn on_completion(&mut self, op: ForwardOp, event: EventType, result: FanOutResult, now: Instant) {
        match (op, result) {
            (ForwardOp::Add, FanOutResult::Succeeded) => {
                if !self.awaiting.remove(&event) {
                    return;
                }
                info!(?event, "event forwarding registered");
                if self.awaiting.is_empty() && !self.registration_failed {
                    self.controller.enable(now);
                }
            }
            (ForwardOp::Add, FanOutResult::Failed) => {
                if self.awaiting.remove(&event) {
                    self.registration_failed = true;
                    error!(?event, "event forwarding registration failed, discovery stays disabled");
                }
            }
            (ForwardOp::Delete, FanOutResult::Succeeded) => {
                info!(?event, "event forwarding withdrawn");
            }
            (ForwardOp::Delete, FanOutResult::Failed) => {
                warn!(?event, "event forwarding withdrawal failed");
            }
        }
    }

    fn publish_link_changes(&mut self) {
        for record in self.controller.drain_link_changes() {
            debug!(
                from = %record.from_port_key(),
                to = %record.to_port_key(),
                status = ?record.status,
                "link status changed"
            );
            for subscriber in &self.config.subscribers {
                if let Err(err) =
                    self.bus
                        .send(subscriber, MessageType::LinkStatus, record.encode())
                {
                    warn!(%subscriber, error = %err, "link status not delivered");
                }
            }
        }
    }

    /// Drive the engine until `shutdown` fires or the bus goes away.
    pub async fn run(
        mut self,
        mut inbound: mpsc::UnboundedReceiver<BusMessage>,
        shutdown: Arc<Notify>,
    ) -> Result<(), ServerError> {
        self.start(Instant::now());

        let mut ticker = tokio::time::interval(self.config.discovery.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick(Instant::now()),
                msg = inbound.recv() => match msg {
                    Some(msg) => self.handle_message(msg, Instant::now()),
                    None => {
                        error!("Bus connection lost");
                        self.finish();
                        return Err(ServerError::Disconnected);
                    }
                },
                _ = shutdown.notified() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.stop(Instant::now());

        // Give the withdrawal one peer timeout to settle.
        let grace = tokio::time::sleep(self.config.discovery.peer_timeout());
        tokio::pin!(grace);
        while self.coordinator.pending() > 0 {
            tokio::select! {
                msg = inbound.recv() => match msg {
                    Some(msg) => self.handle_message(msg, Instant::now()),
                    None => break,
                },
                _ = &mut grace => {
                    warn!(pending = self.coordinator.pending(), "withdrawal did not settle");
                    break;
                }
            }
        }
        self.finish();
        Ok(())
    }
}

/// Connect to the bus and run discovery until `shutdown` fires.
pub async fn serve(config: ServerConfig, shutdown: Arc<Notify>) -> Result<(), ServerError> {
    config.validate()?;

    let addr = config.bus_address;
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ServerError::Connect { addr, source })?;
    info!("Connected to message bus at {}", addr);

    let (read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let reader = FrameReader::new(read_half, config.max_message_size);
    let writer = FrameWriter::new(write_half, config.max_message_size);

    let service = config.discovery.service_name.clone();
    let bus = BusHandle::new(service.clone(), outbound_tx);
    bus.push(BusMessage::Hello { service })?;

    let writer_task = tokio::spawn(write_loop(writer, outbound_rx));
    let reader_task = tokio::spawn(read_loop(reader, inbound_tx));

    let engine = DiscoveryService::new(config.clone(), bus);
    let stats_task = config
        .stats_interval()
        .map(|period| tokio::spawn(report_stats(Arc::clone(engine.metrics()), period)));

    // Dropping the engine closes the outbound queue and lets the writer drain.
    let result = engine.run(inbound_rx, shutdown).await;

    reader_task.abort();
    if let Some(task) = stats_task {
        task.abort();
    }
    if let Err(e) = writer_task.await {
        warn!("Writer task failed: {}", e);
    }
    result
}

async fn read_loop<R>(mut reader: FrameReader<R>, inbound: mpsc::UnboundedSender<BusMessage>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        match reader.read_message().await {
            Ok(Some(msg)) => {
                if inbound.send(msg).is_err() {
                    break;
                }
            }
            Ok(None) => {
                info!("Bus closed the connection");
                break;
            }
            Err(e) => {
                warn!("Bus read error: {}", e);
                break;
            }
        }
    }
}

async fn write_loop<W>(mut writer: FrameWriter<W>, mut outbound: mpsc::UnboundedReceiver<BusMessage>)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(msg) = outbound.recv().await {
        if let Err(e) = writer.send_message(&msg).await {
            warn!("Bus write error: {}", e);
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!("Bus shutdown error: {}", e);
    }
}

async fn report_stats(metrics: Arc<DiscoveryMetrics>, period: std::time::Duration) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;
    loop {
        interval.tick().await;
        let s = metrics.snapshot();
        info!(
            probes_sent = s.probes_sent,
            probes_received = s.probes_received,
            send_failures = s.probe_send_failures,
            decode_errors = s.decode_errors,
            links_confirmed = s.links_confirmed,
            commit_rejections = s.commit_rejections,
            peer_timeouts = s.peer_timeouts,
            "discovery statistics"
        );
    }
}
