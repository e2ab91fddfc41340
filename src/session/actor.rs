//! The task that owns a session's transport and state

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::watchdog::{Watchdog, WatchdogKind};
use super::{DropReason, SendOutcome, SessionNotice, SessionState};
use crate::codec::{Decoded, FrameCodec};
use crate::config::SessionConfig;
use crate::rate_limiter::RateLimiter;
use crate::transport::{Connector, EventSink, LinkEvent, Transport, TransportEvent};
use crate::types::{Generation, TelemetrySnapshot, Ticket};
use crate::{LinkError, Result};

/// Work submitted by session handles
pub(super) enum Request<Cmd> {
    Scan,
    Connect(String),
    Disconnect(oneshot::Sender<()>),
    Send { command: Cmd, urgent: bool, reply: oneshot::Sender<SendOutcome> },
}

/// Completion of a spawned transport write
struct WriteSettled {
    ticket: Ticket,
    result: Result<()>,
}

pub(super) struct SessionActor<C: FrameCodec> {
    codec: C,
    connector: Arc<dyn Connector>,
    config: SessionConfig,

    requests: mpsc::UnboundedReceiver<Request<C::Command>>,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    settled_tx: mpsc::UnboundedSender<WriteSettled>,
    settled: mpsc::UnboundedReceiver<WriteSettled>,

    state: watch::Sender<SessionState>,
    telemetry: watch::Sender<TelemetrySnapshot>,
    notices: broadcast::Sender<SessionNotice>,
    cancel: CancellationToken,

    transport: Option<Arc<dyn Transport>>,
    busy: bool,
    /// Ticket of the write currently holding the busy gate
    writes: Generation,
    /// Ticket of the transport whose events are accepted
    links: Generation,
    limiter: Option<RateLimiter>,

    pending: Watchdog,
    liveness: Watchdog,
    scan: Watchdog,
}

impl<C: FrameCodec> SessionActor<C> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        codec: C,
        connector: Arc<dyn Connector>,
        config: SessionConfig,
        requests: mpsc::UnboundedReceiver<Request<C::Command>>,
        state: watch::Sender<SessionState>,
        telemetry: watch::Sender<TelemetrySnapshot>,
        notices: broadcast::Sender<SessionNotice>,
        cancel: CancellationToken,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (settled_tx, settled) = mpsc::unbounded_channel();

        Self {
            limiter: config.max_sends_per_second.map(RateLimiter::new),
            pending: Watchdog::new(WatchdogKind::PendingWrite, Some(config.pending_write_timeout)),
            liveness: Watchdog::new(WatchdogKind::Liveness, config.liveness_timeout),
            scan: Watchdog::new(WatchdogKind::Scan, config.scan_timeout),
            codec,
            connector,
            config,
            requests,
            events_tx,
            events,
            settled_tx,
            settled,
            state,
            telemetry,
            notices,
            cancel,
            transport: None,
            busy: false,
            writes: Generation::new(),
            links: Generation::new(),
        }
    }

    pub(super) async fn run(mut self) {
        info!(codec = self.codec.name(), "Session task started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Session cancelled");
                    break;
                }
                request = self.requests.recv() => match request {
                    Some(request) => self.handle_request(request).await,
                    None => {
                        debug!("All session handles dropped");
                        break;
                    }
                },
                Some(event) = self.events.recv() => self.handle_link_event(event).await,
                Some(settled) = self.settled.recv() => self.on_write_settled(settled),
                waited = self.pending.expired() => self.on_stalled_ack(waited),
                silent_for = self.liveness.expired() => self.on_link_lost(silent_for).await,
                elapsed = self.scan.expired() => {
                    self.fail_scan(format!("no connection after {:?}", elapsed)).await;
                }
            }
        }

        self.teardown().await;
        info!(codec = self.codec.name(), "Session task ended");
    }

    async fn handle_request(&mut self, request: Request<C::Command>) {
        match request {
            Request::Scan => self.start_scan().await,
            Request::Connect(peripheral_id) => self.connect(&peripheral_id).await,
            Request::Disconnect(done) => {
                self.teardown().await;
                let _ = done.send(());
            }
            Request::Send { command, urgent, reply } => {
                let outcome = self.dispatch(&command, urgent);
                if let SendOutcome::Dropped(reason) = &outcome {
                    debug!(?command, state = %self.current_state(), "Send dropped: {}", reason);
                }
                let _ = reply.send(outcome);
            }
        }
    }

    fn current_state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            trace!(from = %state, to = %next, "Session state");
            *state = next;
            true
        });
    }

    fn notify(&self, notice: SessionNotice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }

    async fn start_scan(&mut self) {
        self.teardown().await;

        let link = self.links.advance();
        let transport = self.connector.open(EventSink::new(link, self.events_tx.clone()));
        self.transport = Some(transport.clone());
        self.set_state(SessionState::Scanning);
        self.scan.arm();
        info!(codec = self.codec.name(), generation = link.value(), "Scanning for peripherals");

        if let Err(e) = transport.scan(&self.config.scan_filter).await {
            self.fail_scan(e.to_string()).await;
        }
    }

    async fn connect(&mut self, peripheral_id: &str) {
        let Some(transport) = self.transport.clone() else {
            warn!(peripheral_id, "Connect requested with no active scan");
            return;
        };
        if self.current_state() != SessionState::Scanning {
            debug!(peripheral_id, "Connect ignored, link already established");
            return;
        }

        debug!(peripheral_id, "Connecting");
        let secret = self.config.pairing_secret.as_deref();
        if let Err(e) = transport.connect(peripheral_id, secret).await {
            self.fail_scan(e.to_string()).await;
        }
    }

    async fn handle_link_event(&mut self, LinkEvent { link, event }: LinkEvent) {
        if self.transport.is_none() || !self.links.is_current(link) {
            trace!(generation = link.value(), "Ignoring event from a replaced link");
            return;
        }

        match event {
            TransportEvent::PeripheralFound { id, name } => {
                debug!(id = %id, ?name, "Peripheral found");
                self.notify(SessionNotice::PeripheralFound { id, name });
            }
            TransportEvent::Connected => self.on_connected().await,
            TransportEvent::Failed { reason } => {
                if self.current_state() == SessionState::Scanning {
                    self.fail_scan(reason).await;
                } else {
                    warn!("Transport failed: {}", reason);
                    self.notify(SessionNotice::TransportFailed { reason });
                    self.teardown().await;
                }
            }
            TransportEvent::Notify(bytes) => self.on_frame(&bytes),
        }
    }

    async fn on_connected(&mut self) {
        if self.current_state() != SessionState::Scanning {
            debug!("Duplicate connected event");
            return;
        }
        self.scan.disarm();

        if let Some(transport) = self.transport.clone() {
            if let Err(e) = transport.start_notifications(&self.config.write_target).await {
                warn!("Failed to start notifications: {}", e);
                self.notify(SessionNotice::TransportFailed { reason: e.to_string() });
                self.teardown().await;
                return;
            }
        }

        self.set_state(SessionState::Idle);
        self.liveness.arm();
        info!(codec = self.codec.name(), "Peripheral connected");
        self.notify(SessionNotice::Connected);
    }

    /// Merge a decoded frame. Only telemetry re-arms the liveness watchdog.
    fn on_frame(&mut self, bytes: &[u8]) {
        if !self.current_state().is_connected() {
            trace!(len = bytes.len(), "Frame before connection, dropped");
            return;
        }

        match self.codec.decode(bytes) {
            Ok(Decoded::Telemetry(fields)) => {
                self.liveness.arm();
                self.telemetry.send_modify(|snapshot| snapshot.apply(&fields));
            }
            Ok(Decoded::Ignored) => {
                trace!(len = bytes.len(), "Unrecognised frame ignored");
            }
            Err(e) => {
                let e = LinkError::from(e);
                debug!(len = bytes.len(), "Discarding inbound frame: {}", e);
            }
        }
    }

    /// Gate, encode and hand one command to the transport.
    fn dispatch(&mut self, command: &C::Command, urgent: bool) -> SendOutcome {
        let transport = match &self.transport {
            Some(transport) if self.current_state().is_connected() => transport.clone(),
            _ => return SendOutcome::Dropped(DropReason::NotConnected),
        };
        if self.busy {
            return SendOutcome::Dropped(DropReason::Busy);
        }
        let frame = match self.codec.encode(command) {
            Ok(frame) => frame,
            Err(e) => return SendOutcome::Dropped(DropReason::Encode(e)),
        };
        if !urgent {
            if let Some(limiter) = self.limiter.as_mut() {
                if !limiter.okay_to_send() {
                    return SendOutcome::Dropped(DropReason::RateLimited);
                }
            }
        }

        self.busy = true;
        let ticket = self.writes.advance();
        self.pending.arm();
        self.set_state(SessionState::Busy);
        trace!(generation = ticket.value(), len = frame.len(), urgent, "Frame dispatched");

        let settled = self.settled_tx.clone();
        let target = self.config.write_target;
        let encoding = self.config.write_encoding;
        tokio::spawn(async move {
            let result = transport.write(&target, &frame, encoding).await;
            let _ = settled.send(WriteSettled { ticket, result });
        });

        SendOutcome::Transmitted
    }

    fn on_write_settled(&mut self, WriteSettled { ticket, result }: WriteSettled) {
        if !self.busy || !self.writes.is_current(ticket) {
            debug!(generation = ticket.value(), "Ignoring late write acknowledgment");
            return;
        }
        if let Err(e) = result {
            warn!(generation = ticket.value(), "Write failed: {}", e);
        }
        self.release_busy();
    }

    fn on_stalled_ack(&mut self, waited: Duration) {
        let stalled = LinkError::StalledAck { waited };
        warn!(generation = self.writes.current().value(), "{}, releasing busy gate", stalled);
        self.writes.invalidate();
        self.release_busy();
    }

    fn release_busy(&mut self) {
        self.busy = false;
        self.pending.disarm();
        if self.current_state() == SessionState::Busy {
            self.set_state(SessionState::Idle);
        }
    }

    async fn on_link_lost(&mut self, silent_for: Duration) {
        warn!("{}", LinkError::LinkLoss { silent_for });
        self.notify(SessionNotice::LinkLost { silent_for });
        self.teardown().await;
    }

    async fn fail_scan(&mut self, reason: String) {
        warn!("{}", LinkError::scan_failed(reason.clone()));
        self.notify(SessionNotice::ScanFailed { reason });
        self.teardown().await;
    }

    /// Return to Disconnected. Idempotent.
    async fn teardown(&mut self) {
        self.pending.disarm();
        self.liveness.disarm();
        self.scan.disarm();
        self.writes.invalidate();
        self.links.invalidate();
        self.busy = false;

        if let Some(transport) = self.transport.take() {
            transport.disconnect().await;
            info!(codec = self.codec.name(), "Session disconnected");
        }

        self.telemetry.send_if_modified(|snapshot| {
            if snapshot.frame_count() == 0 && snapshot.is_empty() {
                return false;
            }
            snapshot.clear();
            true
        });
        self.set_state(SessionState::Disconnected);
    }
}
