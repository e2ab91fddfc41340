//! Peripheral session: the busy-gated, watchdog-guarded link to one device.
//!
//! [`PeripheralSession::spawn`] starts a task that exclusively owns the
//! transport, the busy flag, both watchdogs and the telemetry snapshot. The
//! returned handle is a cheap [`Clone`] that talks to the task over channels,
//! so every state mutation is serialized through one owner.
//!
//! ## State machine
//!
//! ```text
//! Disconnected --scan()--> Scanning --connected--> Idle <--ack/timeout-- Busy
//!      ^                      |                     |  --send()-------->  |
//!      +----scan failure------+                     |                     |
//!      +---------------disconnect() / link loss-----+---------------------+
//! ```
//!
//! - At most one write is in flight; sends while busy are dropped.
//! - The pending-write watchdog forces busy clear if an ack never arrives.
//! - The liveness watchdog declares link loss after a silent period, reports
//!   [`SessionNotice::LinkLost`] once and disconnects.
//! - An ack for a write the watchdog already gave up on is ignored, so it
//!   cannot release the gate for a later command.
//!
//! ## Example
//!
//! ```rust,no_run
//! use junklink::codec::{TextCodec, TextCommand, text::opcode};
//! use junklink::{Connector, PeripheralSession, SendOutcome, SessionConfig};
//!
//! # async fn example(connector: impl Connector) -> junklink::Result<()> {
//! let session = PeripheralSession::spawn(TextCodec, connector, SessionConfig::junkbot_ble())?;
//! session.scan()?;
//! // ... wait for SessionNotice::PeripheralFound, then:
//! session.connect("peripheral-id")?;
//!
//! match session.send(TextCommand::new(opcode::SET_SERVO, [6, 90])).await {
//!     SendOutcome::Transmitted => println!("servo command sent"),
//!     SendOutcome::Dropped(reason) => println!("dropped: {}", reason),
//! }
//! # Ok(())
//! # }
//! ```

mod actor;
mod watchdog;


use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::codec::FrameCodec;
use crate::config::SessionConfig;
use crate::error::EncodeError;
use crate::transport::Connector;
use crate::types::{Channel, TelemetrySnapshot};
use crate::{LinkError, Result};

use actor::{Request, SessionActor};

/// Capacity of the notice broadcast channel
const NOTICE_CAPACITY: usize = 32;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No transport; sends resolve immediately as dropped
    Disconnected,
    /// A transport exists and is discovering or connecting
    Scanning,
    /// Connected with no write in flight
    Idle,
    /// Connected with one write awaiting acknowledgment
    Busy,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Busy)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Scanning => "scanning",
            SessionState::Idle => "idle",
            SessionState::Busy => "busy",
        };
        f.write_str(name)
    }
}

/// Why a send did not reach the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    NotConnected,
    Busy,
    RateLimited,
    Encode(EncodeError),
    SessionClosed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NotConnected => f.write_str("not connected"),
            DropReason::Busy => f.write_str("busy"),
            DropReason::RateLimited => f.write_str("rate limited"),
            DropReason::Encode(e) => write!(f, "encode failed: {}", e),
            DropReason::SessionClosed => f.write_str("session closed"),
        }
    }
}

impl From<DropReason> for LinkError {
    fn from(reason: DropReason) -> Self {
        match reason {
            DropReason::NotConnected => LinkError::TransportUnavailable,
            DropReason::Busy => LinkError::Busy,
            DropReason::RateLimited => LinkError::RateLimited,
            DropReason::Encode(e) => LinkError::Encode(e),
            DropReason::SessionClosed => LinkError::SessionClosed,
        }
    }
}

/// What happened to one send request.
///
/// `Transmitted` means the frame was handed to the transport, not that the
/// peripheral executed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Transmitted,
    Dropped(DropReason),
}

impl SendOutcome {
    pub fn is_transmitted(&self) -> bool {
        matches!(self, SendOutcome::Transmitted)
    }

    /// Convert to a `Result` for callers that want to propagate drops.
    pub fn into_result(self) -> Result<()> {
        match self {
            SendOutcome::Transmitted => Ok(()),
            SendOutcome::Dropped(reason) => Err(reason.into()),
        }
    }
}

/// Conditions escalated to the session's owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    PeripheralFound { id: String, name: Option<String> },
    Connected,
    ScanFailed { reason: String },
    /// Liveness watchdog expired; the session has disconnected
    LinkLost { silent_for: Duration },
    /// The transport reported a failure on an established link
    TransportFailed { reason: String },
}

/// Future returned by [`PeripheralSession::send`].
///
/// The request is already queued when this is created; dropping it does not
/// cancel the send.
#[derive(Debug)]
#[must_use = "the send is queued either way; await to learn whether it was transmitted"]
pub struct PendingSend {
    rx: oneshot::Receiver<SendOutcome>,
}

impl PendingSend {
    /// A send that has already been decided.
    pub fn ready(outcome: SendOutcome) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(outcome);
        Self { rx }
    }
}

impl Future for PendingSend {
    type Output = SendOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(SendOutcome::Dropped(DropReason::SessionClosed)))
    }
}

/// Handle to a running peripheral session.
///
/// Cloning shares the same session. The task shuts down when
/// [`PeripheralSession::shutdown`] is called or the last handle is dropped.
pub struct PeripheralSession<C: FrameCodec> {
    requests: mpsc::UnboundedSender<Request<C::Command>>,
    state: watch::Receiver<SessionState>,
    telemetry: watch::Receiver<TelemetrySnapshot>,
    notices: broadcast::Sender<SessionNotice>,
    cancel: CancellationToken,
    _guard: Arc<DropGuard>,
}

impl<C: FrameCodec> Clone for PeripheralSession<C> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
            state: self.state.clone(),
            telemetry: self.telemetry.clone(),
            notices: self.notices.clone(),
            cancel: self.cancel.clone(),
            _guard: self._guard.clone(),
        }
    }
}

impl<C: FrameCodec> fmt::Debug for PeripheralSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeripheralSession")
            .field("state", &*self.state.borrow())
            .field("closed", &self.cancel.is_cancelled())
            .finish()
    }
}

impl<C: FrameCodec> PeripheralSession<C> {
    /// Validate `config` and start the session task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(codec: C, connector: impl Connector, config: SessionConfig) -> Result<Self> {
        config.validate()?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (telemetry_tx, telemetry_rx) = watch::channel(TelemetrySnapshot::default());
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        let cancel = CancellationToken::new();

        let actor = SessionActor::new(
            codec,
            Arc::new(connector),
            config,
            request_rx,
            state_tx,
            telemetry_tx,
            notice_tx.clone(),
            cancel.clone(),
        );
        tokio::spawn(actor.run());

        Ok(Self {
            requests: request_tx,
            state: state_rx,
            telemetry: telemetry_rx,
            notices: notice_tx,
            _guard: Arc::new(cancel.clone().drop_guard()),
            cancel,
        })
    }

    fn enqueue(&self, request: Request<C::Command>) -> Result<()> {
        self.requests.send(request).map_err(|_| LinkError::SessionClosed)
    }

    /// Open a fresh transport and start discovery, replacing any existing one.
    pub fn scan(&self) -> Result<()> {
        self.enqueue(Request::Scan)
    }

    /// Connect the scanning transport to a discovered peripheral.
    pub fn connect(&self, peripheral_id: impl Into<String>) -> Result<()> {
        self.enqueue(Request::Connect(peripheral_id.into()))
    }

    /// Cancel timers, drop the transport and reset all derived state.
    ///
    /// Safe to call from any state, any number of times.
    pub async fn disconnect(&self) {
        let (done, wait) = oneshot::channel();
        if self.enqueue(Request::Disconnect(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Alias for [`PeripheralSession::disconnect`].
    pub async fn reset(&self) {
        self.disconnect().await
    }

    /// Queue a command. Call order is wire order.
    pub fn send(&self, command: C::Command) -> PendingSend {
        self.submit(command, false)
    }

    /// Queue a command that bypasses the rate limiter (stop/coast).
    ///
    /// It is still subject to the busy gate.
    pub fn send_urgent(&self, command: C::Command) -> PendingSend {
        self.submit(command, true)
    }

    fn submit(&self, command: C::Command, urgent: bool) -> PendingSend {
        let (reply, rx) = oneshot::channel();
        if self.enqueue(Request::Send { command, urgent, reply }).is_err() {
            debug!("Send after session shutdown");
        }
        PendingSend { rx }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Wait until the state satisfies `predicate`.
    pub async fn wait_for_state(
        &self,
        mut predicate: impl FnMut(&SessionState) -> bool,
    ) -> Result<SessionState> {
        let mut state = self.state.clone();
        let reached = state
            .wait_for(|s| predicate(s))
            .await
            .map(|s| *s)
            .map_err(|_| LinkError::SessionClosed)?;
        Ok(reached)
    }

    /// Receiver for state transitions
    pub fn state_updates(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Copy of the current telemetry snapshot
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.borrow().clone()
    }

    /// Latest value of one channel, 0.0 if never reported.
    pub fn read(&self, channel: Channel) -> f64 {
        self.telemetry.borrow().get(channel)
    }

    /// Stream of snapshots, yielding the current one first and then each update.
    pub fn telemetry_updates(&self) -> WatchStream<TelemetrySnapshot> {
        WatchStream::new(self.telemetry.clone())
    }

    /// Subscribe to escalated conditions. Only notices sent after subscribing are seen.
    pub fn notices(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    /// Stop the session task. The transport is disconnected on the way out.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.requests.is_closed()
    }
}
