//! In-memory transport for exercising sessions without hardware
//!
//! [`MockConnector`] hands out [`MockTransport`]s that record every written
//! frame and let tests inject notifications, failures and acknowledgments.

#![cfg(any(test, feature = "benchmark"))]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;

use crate::codec::FrameCodec;
use crate::config::SessionConfig;
use crate::session::{PeripheralSession, SessionState};
use crate::transport::{Connector, EventSink, ScanFilter, Transport, WriteEncoding, WriteTarget};
use crate::types::OutgoingFrame;
use crate::{LinkError, Result};

/// Peripheral id every mock scan reports
pub const MOCK_PERIPHERAL_ID: &str = "mock-1";

/// When mock writes resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckMode {
    /// Every write is acknowledged as soon as it is recorded
    #[default]
    Immediate,
    /// Writes wait for [`MockTransport::release_acks`]
    Manual,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MockOptions {
    pub ack_mode: AckMode,
    pub fail_scan: bool,
}

/// Transport double that records writes and reports through its sink.
#[derive(Debug)]
pub struct MockTransport {
    events: EventSink,
    options: MockOptions,
    acks: Semaphore,
    connected: AtomicBool,
    writes: Mutex<Vec<OutgoingFrame>>,
    disconnects: AtomicUsize,
}

impl MockTransport {
    pub fn new(events: EventSink, options: MockOptions) -> Self {
        Self {
            events,
            options,
            acks: Semaphore::new(0),
            connected: AtomicBool::new(false),
            writes: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        }
    }

    /// Inject an inbound frame
    pub fn notify(&self, bytes: impl Into<Vec<u8>>) {
        self.events.notify(bytes);
    }

    /// Report a link failure
    pub fn fail(&self, reason: &str) {
        self.events.failed(reason);
    }

    /// Acknowledge `n` writes held under [`AckMode::Manual`]
    pub fn release_acks(&self, n: usize) {
        self.acks.add_permits(n);
    }

    /// Frames written so far, in wire order
    pub fn writes(&self) -> Vec<OutgoingFrame> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Written frames as text, for the ASCII protocols
    pub fn written_text(&self) -> Vec<String> {
        self.writes()
            .iter()
            .map(|frame| String::from_utf8_lossy(frame.as_bytes()).into_owned())
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn sink(&self) -> &EventSink {
        &self.events
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn scan(&self, _filter: &ScanFilter) -> Result<()> {
        if self.options.fail_scan {
            return Err(LinkError::scan_failed("mock adapter unavailable"));
        }
        self.events.peripheral_found(MOCK_PERIPHERAL_ID, Some("Mock Peripheral".to_string()));
        Ok(())
    }

    async fn connect(&self, _peripheral_id: &str, _pairing_secret: Option<&str>) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        self.events.connected();
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn start_notifications(&self, _target: &WriteTarget) -> Result<()> {
        Ok(())
    }

    async fn write(
        &self,
        _target: &WriteTarget,
        frame: &OutgoingFrame,
        _encoding: WriteEncoding,
    ) -> Result<()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).push(frame.clone());
        if self.options.ack_mode == AckMode::Manual {
            let permit = self.acks.acquire().await.map_err(|_| LinkError::transport("ack channel closed"))?;
            permit.forget();
        }
        Ok(())
    }
}

/// Connector that keeps every transport it opens for later inspection.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    options: MockOptions,
    opened: Arc<Mutex<Vec<Arc<MockTransport>>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MockOptions) -> Self {
        Self { options, ..Self::default() }
    }

    /// Writes stay unacknowledged until released
    pub fn manual_acks() -> Self {
        Self::with_options(MockOptions { ack_mode: AckMode::Manual, ..MockOptions::default() })
    }

    pub fn failing_scan() -> Self {
        Self::with_options(MockOptions { fail_scan: true, ..MockOptions::default() })
    }

    /// Most recently opened transport
    pub fn latest(&self) -> Option<Arc<MockTransport>> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).last().cloned()
    }

    /// Every transport opened so far, oldest first
    pub fn opened(&self) -> Vec<Arc<MockTransport>> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Connector for MockConnector {
    fn open(&self, events: EventSink) -> Arc<dyn Transport> {
        let transport = Arc::new(MockTransport::new(events, self.options));
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).push(transport.clone());
        transport
    }
}

/// Spawn a session on `connector`, scan, connect and wait for Idle.
pub async fn connect_mock<C: FrameCodec>(
    codec: C,
    connector: &MockConnector,
    config: SessionConfig,
) -> Result<(PeripheralSession<C>, Arc<MockTransport>)> {
    let session = PeripheralSession::spawn(codec, connector.clone(), config)?;
    session.scan()?;
    session.connect(MOCK_PERIPHERAL_ID)?;
    session.wait_for_state(|state| *state == SessionState::Idle).await?;
    let transport = connector.latest().ok_or(LinkError::TransportUnavailable)?;
    Ok((session, transport))
}
