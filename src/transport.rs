//! Transport contract consumed by peripheral sessions.
//!
//! A transport is the BLE central, classic-Bluetooth socket or WebSocket
//! bridge that actually moves bytes. Sessions never talk to hardware directly:
//! they call the narrow [`Transport`] interface and receive asynchronous
//! callbacks through the [`EventSink`] handed to the [`Connector`] when the
//! transport was opened.
//!
//! Every sink is stamped with the link generation that was current when its
//! transport was created. When a session rescans, the old transport is
//! disconnected and its sink goes stale, so late callbacks from a replaced
//! link are discarded rather than mutating the new connection's state.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::Result;
use crate::types::{OutgoingFrame, Ticket};

/// Discovery filter passed to [`Transport::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanFilter {
    /// BLE peripherals advertising any of these 16-bit service UUIDs
    BleServices { services: Vec<u16> },
    /// Classic Bluetooth devices of a given device class
    BluetoothClass { major: u8, minor: u8 },
    /// Accept the first endpoint the transport can reach (serial bridges)
    #[default]
    Any,
}

/// Addressing for writes and notifications.
///
/// BLE transports use the service/characteristic pair; stream transports
/// (classic Bluetooth, WebSocket) ignore it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteTarget {
    pub service: Option<u16>,
    pub characteristic: Option<u16>,
}

impl WriteTarget {
    /// A GATT service/characteristic pair
    pub const fn gatt(service: u16, characteristic: u16) -> Self {
        Self { service: Some(service), characteristic: Some(characteristic) }
    }

    /// Stream transports have no sub-addressing
    pub const fn stream() -> Self {
        Self { service: None, characteristic: None }
    }
}

/// How frame bytes are carried to the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteEncoding {
    /// Frame is already text and is written as UTF-8
    Utf8,
    /// Frame bytes are base64-encoded (Scratch Link `encoding: "base64"`)
    #[default]
    Base64,
    /// Frame bytes are written unchanged
    Binary,
}

/// Asynchronous callback delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A scan discovered a candidate peripheral
    PeripheralFound { id: String, name: Option<String> },
    /// The transport finished connecting
    Connected,
    /// Scan, connect or the established link failed
    Failed { reason: String },
    /// Inbound frame bytes
    Notify(Vec<u8>),
}

/// A transport event tagged with the link generation of its sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEvent {
    pub link: Ticket,
    pub event: TransportEvent,
}

/// Callback handle registered with a transport when it is opened.
///
/// Cheap to clone. Delivery never blocks; events sent after the owning
/// session has shut down are silently dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    link: Ticket,
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl EventSink {
    pub(crate) fn new(link: Ticket, tx: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self { link, tx }
    }

    /// Link generation this sink reports for
    pub fn link(&self) -> Ticket {
        self.link
    }

    pub fn peripheral_found(&self, id: impl Into<String>, name: Option<String>) {
        self.emit(TransportEvent::PeripheralFound { id: id.into(), name });
    }

    pub fn connected(&self) {
        self.emit(TransportEvent::Connected);
    }

    pub fn failed(&self, reason: impl Into<String>) {
        self.emit(TransportEvent::Failed { reason: reason.into() });
    }

    /// Deliver raw inbound bytes
    pub fn notify(&self, bytes: impl Into<Vec<u8>>) {
        self.emit(TransportEvent::Notify(bytes.into()));
    }

    /// Deliver an inbound frame carried as base64 text.
    ///
    /// Undecodable payloads are logged and dropped.
    pub fn notify_base64(&self, message: &str) {
        match STANDARD.decode(message) {
            Ok(bytes) => self.notify(bytes),
            Err(e) => warn!(link = self.link.value(), "Dropping undecodable base64 notification: {}", e),
        }
    }

    /// Whether the owning session is still listening
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn emit(&self, event: TransportEvent) {
        trace!(link = self.link.value(), ?event, "transport event");
        let _ = self.tx.send(LinkEvent { link: self.link, event });
    }
}

/// Narrow interface onto a BLE, Bluetooth or WebSocket collaborator.
///
/// Completion of [`Transport::write`] is the transport-level acknowledgment
/// the session's busy gate waits for; it may not reflect whether the
/// peripheral actually processed the frame.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Start discovery. Results arrive as [`TransportEvent::PeripheralFound`].
    async fn scan(&self, filter: &ScanFilter) -> Result<()>;

    /// Connect to a discovered peripheral. Success arrives as [`TransportEvent::Connected`].
    async fn connect(&self, peripheral_id: &str, pairing_secret: Option<&str>) -> Result<()>;

    /// Tear the link down. Must be safe to call repeatedly.
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Subscribe to inbound notifications on `target`.
    async fn start_notifications(&self, target: &WriteTarget) -> Result<()>;

    /// Write one frame; resolves on transport-level acknowledgment.
    async fn write(
        &self,
        target: &WriteTarget,
        frame: &OutgoingFrame,
        encoding: WriteEncoding,
    ) -> Result<()>;
}

/// Factory for fresh transports, one per scan.
pub trait Connector: Send + Sync + 'static {
    /// Create a transport that reports through `events`.
    fn open(&self, events: EventSink) -> Arc<dyn Transport>;
}

impl<F> Connector for F
where
    F: Fn(EventSink) -> Arc<dyn Transport> + Send + Sync + 'static,
{
    fn open(&self, events: EventSink) -> Arc<dyn Transport> {
        self(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Generation;

    #[tokio::test]
    async fn sink_tags_events_with_its_link() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let links = Generation::new();
        let sink = EventSink::new(links.advance(), tx);

        sink.connected();
        sink.notify(vec![1, 2, 3]);

        let first = rx.recv().await.expect("connected event");
        assert_eq!(first.link, sink.link());
        assert_eq!(first.event, TransportEvent::Connected);

        let second = rx.recv().await.expect("notify event");
        assert_eq!(second.event, TransportEvent::Notify(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn base64_notifications_are_decoded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(Generation::new().advance(), tx);

        sink.notify_base64("AAEC");
        sink.notify_base64("not base64!");
        drop(sink);

        let event = rx.recv().await.expect("decoded event");
        assert_eq!(event.event, TransportEvent::Notify(vec![0, 1, 2]));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn sink_reports_closed_after_receiver_drops() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(Generation::new().advance(), tx);
        assert!(!sink.is_closed());
        drop(rx);
        assert!(sink.is_closed());
        sink.failed("ignored");
    }

    #[test]
    fn scan_filter_round_trips_through_yaml() {
        let filter = ScanFilter::BleServices { services: vec![0xFFE0] };
        let yaml = serde_yaml_ng::to_string(&filter).expect("serialize");
        let parsed: ScanFilter = serde_yaml_ng::from_str(&yaml).expect("parse");
        assert_eq!(parsed, filter);
    }
}
