//! Peripheral session engine for Scratch robotics extensions.
//!
//! junklink sits between block-level extension code and a Bluetooth or
//! WebSocket transport. It frames commands for each device family, lets at
//! most one write be in flight per peripheral, rate limits the chatty ones,
//! and watches the link so a silent board is reported instead of hanging.
//!
//! # Features
//!
//! - **Four wire formats**: Junkbot BLE text, micro:bit binary, JB direct
//!   commands and Junkbot USB CRC frames, behind one [`codec::FrameCodec`] trait
//! - **Busy gating**: sends while a write is unacknowledged are dropped,
//!   never queued, and a watchdog releases the gate if the ack never comes
//! - **Telemetry**: inbound frames merge into a last-write-wins
//!   [`types::TelemetrySnapshot`] readable at any time or as a stream
//! - **Deterministic timing**: every timer runs on the tokio clock, so tests
//!   can pause and advance time
//!
//! # Architecture
//!
//! ```text
//! facade (devices) ──send──▶ PeripheralSession ──frame──▶ Transport
//!        ▲                        │  actor task              │
//!        └──── snapshot ◀─────────┴──── decode ◀── notify ───┘
//! ```
//!
//! The transport itself (BLE, classic Bluetooth, WebSocket bridge) is
//! supplied by the host through [`Connector`] and [`Transport`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use junklink::devices::{JunkbotBle, Port};
//! use junklink::codec::TextCodec;
//! use junklink::{Connector, PeripheralSession, SessionConfig, SessionState};
//!
//! # async fn example(connector: impl Connector) -> junklink::Result<()> {
//! let session = PeripheralSession::spawn(TextCodec, connector, SessionConfig::junkbot_ble())?;
//! session.scan()?;
//! session.connect("peripheral-id")?;
//! session.wait_for_state(SessionState::is_connected).await?;
//!
//! let junkbot = JunkbotBle::new(session);
//! junkbot.set_servo(Port::B1, 90).await;
//! # Ok(())
//! # }
//! ```

mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

pub mod codec;
pub mod config;
pub mod rate_limiter;
pub mod transport;

pub mod devices;
pub mod pacing;
pub mod session;

pub use error::*;

pub use config::SessionConfig;
pub use rate_limiter::RateLimiter;
pub use session::{
    DropReason, PendingSend, PeripheralSession, SendOutcome, SessionNotice, SessionState,
};
pub use transport::{Connector, EventSink, Transport, TransportEvent};
