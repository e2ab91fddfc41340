//! Core types shared by codecs, sessions and device facades.
//!
//! - [`Channel`] names one telemetry value (`tiltX`, `motorPosition[2]`, ...)
//! - [`TelemetrySnapshot`] holds the last decoded value of every channel
//! - [`OutgoingFrame`] is an immutable, fully framed wire message
//! - [`Generation`] and [`Ticket`] suppress stale timer callbacks
//!
//! ## Usage Example
//!
//! ```rust
//! use junklink::types::{Channel, Generation, TelemetrySnapshot};
//!
//! let mut snapshot = TelemetrySnapshot::new();
//! snapshot.apply(&[(Channel::TiltX, -300.0)]);
//! assert_eq!(snapshot.get(Channel::TiltX), -300.0);
//! assert_eq!(snapshot.get(Channel::TiltY), 0.0);
//!
//! let coast = Generation::new();
//! let ticket = coast.advance();
//! coast.advance(); // a newer command supersedes the pending one
//! assert!(!coast.is_current(ticket));
//! ```

mod channel;
mod frame;
mod generation;
mod snapshot;

pub use channel::Channel;
pub use frame::OutgoingFrame;
pub use generation::{Generation, Ticket};
pub use snapshot::{Fields, TelemetrySnapshot};
