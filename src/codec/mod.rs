//! Frame codecs: stateless translation between commands and wire bytes.
//!
//! Each device family speaks its own incompatible layout. Rather than one
//! session type per family, a session is generic over a [`FrameCodec`] that
//! knows how to frame outgoing commands and pick telemetry fields out of
//! inbound frames.
//!
//! | Codec | Family | Outgoing | Inbound |
//! |-------|--------|----------|---------|
//! | [`TextCodec`] | Junkbot BLE | `240;cmd;v1;...;247;` text | 4 raw bytes |
//! | [`MicrobitCodec`] | micro:bit | `[cmd, payload...]` | 10-byte sensor frame |
//! | [`DirectCodec`] | JB brick | direct-command bytecode | direct replies |
//! | [`SerialCodec`] | Junkbot USB | 8 bytes + CRC16-XMODEM | JSON `{"data":[...]}` |
//!
//! Codecs are lenient about what they do not recognise and strict about
//! length: an unknown reply type decodes to [`Decoded::Ignored`], while a
//! buffer too short for its layout is a [`DecodeError`]. Neither touches the
//! telemetry snapshot.

mod crc;
pub mod direct;
pub mod microbit;
pub mod serial;
pub mod text;

pub use crc::crc16_xmodem;
pub use direct::{DirectCodec, DirectCommand, DirectKind, bytecode};
pub use microbit::{MicrobitCodec, MicrobitCommand};
pub use serial::{SerialCodec, SerialCommand};
pub use text::{TextCodec, TextCommand};

use std::fmt::Debug;

use crate::error::{DecodeError, EncodeError};
use crate::types::{Fields, OutgoingFrame};

/// Outcome of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Telemetry fields to merge into the snapshot
    Telemetry(Fields),
    /// Well-formed but unrecognised; dropped without touching state
    Ignored,
}

/// Encoder/decoder pair for one device family's wire format.
///
/// Implementations hold no mutable state: identical inputs always produce
/// identical bytes, and decoding never depends on earlier frames.
pub trait FrameCodec: Send + Sync + 'static {
    /// Structured command this codec frames
    type Command: Debug + Clone + Send + 'static;

    /// Short family name used in logs
    fn name(&self) -> &'static str;

    /// Frame a command for the wire.
    fn encode(&self, command: &Self::Command) -> Result<OutgoingFrame, EncodeError>;

    /// Extract telemetry from one complete inbound frame.
    fn decode(&self, bytes: &[u8]) -> Result<Decoded, DecodeError>;
}

/// Check that every payload value fits `min..=max`.
pub(crate) fn check_range(values: &[i64], min: i64, max: i64) -> Result<(), EncodeError> {
    match values.iter().enumerate().find(|(_, v)| !(min..=max).contains(*v)) {
        Some((index, &value)) => Err(EncodeError::ValueOutOfRange { index, value, min, max }),
        None => Ok(()),
    }
}
