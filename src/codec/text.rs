//! Junkbot BLE text protocol.
//!
//! Commands go out as semicolon-terminated decimal text bracketed by the
//! start and end markers: `240;<cmd>;<v1>;...;<vn>;247;`. Telemetry comes
//! back as raw bytes with the digital input bit field, ultrasonic distance
//! and analog reading at fixed offsets.

use std::fmt::Write as _;

use super::{Decoded, FrameCodec};
use crate::error::{DecodeError, EncodeError};
use crate::types::{Channel, OutgoingFrame};

/// Opcodes understood by the Junkbot firmware
pub mod opcode {
    pub const START: u8 = 0xF0;
    pub const SET_OUTPUT: u8 = 0xF1;
    pub const SET_SERVO: u8 = 0xF2;
    pub const SET_PWM: u8 = 0xF3;
    pub const SET_RGB: u8 = 0xF4;
    pub const END: u8 = 0xF7;
    pub const READ_INPUT: u8 = 0xF8;
    pub const READ_DISTANCE: u8 = 0xF9;
    pub const PLAY_TONE: u8 = 0xE1;
    pub const READ_ANALOG: u8 = 0xE2;
    pub const SET_MOTOR: u8 = 0xE3;
}

/// Most arguments any Junkbot command takes (SET_RGB: three pin/value pairs)
pub const MAX_ARGS: usize = 8;

/// Minimum inbound frame: header byte plus three sensor bytes
pub const MIN_TELEMETRY_LEN: usize = 4;

/// One Junkbot command and its decimal arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCommand {
    pub opcode: u8,
    pub args: Vec<i64>,
}

impl TextCommand {
    pub fn new(opcode: u8, args: impl Into<Vec<i64>>) -> Self {
        Self { opcode, args: args.into() }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl TextCodec {
    /// Parse a framed text command back into opcode and arguments.
    ///
    /// Used by mock transports and diagnostics; the firmware does the real parsing.
    pub fn parse_command(&self, frame: &[u8]) -> Result<TextCommand, DecodeError> {
        let text = std::str::from_utf8(frame)
            .map_err(|e| DecodeError::malformed(format!("frame is not UTF-8: {}", e)))?;
        let fields = text
            .strip_suffix(';')
            .ok_or_else(|| DecodeError::malformed("missing trailing ';'"))?
            .split(';')
            .map(|field| {
                field
                    .parse::<i64>()
                    .map_err(|_| DecodeError::malformed(format!("non-numeric field {:?}", field)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        match fields.as_slice() {
            [start, opcode, args @ .., end]
                if *start == opcode::START as i64 && *end == opcode::END as i64 =>
            {
                let opcode = u8::try_from(*opcode)
                    .map_err(|_| DecodeError::malformed("opcode out of byte range"))?;
                Ok(TextCommand { opcode, args: args.to_vec() })
            }
            _ => Err(DecodeError::malformed("missing start/end markers")),
        }
    }
}

impl FrameCodec for TextCodec {
    type Command = TextCommand;

    fn name(&self) -> &'static str {
        "junkbot-ble"
    }

    fn encode(&self, command: &TextCommand) -> Result<OutgoingFrame, EncodeError> {
        if command.args.len() > MAX_ARGS {
            return Err(EncodeError::PayloadTooLong { len: command.args.len(), max: MAX_ARGS });
        }

        let mut text = String::with_capacity(16 + command.args.len() * 4);
        let _ = write!(text, "{};{};", opcode::START, command.opcode);
        for value in &command.args {
            let _ = write!(text, "{};", value);
        }
        let _ = write!(text, "{};", opcode::END);

        Ok(OutgoingFrame::new(text.into_bytes()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Decoded, DecodeError> {
        DecodeError::require_len(bytes, MIN_TELEMETRY_LEN)?;
        Ok(Decoded::Telemetry(vec![
            (Channel::DigitalIn, bytes[1] as f64),
            (Channel::Distance, bytes[2] as f64),
            (Channel::Analog, bytes[3] as f64),
        ]))
    }
}
