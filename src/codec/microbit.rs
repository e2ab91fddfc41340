//! micro:bit-style binary protocol.
//!
//! Outgoing frames are a command byte followed by its payload. The board
//! streams a 10-byte sensor frame:
//!
//! ```text
//! 0..2  tiltX   i16, high byte first, tenths of a degree
//! 2..4  tiltY   i16, high byte first
//! 4     buttonA
//! 5     buttonB
//! 6..9  touch pins 0-2
//! 9     gesture bits (0 moved, 1 shaken, 2 jumped)
//! ```

use super::{Decoded, FrameCodec, check_range};
use crate::error::{DecodeError, EncodeError};
use crate::types::{Channel, OutgoingFrame};

pub mod opcode {
    pub const PIN_CONFIG: u8 = 0x80;
    pub const DISPLAY_TEXT: u8 = 0x81;
    pub const DISPLAY_LED: u8 = 0x82;
}

/// Longest text the display command carries, in bytes
pub const MAX_TEXT_LEN: usize = 19;

pub const SENSOR_FRAME_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicrobitCommand {
    PinConfig { pin: u8, mode: u8 },
    /// Scroll UTF-8 text across the display
    DisplayText(String),
    /// One bit per LED, five rows of five columns; bit 4 is the leftmost column
    DisplayLed([u8; 5]),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MicrobitCodec;

impl FrameCodec for MicrobitCodec {
    type Command = MicrobitCommand;

    fn name(&self) -> &'static str {
        "microbit"
    }

    fn encode(&self, command: &MicrobitCommand) -> Result<OutgoingFrame, EncodeError> {
        let bytes = match command {
            MicrobitCommand::PinConfig { pin, mode } => vec![opcode::PIN_CONFIG, *pin, *mode],
            MicrobitCommand::DisplayText(text) => {
                let text = text.as_bytes();
                if text.len() > MAX_TEXT_LEN {
                    return Err(EncodeError::PayloadTooLong { len: text.len(), max: MAX_TEXT_LEN });
                }
                let mut bytes = Vec::with_capacity(1 + text.len());
                bytes.push(opcode::DISPLAY_TEXT);
                bytes.extend_from_slice(text);
                bytes
            }
            MicrobitCommand::DisplayLed(rows) => {
                let values: Vec<i64> = rows.iter().map(|&r| r as i64).collect();
                check_range(&values, 0, 0x1F)?;
                let mut bytes = Vec::with_capacity(6);
                bytes.push(opcode::DISPLAY_LED);
                bytes.extend_from_slice(rows);
                bytes
            }
        };
        Ok(OutgoingFrame::new(bytes))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Decoded, DecodeError> {
        DecodeError::require_len(bytes, SENSOR_FRAME_LEN)?;

        let tilt_x = i16::from_be_bytes([bytes[0], bytes[1]]);
        let tilt_y = i16::from_be_bytes([bytes[2], bytes[3]]);

        Ok(Decoded::Telemetry(vec![
            (Channel::TiltX, tilt_x as f64),
            (Channel::TiltY, tilt_y as f64),
            (Channel::ButtonA, bytes[4] as f64),
            (Channel::ButtonB, bytes[5] as f64),
            (Channel::TouchPin(0), bytes[6] as f64),
            (Channel::TouchPin(1), bytes[7] as f64),
            (Channel::TouchPin(2), bytes[8] as f64),
            (Channel::Gesture, bytes[9] as f64),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn tilt_is_signed_high_byte_first() {
        let frame = [0xFE, 0xD4, 0x01, 0x2C, 1, 0, 0, 1, 0, 0b010];
        let Decoded::Telemetry(fields) = MicrobitCodec.decode(&frame).unwrap() else {
            panic!("expected telemetry");
        };
        assert!(fields.contains(&(Channel::TiltX, -300.0)));
        assert!(fields.contains(&(Channel::TiltY, 300.0)));
        assert!(fields.contains(&(Channel::ButtonA, 1.0)));
        assert!(fields.contains(&(Channel::TouchPin(1), 1.0)));
        assert!(fields.contains(&(Channel::Gesture, 2.0)));
    }

    #[test]
    fn display_commands_frame_payload_after_opcode() {
        let text = MicrobitCodec.encode(&MicrobitCommand::DisplayText("Hi".into())).unwrap();
        assert_eq!(text.as_bytes(), &[0x81, b'H', b'i']);

        let led = MicrobitCodec
            .encode(&MicrobitCommand::DisplayLed([0x1F, 0, 0x04, 0, 0x11]))
            .unwrap();
        assert_eq!(led.as_bytes(), &[0x82, 0x1F, 0, 0x04, 0, 0x11]);
    }

    #[test]
    fn long_text_and_wide_rows_are_rejected() {
        let long = "x".repeat(MAX_TEXT_LEN + 1);
        assert!(matches!(
            MicrobitCodec.encode(&MicrobitCommand::DisplayText(long)),
            Err(EncodeError::PayloadTooLong { len: 20, max: 19 })
        ));
        assert!(matches!(
            MicrobitCodec.encode(&MicrobitCommand::DisplayLed([0, 0x20, 0, 0, 0])),
            Err(EncodeError::ValueOutOfRange { index: 1, .. })
        ));
    }

    proptest! {
        #[test]
        fn short_buffers_are_errors(data in prop::collection::vec(any::<u8>(), 0..SENSOR_FRAME_LEN)) {
            prop_assert!(MicrobitCodec.decode(&data).is_err());
        }

        #[test]
        fn tilt_decodes_any_i16(x in any::<i16>(), y in any::<i16>()) {
            let mut frame = [0u8; SENSOR_FRAME_LEN];
            frame[0..2].copy_from_slice(&x.to_be_bytes());
            frame[2..4].copy_from_slice(&y.to_be_bytes());
            let Ok(Decoded::Telemetry(fields)) = MicrobitCodec.decode(&frame) else {
                return Err(TestCaseError::fail("decode failed"));
            };
            prop_assert_eq!(fields[0], (Channel::TiltX, x as f64));
            prop_assert_eq!(fields[1], (Channel::TiltY, y as f64));
        }

        #[test]
        fn encode_is_deterministic(text in "[ -~]{0,19}") {
            let command = MicrobitCommand::DisplayText(text);
            prop_assert_eq!(MicrobitCodec.encode(&command), MicrobitCodec.encode(&command));
        }
    }
}
