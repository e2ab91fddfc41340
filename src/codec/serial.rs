//! Junkbot USB frames relayed through the local WebSocket bridge.
//!
//! Outgoing frames are fixed at ten bytes, the last two a big-endian
//! CRC16-XMODEM over the first eight:
//!
//! ```text
//! [0xF0, cmd, elem, p1, p2, p3, p4, 0xF7, crc_hi, crc_lo]
//! ```
//!
//! The bridge reports board state as JSON text, `{"data": [...]}`.

use serde::Deserialize;

use super::{Decoded, FrameCodec, check_range, crc16_xmodem};
use crate::error::{DecodeError, EncodeError};
use crate::types::{Channel, OutgoingFrame};

pub mod opcode {
    pub const START: u8 = 0xF0;
    pub const SET_OUTPUT: u8 = 0xF1;
    pub const SET_SERVO: u8 = 0xF2;
    pub const SET_PWM: u8 = 0xF3;
    pub const SET_ANIM: u8 = 0xF4;
    pub const SET_RGB: u8 = 0xF5;
    pub const DFP_MSG: u8 = 0xF6;
    pub const END: u8 = 0xF7;

    /// SET_ANIM element selectors
    pub const ANIM_NUM: u8 = 0xE0;
    pub const LEDS_ON: u8 = 0xE1;
    pub const LEDS_MOVE: u8 = 0xE2;

    /// DFPlayer sub-commands carried in DFP_MSG
    pub const DFP_NEXT: u8 = 0x01;
    pub const DFP_PREV: u8 = 0x02;
    pub const DFP_PLAY_SONG: u8 = 0x03;
    pub const DFP_VOLUME: u8 = 0x06;
    pub const DFP_PLAY: u8 = 0x0D;
    pub const DFP_PAUSE: u8 = 0x0E;
}

pub const FRAME_LEN: usize = 10;
pub const MAX_PARAMS: usize = 4;

/// Entries a bridge report must carry
pub const REPORT_LEN: usize = 13;

/// One Junkbot USB command. Missing parameters are sent as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialCommand {
    pub command: u8,
    pub element: u8,
    pub params: Vec<i64>,
}

impl SerialCommand {
    pub fn new(command: u8, element: u8, params: impl Into<Vec<i64>>) -> Self {
        Self { command, element, params: params.into() }
    }
}

#[derive(Debug, Deserialize)]
struct BridgeReport {
    data: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCodec;

impl FrameCodec for SerialCodec {
    type Command = SerialCommand;

    fn name(&self) -> &'static str {
        "junkbot-usb"
    }

    fn encode(&self, command: &SerialCommand) -> Result<OutgoingFrame, EncodeError> {
        if command.params.len() > MAX_PARAMS {
            return Err(EncodeError::PayloadTooLong { len: command.params.len(), max: MAX_PARAMS });
        }
        check_range(&command.params, 0, 255)?;

        let mut bytes = Vec::with_capacity(FRAME_LEN);
        bytes.extend_from_slice(&[opcode::START, command.command, command.element]);
        for i in 0..MAX_PARAMS {
            bytes.push(command.params.get(i).copied().unwrap_or(0) as u8);
        }
        bytes.push(opcode::END);
        let crc = crc16_xmodem(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());

        Ok(OutgoingFrame::new(bytes))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Decoded, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        let report: BridgeReport = serde_json::from_slice(bytes)
            .map_err(|e| DecodeError::malformed(format!("bridge report: {}", e)))?;
        let data = report.data;
        if data.len() < REPORT_LEN {
            return Err(DecodeError::Truncated { needed: REPORT_LEN, actual: data.len() });
        }

        Ok(Decoded::Telemetry(vec![
            (Channel::DigitalIn, data[1]),
            (Channel::Distance, data[2]),
            (Channel::Potentiometer, data[3]),
            (Channel::Light, data[4]),
            (Channel::ServoPosition(1), data[5]),
            (Channel::ServoPosition(2), data[6]),
            (Channel::RgbRed(1), data[7]),
            (Channel::RgbGreen(1), data[8]),
            (Channel::RgbBlue(1), data[9]),
            (Channel::RgbRed(2), data[10]),
            (Channel::RgbGreen(2), data[11]),
            (Channel::RgbBlue(2), data[12]),
        ]))
    }
}

/// Check a received frame's trailing CRC.
pub fn verify_frame(frame: &[u8]) -> Result<(), DecodeError> {
    DecodeError::require_len(frame, FRAME_LEN)?;
    let expected = crc16_xmodem(&frame[..FRAME_LEN - 2]);
    let found = u16::from_be_bytes([frame[FRAME_LEN - 2], frame[FRAME_LEN - 1]]);
    if expected != found {
        return Err(DecodeError::Checksum { expected, found });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn servo_frame_carries_crc() {
        let frame = SerialCodec.encode(&SerialCommand::new(opcode::SET_SERVO, 1, [90])).unwrap();
        let bytes = frame.as_bytes();
        assert_eq!(&bytes[..8], &[0xF0, 0xF2, 1, 90, 0, 0, 0, 0xF7]);
        assert_eq!(bytes.len(), FRAME_LEN);
        assert!(verify_frame(bytes).is_ok());
    }

    #[test]
    fn corrupted_frame_fails_checksum() {
        let frame = SerialCodec.encode(&SerialCommand::new(opcode::SET_RGB, 2, [10, 20, 30])).unwrap();
        let mut bytes = frame.as_bytes().to_vec();
        bytes[3] ^= 0xFF;
        assert!(matches!(verify_frame(&bytes), Err(DecodeError::Checksum { .. })));
    }

    #[test]
    fn params_must_fit_a_byte() {
        let err = SerialCodec.encode(&SerialCommand::new(opcode::SET_SERVO, 1, [300])).unwrap_err();
        assert_eq!(err, EncodeError::ValueOutOfRange { index: 0, value: 300, min: 0, max: 255 });
    }

    #[test]
    fn bridge_report_maps_positions() {
        let json = br#"{"data":[0,5,120,512,300,90,45,255,0,128,1,2,3]}"#;
        let Decoded::Telemetry(fields) = SerialCodec.decode(json).unwrap() else {
            panic!("expected telemetry");
        };
        assert!(fields.contains(&(Channel::DigitalIn, 5.0)));
        assert!(fields.contains(&(Channel::Distance, 120.0)));
        assert!(fields.contains(&(Channel::ServoPosition(2), 45.0)));
        assert!(fields.contains(&(Channel::RgbRed(1), 255.0)));
        assert!(fields.contains(&(Channel::RgbBlue(2), 3.0)));
    }

    #[test]
    fn short_or_invalid_reports_are_errors() {
        assert_eq!(SerialCodec.decode(b""), Err(DecodeError::Empty));
        assert_eq!(
            SerialCodec.decode(br#"{"data":[1,2,3]}"#),
            Err(DecodeError::Truncated { needed: REPORT_LEN, actual: 3 })
        );
        assert!(matches!(SerialCodec.decode(b"{\"data\":"), Err(DecodeError::Malformed { .. })));
    }

    proptest! {
        #[test]
        fn every_encoded_frame_verifies(
            command in any::<u8>(),
            element in any::<u8>(),
            params in prop::collection::vec(0i64..=255, 0..=MAX_PARAMS),
        ) {
            let command = SerialCommand::new(command, element, params);
            let frame = SerialCodec.encode(&command).unwrap();
            prop_assert_eq!(&frame, &SerialCodec.encode(&command).unwrap());
            prop_assert!(verify_frame(frame.as_bytes()).is_ok());
        }

        #[test]
        fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = SerialCodec.decode(&data);
        }
    }
}
