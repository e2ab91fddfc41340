//! JB brick direct commands over classic Bluetooth.
//!
//! A direct command is a small bytecode program with a seven byte header:
//!
//! ```text
//! 0..2  size, little-endian, excluding these two bytes
//! 2..4  message counter, little-endian, echoed in the reply
//! 4     type: 0x00 reply expected, 0x80 no reply
//! 5..7  global/local variable allocation
//! 7..   bytecodes
//! ```
//!
//! Replies carry the reserved global variables from byte 5 onwards. The
//! message counter identifies which poll a reply answers, so the codec can
//! decode replies without remembering what it last sent.

use super::{Decoded, FrameCodec};
use crate::error::{DecodeError, EncodeError};
use crate::types::{Channel, OutgoingFrame};

/// Counter tagging a device-list poll
pub const COUNTER_DEVICE_LIST: u16 = 1;
/// Counter tagging a sensor/motor value poll
pub const COUNTER_VALUES: u16 = 2;

/// Reply type byte for a successful direct reply
pub const DIRECT_REPLY: u8 = 0x02;

pub const HEADER_LEN: usize = 7;
const REPLY_HEADER_LEN: usize = 5;
const DEVICE_LIST_REPLY_LEN: usize = 25;
const VALUES_REPLY_LEN: usize = 37;
const MAX_BYTECODES: usize = u16::MAX as usize - (HEADER_LEN - 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectKind {
    Reply,
    NoReply,
}

impl DirectKind {
    pub const fn byte(self) -> u8 {
        match self {
            DirectKind::Reply => 0x00,
            DirectKind::NoReply => 0x80,
        }
    }
}

/// One direct command: header fields plus compound bytecodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectCommand {
    pub kind: DirectKind,
    pub counter: u16,
    /// Bytes of global variable space reserved for the reply
    pub allocation: u16,
    pub bytecodes: Vec<u8>,
}

impl DirectCommand {
    /// Fire-and-forget command
    pub fn no_reply(bytecodes: Vec<u8>) -> Self {
        Self { kind: DirectKind::NoReply, counter: 0, allocation: 0, bytecodes }
    }

    /// Command whose reply fills `allocation` bytes of globals, tagged with `counter`
    pub fn with_reply(counter: u16, allocation: u16, bytecodes: Vec<u8>) -> Self {
        Self { kind: DirectKind::Reply, counter, allocation, bytecodes }
    }
}

/// Opcodes, parameter encodings and builders for the bytecodes the facades use.
pub mod bytecode {
    pub const OPOUTPUT_TIME_SPEED: u8 = 0xAF;
    pub const OPOUTPUT_STOP: u8 = 0xA3;
    pub const OPOUTPUT_GET_COUNT: u8 = 0xB3;
    pub const OPSOUND: u8 = 0x94;
    pub const OPSOUND_CMD_STOP: u8 = 0;
    pub const OPSOUND_CMD_TONE: u8 = 1;
    pub const OPINPUT_DEVICE_LIST: u8 = 0x98;
    pub const OPINPUT_READSI: u8 = 0x9D;

    /// Long-format parameter prefixes
    pub const ONE_BYTE: u8 = 0x81;
    pub const TWO_BYTES: u8 = 0x82;
    pub const FOUR_BYTES: u8 = 0x83;
    pub const GLOBAL_VARIABLE_ONE_BYTE: u8 = 0xE1;
    pub const GLOBAL_CONSTANT_INDEX_0: u8 = 0x20;
    pub const GLOBAL_VARIABLE_INDEX_0: u8 = 0x60;

    /// Daisy-chain layer; chained bricks are not supported
    pub const LAYER: u8 = 0;
    pub const COAST: u8 = 0;
    pub const BRAKE: u8 = 1;
    pub const DO_NOT_CHANGE_TYPE: u8 = 0;
    pub const MAX_DEVICES: u8 = 32;

    /// Global bytes a device-list reply fills
    pub const DEVICE_LIST_ALLOCATION: u16 = 33;

    /// Ramp up and ramp down time for timed motor runs, in milliseconds
    pub const RAMP_MS: u32 = 50;

    /// Output bit field for a zero-based motor port
    pub const fn port_mask(port: u8) -> u8 {
        1 << port
    }

    /// Run a motor for `millis` at signed `speed` (-100..=100), then brake.
    ///
    /// The run is split into a ramp up, a steady phase and a ramp down of
    /// [`RAMP_MS`] each, shrinking the ramps evenly when the run is shorter.
    pub fn output_time_speed(port: u8, speed: i8, millis: u32) -> Vec<u8> {
        let (ramp_up, run, ramp_down) = if millis < RAMP_MS * 2 {
            let up = millis / 2;
            (up, 0, millis - up)
        } else {
            (RAMP_MS, millis - RAMP_MS * 2, RAMP_MS)
        };

        let mut codes = vec![
            OPOUTPUT_TIME_SPEED,
            LAYER,
            port_mask(port),
            ONE_BYTE,
            speed as u8,
            ONE_BYTE,
            ramp_up as u8,
        ];
        if run < 0x7FFF {
            codes.push(TWO_BYTES);
            codes.extend_from_slice(&(run as u16).to_le_bytes());
        } else {
            codes.push(FOUR_BYTES);
            codes.extend_from_slice(&run.to_le_bytes());
        }
        codes.extend_from_slice(&[ONE_BYTE, ramp_down as u8, BRAKE]);
        codes
    }

    /// Let a motor spin down freely
    pub fn output_coast(port: u8) -> Vec<u8> {
        output_coast_mask(port_mask(port))
    }

    /// Let every motor in the `mask` bit field spin down freely
    pub fn output_coast_mask(mask: u8) -> Vec<u8> {
        vec![OPOUTPUT_STOP, LAYER, mask, COAST]
    }

    /// Play a tone at `freq` Hz for `millis` at volume 2
    pub fn sound_tone(freq: u16, millis: u16) -> Vec<u8> {
        let [f_lo, f_hi] = freq.to_le_bytes();
        let [t_lo, t_hi] = millis.to_le_bytes();
        vec![OPSOUND, OPSOUND_CMD_TONE, ONE_BYTE, 2, TWO_BYTES, f_lo, f_hi, TWO_BYTES, t_lo, t_hi]
    }

    pub fn sound_stop() -> Vec<u8> {
        vec![OPSOUND, OPSOUND_CMD_STOP]
    }

    /// List the device type on every port
    pub fn device_list() -> Vec<u8> {
        vec![
            OPINPUT_DEVICE_LIST,
            ONE_BYTE,
            MAX_DEVICES,
            GLOBAL_VARIABLE_INDEX_0,
            GLOBAL_VARIABLE_ONE_BYTE,
            GLOBAL_CONSTANT_INDEX_0,
        ]
    }

    /// Read a sensor in SI units into the global at `global_index`
    pub fn read_si(port: u8, mode: u8, global_index: u8) -> Vec<u8> {
        vec![
            OPINPUT_READSI,
            LAYER,
            port,
            DO_NOT_CHANGE_TYPE,
            mode,
            GLOBAL_VARIABLE_ONE_BYTE,
            global_index,
        ]
    }

    /// Read a motor's tacho count into the global at `global_index`
    pub fn get_count(port: u8, global_index: u8) -> Vec<u8> {
        vec![OPOUTPUT_GET_COUNT, LAYER, port, GLOBAL_VARIABLE_ONE_BYTE, global_index]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DirectCodec;

impl DirectCodec {
    fn decode_device_list(bytes: &[u8]) -> Result<Decoded, DecodeError> {
        DecodeError::require_len(bytes, DEVICE_LIST_REPLY_LEN)?;
        let mut fields = Vec::with_capacity(8);
        for port in 0..4u8 {
            let i = port as usize;
            fields.push((Channel::SensorType(port), bytes[5 + i] as f64));
            fields.push((Channel::MotorType(port), bytes[21 + i] as f64));
        }
        Ok(Decoded::Telemetry(fields))
    }

    fn decode_values(bytes: &[u8]) -> Result<Decoded, DecodeError> {
        DecodeError::require_len(bytes, VALUES_REPLY_LEN)?;
        let mut fields = Vec::with_capacity(8);
        for port in 0..4u8 {
            let sensor_at = 5 + port as usize * 4;
            let motor_at = 21 + port as usize * 4;
            let sensor = f32::from_le_bytes(word(bytes, sensor_at)?);
            let tacho = i32::from_le_bytes(word(bytes, motor_at)?);
            // Empty ports report NaN
            let sensor = if sensor.is_finite() { sensor as f64 } else { 0.0 };
            fields.push((Channel::SensorValue(port), sensor));
            fields.push((Channel::MotorPosition(port), tacho as f64));
        }
        Ok(Decoded::Telemetry(fields))
    }
}

fn word(bytes: &[u8], at: usize) -> Result<[u8; 4], DecodeError> {
    bytes
        .get(at..at + 4)
        .and_then(|slice| slice.try_into().ok())
        .ok_or(DecodeError::Truncated { needed: at + 4, actual: bytes.len() })
}

impl FrameCodec for DirectCodec {
    type Command = DirectCommand;

    fn name(&self) -> &'static str {
        "jb-direct"
    }

    fn encode(&self, command: &DirectCommand) -> Result<OutgoingFrame, EncodeError> {
        if command.bytecodes.len() > MAX_BYTECODES {
            return Err(EncodeError::PayloadTooLong {
                len: command.bytecodes.len(),
                max: MAX_BYTECODES,
            });
        }

        let size = (HEADER_LEN - 2 + command.bytecodes.len()) as u16;
        let mut bytes = Vec::with_capacity(HEADER_LEN + command.bytecodes.len());
        bytes.extend_from_slice(&size.to_le_bytes());
        bytes.extend_from_slice(&command.counter.to_le_bytes());
        bytes.push(command.kind.byte());
        bytes.extend_from_slice(&command.allocation.to_le_bytes());
        bytes.extend_from_slice(&command.bytecodes);
        Ok(OutgoingFrame::new(bytes))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Decoded, DecodeError> {
        DecodeError::require_len(bytes, REPLY_HEADER_LEN)?;
        if bytes[4] != DIRECT_REPLY {
            return Ok(Decoded::Ignored);
        }
        match u16::from_le_bytes([bytes[2], bytes[3]]) {
            COUNTER_DEVICE_LIST => Self::decode_device_list(bytes),
            COUNTER_VALUES => Self::decode_values(bytes),
            _ => Ok(Decoded::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reply(counter: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&((3 + body.len()) as u16).to_le_bytes());
        bytes.extend_from_slice(&counter.to_le_bytes());
        bytes.push(DIRECT_REPLY);
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn header_carries_size_counter_and_allocation() {
        let command = DirectCommand::with_reply(
            COUNTER_DEVICE_LIST,
            bytecode::DEVICE_LIST_ALLOCATION,
            bytecode::device_list(),
        );
        let frame = DirectCodec.encode(&command).unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[11, 0, 1, 0, 0x00, 33, 0, 0x98, 0x81, 32, 0x60, 0xE1, 0x20]
        );
    }

    #[test]
    fn timed_run_splits_into_ramps() {
        let codes = bytecode::output_time_speed(1, -50, 1000);
        assert_eq!(
            codes,
            vec![0xAF, 0, 0b10, 0x81, 0xCE, 0x81, 50, 0x82, 0x84, 0x03, 0x81, 50, 1]
        );

        // shorter than both ramps: split evenly, no steady phase
        let short = bytecode::output_time_speed(0, 100, 41);
        assert_eq!(&short[5..], &[0x81, 20, 0x82, 0, 0, 0x81, 21, 1]);
    }

    #[test]
    fn device_list_reply_reports_port_types() {
        let mut body = vec![126u8; 32];
        body[0] = 16; // touch on sensor port 1
        body[2] = 30; // ultrasonic on port 3
        body[16] = 7; // large motor on A
        let Decoded::Telemetry(fields) = DirectCodec.decode(&reply(COUNTER_DEVICE_LIST, &body)).unwrap()
        else {
            panic!("expected telemetry");
        };
        assert!(fields.contains(&(Channel::SensorType(0), 16.0)));
        assert!(fields.contains(&(Channel::SensorType(2), 30.0)));
        assert!(fields.contains(&(Channel::MotorType(0), 7.0)));
        assert!(fields.contains(&(Channel::MotorType(3), 126.0)));
    }

    #[test]
    fn values_reply_reports_floats_and_tacho() {
        let mut body = Vec::new();
        for value in [1.0f32, 0.0, 37.5, f32::NAN] {
            body.extend_from_slice(&value.to_le_bytes());
        }
        for tacho in [720i32, -90, 0, 5] {
            body.extend_from_slice(&tacho.to_le_bytes());
        }
        let Decoded::Telemetry(fields) = DirectCodec.decode(&reply(COUNTER_VALUES, &body)).unwrap()
        else {
            panic!("expected telemetry");
        };
        assert!(fields.contains(&(Channel::SensorValue(0), 1.0)));
        assert!(fields.contains(&(Channel::SensorValue(2), 37.5)));
        assert!(fields.contains(&(Channel::SensorValue(3), 0.0)));
        assert!(fields.contains(&(Channel::MotorPosition(1), -90.0)));
    }

    #[test]
    fn unknown_reply_type_or_counter_is_ignored() {
        let mut error_reply = reply(COUNTER_VALUES, &[0; 32]);
        error_reply[4] = 0x04;
        assert_eq!(DirectCodec.decode(&error_reply), Ok(Decoded::Ignored));
        assert_eq!(DirectCodec.decode(&reply(99, &[0; 32])), Ok(Decoded::Ignored));
    }

    #[test]
    fn truncated_values_reply_is_an_error() {
        assert_eq!(
            DirectCodec.decode(&reply(COUNTER_VALUES, &[0; 20])),
            Err(DecodeError::Truncated { needed: VALUES_REPLY_LEN, actual: 25 })
        );
    }

    proptest! {
        #[test]
        fn short_buffers_are_errors(data in prop::collection::vec(any::<u8>(), 0..REPLY_HEADER_LEN)) {
            prop_assert!(DirectCodec.decode(&data).is_err());
        }

        #[test]
        fn encode_is_deterministic(counter in any::<u16>(), codes in prop::collection::vec(any::<u8>(), 0..64)) {
            let command = DirectCommand::with_reply(counter, 16, codes);
            let first = DirectCodec.encode(&command).unwrap();
            prop_assert_eq!(&first, &DirectCodec.encode(&command).unwrap());
            let size = u16::from_le_bytes([first.as_bytes()[0], first.as_bytes()[1]]) as usize;
            prop_assert_eq!(size, first.len() - 2);
        }
    }
}
