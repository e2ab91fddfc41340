//! Command facades: the block-level API for each device family.
//!
//! A facade turns one user-level action ("turn motor A clockwise for one
//! second") into codec commands on a [`crate::PeripheralSession`] and decides
//! how long the action takes to complete. Facades never fail: whatever the
//! session does with a command, the caller gets a value back.
//!
//! Write operations enqueue their command when called, so the order of calls
//! is the order on the wire. The returned future only paces completion;
//! dropping it does not cancel the send. Read operations return futures that
//! wait out the device's response delay and then consult the telemetry
//! snapshot.
//!
//! | Facade | Codec | Preset |
//! |--------|-------|--------|
//! | [`JunkbotBle`] | [`crate::codec::TextCodec`] | [`crate::SessionConfig::junkbot_ble`] |
//! | [`Microbit`] | [`crate::codec::MicrobitCodec`] | [`crate::SessionConfig::microbit`] |
//! | [`JbBrick`] | [`crate::codec::DirectCodec`] | [`crate::SessionConfig::jb_bluetooth`] |
//! | [`JunkbotUsb`] | [`crate::codec::SerialCodec`] | [`crate::SessionConfig::junkbot_usb`] |

pub mod jb;
pub mod junkbot;
pub mod junkbot_usb;
pub mod microbit;

pub use jb::{JbBrick, JbDevice, JbMotor, MotorPort, Rotation};
pub use junkbot::{Beat, JunkbotBle, MotorDirection, Note, Port};
pub use junkbot_usb::{
    AnalogInput, Animation, DfPlayerCommand, DigitalInput, JunkbotUsb, LedDirection, Rgb,
    RgbChannel, RgbLed, Servo,
};
pub use microbit::{Button, Gesture, Microbit, TiltDirection};

/// Scratch's rounding: halves round toward positive infinity.
pub(crate) fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_round_up_even_when_negative() {
        assert_eq!(round_half_up(2.5), 3.0);
        assert_eq!(round_half_up(-2.5), -2.0);
        assert_eq!(round_half_up(-30.0), -30.0);
        assert_eq!(round_half_up(29.4), 29.0);
    }
}
