//! Named telemetry channels

use serde::{Deserialize, Serialize};
use std::fmt;

/// A named telemetry channel.
///
/// Indexed variants address one of several identical sensors or actuators
/// (touch pin 0-2, servo 1-2, motor port 0-3, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    /// Accelerometer X axis, tenths of a degree
    TiltX,
    /// Accelerometer Y axis, tenths of a degree
    TiltY,
    ButtonA,
    ButtonB,
    TouchPin(u8),
    /// Gesture bit set (bit 0 moved, bit 1 shaken, bit 2 jumped)
    Gesture,
    /// Digital input bit field, one bit per input pin
    DigitalIn,
    Distance,
    Analog,
    Potentiometer,
    Light,
    Brightness,
    ServoPosition(u8),
    RgbRed(u8),
    RgbGreen(u8),
    RgbBlue(u8),
    /// Device type code reported for a sensor port
    SensorType(u8),
    /// Raw value reported for a sensor port
    SensorValue(u8),
    /// Device type code reported for a motor port
    MotorType(u8),
    /// Accumulated tacho count for a motor port
    MotorPosition(u8),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::TiltX => f.write_str("tiltX"),
            Channel::TiltY => f.write_str("tiltY"),
            Channel::ButtonA => f.write_str("buttonA"),
            Channel::ButtonB => f.write_str("buttonB"),
            Channel::TouchPin(i) => write!(f, "touchPin[{i}]"),
            Channel::Gesture => f.write_str("gesture"),
            Channel::DigitalIn => f.write_str("digitalIn"),
            Channel::Distance => f.write_str("distance"),
            Channel::Analog => f.write_str("analog"),
            Channel::Potentiometer => f.write_str("potentiometer"),
            Channel::Light => f.write_str("light"),
            Channel::Brightness => f.write_str("brightness"),
            Channel::ServoPosition(i) => write!(f, "servoPosition[{i}]"),
            Channel::RgbRed(i) => write!(f, "rgbRed[{i}]"),
            Channel::RgbGreen(i) => write!(f, "rgbGreen[{i}]"),
            Channel::RgbBlue(i) => write!(f, "rgbBlue[{i}]"),
            Channel::SensorType(i) => write!(f, "sensorType[{i}]"),
            Channel::SensorValue(i) => write!(f, "sensorValue[{i}]"),
            Channel::MotorType(i) => write!(f, "motorType[{i}]"),
            Channel::MotorPosition(i) => write!(f, "motorPosition[{i}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_camel_case_names_with_indices() {
        assert_eq!(Channel::TiltX.to_string(), "tiltX");
        assert_eq!(Channel::MotorPosition(2).to_string(), "motorPosition[2]");
        assert_eq!(Channel::TouchPin(0).to_string(), "touchPin[0]");
    }
}
