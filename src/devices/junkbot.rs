//! Junkbot board over BLE.
//!
//! Every block sends one text command. Write blocks complete after a fixed
//! or text-length delay; read blocks ask the board for a value, wait for the
//! reply to land in the snapshot and then read it.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::codec::text::opcode;
use crate::codec::{TextCodec, TextCommand};
use crate::pacing::{Paced, paced, text_delay};
use crate::session::{PeripheralSession, PendingSend};
use crate::types::Channel;

/// Digital pins addressable by `READ_INPUT`; the command carries the index.
pub const DIGITAL_PINS: [u8; 8] = [6, 7, 8, 9, 10, 11, 12, 13];

const DIGITAL_READ_DELAY: Duration = Duration::from_millis(1000);
const ANALOG_READ_DELAY: Duration = Duration::from_millis(500);
const MOTOR_DELAY: Duration = Duration::from_millis(500);

const SERVO_MAX: i64 = 180;
const PWM_MAX: i64 = 255;
const SPEED_MAX: i64 = 255;

/// Expansion ports and the pin each one drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Port {
    B1,
    B2,
    B3,
    B4,
    B5,
    B6,
}

impl Port {
    pub const fn pin(self) -> u8 {
        match self {
            Port::B1 => 6,
            Port::B2 => 8,
            Port::B3 => 10,
            Port::B4 => 11,
            Port::B5 => 12,
            Port::B6 => 13,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Motor {
    A,
    B,
}

impl Motor {
    pub const fn pin(self) -> u8 {
        match self {
            Motor::A => 2,
            Motor::B => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorDirection {
    Clockwise,
    AntiClockwise,
}

impl MotorDirection {
    const fn code(self) -> i64 {
        match self {
            MotorDirection::Clockwise => 1,
            MotorDirection::AntiClockwise => 0,
        }
    }
}

/// Notes the buzzer block offers, two octaves from C2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Note {
    C2,
    D2,
    E2,
    F2,
    G2,
    A2,
    B2,
    C3,
    D3,
    E3,
    F3,
    G3,
    A3,
    B3,
    C4,
    D4,
    E4,
    F4,
    G4,
    A4,
    B4,
}

impl Note {
    /// Frequency in whole hertz
    pub const fn hz(self) -> u16 {
        match self {
            Note::C2 => 65,
            Note::D2 => 73,
            Note::E2 => 82,
            Note::F2 => 87,
            Note::G2 => 98,
            Note::A2 => 110,
            Note::B2 => 123,
            Note::C3 => 131,
            Note::D3 => 147,
            Note::E3 => 165,
            Note::F3 => 175,
            Note::G3 => 196,
            Note::A3 => 220,
            Note::B3 => 247,
            Note::C4 => 262,
            Note::D4 => 294,
            Note::E4 => 330,
            Note::F4 => 349,
            Note::G4 => 392,
            Note::A4 => 440,
            Note::B4 => 494,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Beat {
    Double,
    Whole,
    Half,
    Quarter,
    Eighth,
    Zero,
}

impl Beat {
    pub const fn millis(self) -> u64 {
        match self {
            Beat::Double => 2000,
            Beat::Whole => 1000,
            Beat::Half => 500,
            Beat::Quarter => 250,
            Beat::Eighth => 125,
            Beat::Zero => 0,
        }
    }
}

/// Block-level API for a Junkbot board on a [`TextCodec`] session.
#[derive(Debug, Clone)]
pub struct JunkbotBle {
    session: PeripheralSession<TextCodec>,
}

impl JunkbotBle {
    pub fn new(session: PeripheralSession<TextCodec>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &PeripheralSession<TextCodec> {
        &self.session
    }

    fn send(&self, op: u8, args: impl Into<Vec<i64>>) -> PendingSend {
        self.session.send(TextCommand::new(op, args))
    }

    pub fn digital_write(&self, pin: u8, high: bool) -> Paced<PendingSend> {
        let value = i64::from(high);
        paced(self.send(opcode::SET_OUTPUT, [pin as i64, value]), text_delay(value))
    }

    /// Point a servo on `port` at `angle` degrees, within 0..=180.
    pub fn set_servo(&self, port: Port, angle: i64) -> Paced<PendingSend> {
        let angle = angle.clamp(0, SERVO_MAX);
        paced(self.send(opcode::SET_SERVO, [port.pin() as i64, angle]), text_delay(angle))
    }

    /// Sound the buzzer on `port`; completes when the beat has played.
    pub fn play_tone(&self, port: Port, note: Note, beat: Beat) -> Paced<PendingSend> {
        let args = [port.pin() as i64, note.hz() as i64, beat.millis() as i64];
        paced(self.send(opcode::PLAY_TONE, args), Duration::from_millis(beat.millis()))
    }

    /// PWM duty on `pin`, within 0..=255.
    pub fn analog_write(&self, pin: u8, value: i64) -> Paced<PendingSend> {
        let value = value.clamp(0, PWM_MAX);
        paced(self.send(opcode::SET_PWM, [pin as i64, value]), text_delay(value))
    }

    /// Drive three PWM pins at once as `(pin, value)` pairs, typically an RGB LED.
    ///
    /// Values are clamped to 0..=255. Pacing follows the last value.
    pub fn set_rgb(&self, channels: [(u8, i64); 3]) -> Paced<PendingSend> {
        let channels = channels.map(|(pin, value)| (pin, value.clamp(0, PWM_MAX)));
        let args: Vec<i64> =
            channels.iter().flat_map(|&(pin, value)| [pin as i64, value]).collect();
        let delay = text_delay(channels[2].1);
        paced(self.send(opcode::SET_RGB, args), delay)
    }

    /// Run `motor` at `speed`, within 0..=255.
    pub fn run_motor(&self, motor: Motor, direction: MotorDirection, speed: i64) -> Paced<PendingSend> {
        let speed = speed.clamp(0, SPEED_MAX);
        let args = [motor.pin() as i64, direction.code(), speed];
        paced(self.send(opcode::SET_MOTOR, args), MOTOR_DELAY)
    }

    /// Whether digital `pin` reads high.
    ///
    /// Pins outside [`DIGITAL_PINS`] read low without touching the board.
    pub fn digital_read(&self, pin: u8) -> impl Future<Output = bool> + Send + 'static {
        let request = DIGITAL_PINS.iter().position(|&p| p == pin).map(|index| {
            let send = self.send(opcode::READ_INPUT, [index as i64]);
            (index, paced(send, DIGITAL_READ_DELAY))
        });
        let session = self.session.clone();

        async move {
            let Some((index, reply)) = request else {
                debug!(pin, "Not a digital input pin");
                return false;
            };
            reply.await;
            let pattern = 1u32 << index;
            ((session.read(Channel::DigitalIn) as u32) & pattern) == pattern
        }
    }

    pub fn analog_read(&self, pin: u8) -> impl Future<Output = f64> + Send + 'static {
        let reply = paced(self.send(opcode::READ_ANALOG, [pin as i64]), ANALOG_READ_DELAY);
        let session = self.session.clone();
        async move {
            reply.await;
            session.read(Channel::Analog)
        }
    }

    /// Trigger the ultrasonic sensor whose echo is on `echo` (trigger on the next pin).
    pub fn read_ultrasound(&self, echo: u8) -> impl Future<Output = f64> + Send + 'static {
        let echo = echo as i64;
        let reply = paced(self.send(opcode::READ_DISTANCE, [echo + 1, echo]), ANALOG_READ_DELAY);
        let session = self.session.clone();
        async move {
            reply.await;
            session.read(Channel::Distance)
        }
    }
}
