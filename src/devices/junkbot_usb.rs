//! Junkbot board over USB, through the local WebSocket bridge.
//!
//! Commands are fire-and-forget: a block completes as soon as the session
//! has decided what to do with its frame. The bridge streams board state
//! continuously, so readers are snapshot lookups.
//!
//! The board reports the colors its two RGB LEDs show. Channel blocks
//! (`set_rgb_channel`, `add_to_rgb_channel`) modify one channel of that
//! color, so the facade keeps its own copy, refreshed whenever a new report
//! has arrived since it last looked.

use rand::Rng;
use std::sync::{Mutex, PoisonError};
use tracing::trace;

use crate::codec::serial::opcode;
use crate::codec::{SerialCodec, SerialCommand};
use crate::session::{PeripheralSession, PendingSend};
use crate::types::{Channel, TelemetrySnapshot};

const SERVO_MAX: i64 = 180;
/// Largest distance the ultrasonic sensor reports as a real reading
const DISTANCE_MAX: f64 = 255.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    fn channel_mut(&mut self, channel: RgbChannel) -> &mut u8 {
        match channel {
            RgbChannel::Red => &mut self.r,
            RgbChannel::Green => &mut self.g,
            RgbChannel::Blue => &mut self.b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RgbLed {
    Rgb1,
    Rgb2,
}

impl RgbLed {
    /// Element number on the wire and in telemetry
    pub const fn number(self) -> u8 {
        match self {
            RgbLed::Rgb1 => 1,
            RgbLed::Rgb2 => 2,
        }
    }

    const fn slot(self) -> usize {
        self.number() as usize - 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RgbChannel {
    Red,
    Green,
    Blue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Servo {
    Motor1,
    Motor2,
}

impl Servo {
    pub const fn number(self) -> u8 {
        match self {
            Servo::Motor1 => 1,
            Servo::Motor2 => 2,
        }
    }
}

/// Built-in LED strip animations, in firmware order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Animation {
    Off,
    Fire,
    Besin,
    Heartbeat,
    Gradient,
    Sinelon,
    Bpm,
    Confetti,
    Glitter,
    Juggle,
    Onesine,
    Plasma,
}

impl Animation {
    pub const fn index(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedDirection {
    Left,
    Right,
}

impl LedDirection {
    const fn code(self) -> i64 {
        match self {
            LedDirection::Left => 0,
            LedDirection::Right => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DfPlayerCommand {
    Play,
    Stop,
    Next,
    Previous,
}

impl DfPlayerCommand {
    const fn code(self) -> u8 {
        match self {
            DfPlayerCommand::Play => opcode::DFP_PLAY,
            DfPlayerCommand::Stop => opcode::DFP_PAUSE,
            DfPlayerCommand::Next => opcode::DFP_NEXT,
            DfPlayerCommand::Previous => opcode::DFP_PREV,
        }
    }
}

/// Digital inputs, reported as one bit each in `digitalIn`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigitalInput {
    A,
    B,
    C,
    D,
}

impl DigitalInput {
    const fn bit(self) -> u32 {
        match self {
            DigitalInput::A => 0,
            DigitalInput::B => 1,
            DigitalInput::C => 2,
            DigitalInput::D => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalogInput {
    Potentiometer,
    Light,
}

#[derive(Debug, Default)]
struct LedState {
    colors: [Rgb; 2],
    /// Snapshot frame count the colors were last refreshed from
    synced_frame: u64,
}

impl LedState {
    fn sync(&mut self, snapshot: &TelemetrySnapshot) {
        if snapshot.frame_count() == self.synced_frame {
            return;
        }
        self.synced_frame = snapshot.frame_count();
        for led in [RgbLed::Rgb1, RgbLed::Rgb2] {
            let n = led.number();
            self.colors[led.slot()] = Rgb::new(
                snapshot.get(Channel::RgbRed(n)) as u8,
                snapshot.get(Channel::RgbGreen(n)) as u8,
                snapshot.get(Channel::RgbBlue(n)) as u8,
            );
        }
    }
}

/// Scale a 0..=100 percentage to a 0..=255 output value.
fn percent_to_byte(percent: f64) -> i64 {
    (percent * 255.0 / 100.0).clamp(0.0, 255.0).round() as i64
}

/// Block-level API for a Junkbot USB board on a [`SerialCodec`] session.
#[derive(Debug)]
pub struct JunkbotUsb {
    session: PeripheralSession<SerialCodec>,
    leds: Mutex<LedState>,
}

impl JunkbotUsb {
    pub fn new(session: PeripheralSession<SerialCodec>) -> Self {
        Self { session, leds: Mutex::new(LedState::default()) }
    }

    pub fn session(&self) -> &PeripheralSession<SerialCodec> {
        &self.session
    }

    fn send(&self, command: u8, element: u8, params: impl Into<Vec<i64>>) -> PendingSend {
        self.session.send(SerialCommand::new(command, element, params))
    }

    /// Move a servo to `position` (clamped to 0..=180); skipped when the board
    /// already reports it there.
    pub fn servo_write(&self, servo: Servo, position: i64) -> Option<PendingSend> {
        let position = position.clamp(0, SERVO_MAX);
        if position == self.servo_position(servo) {
            trace!(servo = servo.number(), position, "Servo already in position");
            return None;
        }
        Some(self.send(opcode::SET_SERVO, servo.number(), [position]))
    }

    /// Move a servo by `delta` degrees from its reported position, within 0..=180.
    pub fn servo_move(&self, servo: Servo, delta: i64) -> Option<PendingSend> {
        let current = self.servo_position(servo);
        let target = current.saturating_add(delta).clamp(0, SERVO_MAX);
        if target == current {
            return None;
        }
        Some(self.send(opcode::SET_SERVO, servo.number(), [target]))
    }

    /// Reported servo angle in degrees
    pub fn servo_position(&self, servo: Servo) -> i64 {
        self.session.read(Channel::ServoPosition(servo.number())) as i64
    }

    pub fn set_animation(&self, animation: Animation) -> PendingSend {
        self.send(opcode::SET_ANIM, opcode::ANIM_NUM, [animation.index() as i64])
    }

    /// Light the first `count` LEDs of the strip
    pub fn leds_on(&self, count: i64) -> PendingSend {
        self.send(opcode::SET_ANIM, opcode::LEDS_ON, [count])
    }

    pub fn leds_move(&self, steps: i64, direction: LedDirection) -> PendingSend {
        self.send(opcode::SET_ANIM, opcode::LEDS_MOVE, [steps, direction.code()])
    }

    fn update_led(&self, led: RgbLed, update: impl FnOnce(&mut Rgb)) -> PendingSend {
        let color = {
            let mut leds = self.leds.lock().unwrap_or_else(PoisonError::into_inner);
            leds.sync(&self.session.snapshot());
            let color = &mut leds.colors[led.slot()];
            update(color);
            *color
        };
        let params = [color.r as i64, color.g as i64, color.b as i64];
        self.send(opcode::SET_RGB, led.number(), params)
    }

    pub fn set_rgb_color(&self, led: RgbLed, color: Rgb) -> PendingSend {
        self.update_led(led, |current| *current = color)
    }

    /// Set one channel from a 0..=100 percentage, keeping the others.
    pub fn set_rgb_channel(&self, led: RgbLed, channel: RgbChannel, percent: f64) -> PendingSend {
        let value = percent_to_byte(percent) as u8;
        self.update_led(led, |color| *color.channel_mut(channel) = value)
    }

    /// Add `delta` to one channel, wrapping modulo 256.
    pub fn add_to_rgb_channel(&self, led: RgbLed, channel: RgbChannel, delta: i64) -> PendingSend {
        self.update_led(led, |color| {
            let value = color.channel_mut(channel);
            *value = ((*value as i64).saturating_add(delta) % 256).unsigned_abs() as u8;
        })
    }

    pub fn set_random_rgb(&self, led: RgbLed) -> PendingSend {
        let mut rng = rand::thread_rng();
        let color = Rgb::new(rng.r#gen(), rng.r#gen(), rng.r#gen());
        self.update_led(led, |current| *current = color)
    }

    /// Current color of an RGB LED, as last reported or set.
    pub fn rgb(&self, led: RgbLed) -> Rgb {
        let mut leds = self.leds.lock().unwrap_or_else(PoisonError::into_inner);
        leds.sync(&self.session.snapshot());
        leds.colors[led.slot()]
    }

    pub fn dfplayer(&self, command: DfPlayerCommand) -> PendingSend {
        self.send(opcode::DFP_MSG, command.code(), [0])
    }

    pub fn set_volume(&self, volume: i64) -> PendingSend {
        self.send(opcode::DFP_MSG, opcode::DFP_VOLUME, [volume])
    }

    pub fn play_song(&self, song: i64) -> PendingSend {
        self.send(opcode::DFP_MSG, opcode::DFP_PLAY_SONG, [song])
    }

    /// Drive PWM output `pin` at a 0..=100 percentage of full scale.
    pub fn analog_write(&self, pin: u8, percent: f64) -> PendingSend {
        self.send(opcode::SET_PWM, pin, [percent_to_byte(percent)])
    }

    /// Whether a digital input is active. Inputs are active-low.
    pub fn is_digital_active(&self, input: DigitalInput) -> bool {
        ((self.session.read(Channel::DigitalIn) as u32) >> input.bit()) & 1 == 0
    }

    pub fn analog(&self, input: AnalogInput) -> f64 {
        match input {
            AnalogInput::Potentiometer => self.session.read(Channel::Potentiometer),
            AnalogInput::Light => self.session.read(Channel::Light),
        }
    }

    /// Ultrasonic distance, or `None` when the sensor reports out of range.
    pub fn distance(&self) -> Option<f64> {
        let distance = self.session.read(Channel::Distance);
        (distance <= DISTANCE_MAX).then_some(distance)
    }
}
