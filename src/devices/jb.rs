//! JB brick over classic Bluetooth.
//!
//! The brick only answers when asked, so [`JbBrick`] runs a background
//! poller while the session is connected: every 20th tick it asks which
//! device sits on each port, every other tick it reads the sensors it found
//! and all four motor tacho counts. Blocks read the results from the
//! telemetry snapshot.
//!
//! Timed motor runs brake on their own; one second after the run ends the
//! motor is set to coast unless a newer command for that motor arrived in
//! the meantime.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI8, AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::{MissedTickBehavior, Sleep, interval, sleep};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, trace};

use crate::codec::direct::{COUNTER_DEVICE_LIST, COUNTER_VALUES};
use crate::codec::{DirectCodec, DirectCommand, bytecode};
use crate::pacing::{Paced, paced};
use crate::session::{PeripheralSession, PendingSend, SessionState};
use crate::types::{Channel, Generation, TelemetrySnapshot};

pub const POLL_INTERVAL: Duration = Duration::from_millis(150);
/// The device list is refreshed on every n-th poll
pub const DEVICE_LIST_EVERY: u64 = 20;

/// Global bytes a values reply fills: four sensors and four motors
const VALUES_ALLOCATION: u16 = 32;
const COAST_DELAY: Duration = Duration::from_millis(1000);
const MAX_TURN_MS: f64 = 15_000.0;
const MAX_BEEP_MS: f64 = 3_000.0;
const DEFAULT_POWER: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotorPort {
    A,
    B,
    C,
    D,
}

impl MotorPort {
    pub const ALL: [MotorPort; 4] = [MotorPort::A, MotorPort::B, MotorPort::C, MotorPort::D];

    /// Zero-based output port
    pub const fn index(self) -> u8 {
        match self {
            MotorPort::A => 0,
            MotorPort::B => 1,
            MotorPort::C => 2,
            MotorPort::D => 3,
        }
    }
}

impl fmt::Display for MotorPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MotorPort::A => "A",
            MotorPort::B => "B",
            MotorPort::C => "C",
            MotorPort::D => "D",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    Clockwise,
    CounterClockwise,
}

impl Rotation {
    const fn sign(self) -> i8 {
        match self {
            Rotation::Clockwise => 1,
            Rotation::CounterClockwise => -1,
        }
    }
}

/// Device type the brick reports on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JbDevice {
    Touch,
    Color,
    Ultrasonic,
    Gyro,
    MediumMotor,
    LargeMotor,
    /// Empty port, or a device this crate does not know
    None,
}

impl JbDevice {
    pub fn from_code(code: f64) -> Self {
        match code as u8 {
            16 => JbDevice::Touch,
            29 => JbDevice::Color,
            30 => JbDevice::Ultrasonic,
            32 => JbDevice::Gyro,
            8 => JbDevice::MediumMotor,
            7 => JbDevice::LargeMotor,
            _ => JbDevice::None,
        }
    }

    /// Sensor mode used when polling this device
    pub const fn mode(self) -> u8 {
        match self {
            JbDevice::Color | JbDevice::Ultrasonic => 1,
            _ => 0,
        }
    }
}

/// Per-motor settings that persist between blocks.
#[derive(Debug)]
pub struct JbMotor {
    port: MotorPort,
    direction: AtomicI8,
    power: AtomicU8,
    /// Advanced by every run so stale coasts can tell they were superseded
    commands: Generation,
}

impl JbMotor {
    fn new(port: MotorPort) -> Self {
        Self {
            port,
            direction: AtomicI8::new(1),
            power: AtomicU8::new(DEFAULT_POWER),
            commands: Generation::new(),
        }
    }

    pub fn port(&self) -> MotorPort {
        self.port
    }

    pub fn rotation(&self) -> Rotation {
        if self.direction.load(Ordering::Relaxed) < 0 {
            Rotation::CounterClockwise
        } else {
            Rotation::Clockwise
        }
    }

    fn set_rotation(&self, rotation: Rotation) {
        self.direction.store(rotation.sign(), Ordering::Relaxed);
    }

    /// Power in percent, 0..=100
    pub fn power(&self) -> u8 {
        self.power.load(Ordering::Relaxed)
    }

    fn set_power(&self, power: u8) {
        self.power.store(power.min(100), Ordering::Relaxed);
    }
}

/// Block-level API for a JB brick on a [`DirectCodec`] session.
///
/// Creating one starts the poller; dropping it stops the poller and any
/// pending coasts.
#[derive(Debug)]
pub struct JbBrick {
    session: PeripheralSession<DirectCodec>,
    motors: Arc<[JbMotor; 4]>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl JbBrick {
    /// Wrap `session` and start polling. Must be called within a tokio runtime.
    pub fn new(session: PeripheralSession<DirectCodec>) -> Self {
        let cancel = CancellationToken::new();
        tokio::spawn(poll_brick(session.clone(), cancel.clone()));

        Self {
            session,
            motors: Arc::new(MotorPort::ALL.map(JbMotor::new)),
            _guard: cancel.clone().drop_guard(),
            cancel,
        }
    }

    pub fn session(&self) -> &PeripheralSession<DirectCodec> {
        &self.session
    }

    pub fn motor(&self, port: MotorPort) -> &JbMotor {
        &self.motors[port.index() as usize]
    }

    /// Device on a motor port, from the last device list.
    pub fn motor_device(&self, port: MotorPort) -> JbDevice {
        JbDevice::from_code(self.session.read(Channel::MotorType(port.index())))
    }

    /// Device on sensor port `port` (0..=3), from the last device list.
    pub fn sensor_device(&self, port: u8) -> JbDevice {
        if port > 3 {
            return JbDevice::None;
        }
        JbDevice::from_code(self.session.read(Channel::SensorType(port)))
    }

    fn has_motor(&self, port: MotorPort) -> bool {
        self.motor_device(port) != JbDevice::None
    }

    /// Run a motor for `secs` (clamped to 0..=15) in `rotation` at its set power.
    ///
    /// The returned timer fires when the run time has elapsed, whether or
    /// not a motor is attached.
    pub fn motor_turn(&self, port: MotorPort, rotation: Rotation, secs: f64) -> Sleep {
        let millis = (secs * 1000.0).clamp(0.0, MAX_TURN_MS) as u32;
        let motor = self.motor(port);
        motor.set_rotation(rotation);

        if self.has_motor(port) {
            self.turn_on_for(motor, millis);
        } else {
            debug!(port = %port, "No motor attached, run skipped");
        }
        sleep(Duration::from_millis(millis as u64))
    }

    fn turn_on_for(&self, motor: &JbMotor, millis: u32) {
        let power = motor.power();
        if power == 0 {
            return;
        }
        let speed = power as i8 * motor.rotation().sign();
        let run = bytecode::output_time_speed(motor.port.index(), speed, millis);
        let _ = self.session.send(DirectCommand::no_reply(run));
        self.coast_after(motor.port, millis);
    }

    fn coast_after(&self, port: MotorPort, millis: u32) {
        let ticket = self.motor(port).commands.advance();
        let wait = Duration::from_millis(millis as u64) + COAST_DELAY;
        let motors = self.motors.clone();
        let session = self.session.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(wait) => {}
            }
            let motor = &motors[port.index() as usize];
            if !motor.commands.is_current(ticket) {
                trace!(port = %port, generation = ticket.value(), "Coast superseded");
                return;
            }
            if motor.power() == 0 {
                return;
            }
            let coast = DirectCommand::no_reply(bytecode::output_coast(port.index()));
            let outcome = session.send_urgent(coast).await;
            trace!(port = %port, ?outcome, "Coast");
        });
    }

    /// Set a motor's power in percent, clamped to 100. Applies to the next run.
    pub fn motor_set_power(&self, port: MotorPort, power: u8) {
        self.motor(port).set_power(power);
    }

    /// Shaft angle in degrees within [0, 360); 0 with no motor attached.
    pub fn motor_position(&self, port: MotorPort) -> i64 {
        if !self.has_motor(port) {
            return 0;
        }
        (self.session.read(Channel::MotorPosition(port.index())) as i64).rem_euclid(360)
    }

    /// Whether a touch sensor on `port` is pressed.
    pub fn is_button_pressed(&self, port: u8) -> bool {
        self.sensor_device(port) == JbDevice::Touch
            && self.session.read(Channel::SensorValue(port)) == 1.0
    }

    /// Reading of the highest-numbered sensor port holding `device`.
    fn sensor_reading(&self, device: JbDevice) -> f64 {
        let snapshot = self.session.snapshot();
        (0..4u8)
            .rev()
            .find(|&port| JbDevice::from_code(snapshot.get(Channel::SensorType(port))) == device)
            .map(|port| snapshot.get(Channel::SensorValue(port)))
            .unwrap_or(0.0)
    }

    /// Ultrasonic distance in cm, clamped to 0..=100 and rounded to 2 decimals.
    pub fn distance(&self) -> f64 {
        let value = self.sensor_reading(JbDevice::Ultrasonic).clamp(0.0, 100.0);
        (value * 100.0).round() / 100.0
    }

    /// Reflected light reading of the color sensor
    pub fn brightness(&self) -> f64 {
        self.sensor_reading(JbDevice::Color)
    }

    pub fn when_distance_less_than(&self, threshold: f64) -> bool {
        self.distance() < threshold.clamp(0.0, 100.0)
    }

    pub fn when_brightness_less_than(&self, threshold: f64) -> bool {
        self.brightness() < threshold.clamp(0.0, 100.0)
    }

    /// Play MIDI `note` (clamped to 47..=99) for `secs` (clamped to 0..=3).
    ///
    /// Returns `None` without sending when the duration is zero.
    pub fn beep(&self, note: u8, secs: f64) -> Option<Paced<PendingSend>> {
        let note = note.clamp(47, 99);
        let millis = (secs * 1000.0).clamp(0.0, MAX_BEEP_MS) as u16;
        if millis == 0 {
            return None;
        }
        let freq = (2f64.powf((note as f64 - 69.0 + 12.0) / 12.0) * 440.0) as u16;
        let tone = DirectCommand::no_reply(bytecode::sound_tone(freq, millis));
        Some(paced(self.session.send(tone), Duration::from_millis(millis as u64)))
    }

    /// Coast every attached motor and silence the speaker in one urgent command.
    pub fn stop_all(&self) -> PendingSend {
        let mut mask = 0;
        for port in MotorPort::ALL {
            let motor = self.motor(port);
            if self.has_motor(port) && motor.power() > 0 {
                mask |= bytecode::port_mask(port.index());
                motor.commands.invalidate();
            }
        }

        let mut codes = Vec::new();
        if mask != 0 {
            codes.extend(bytecode::output_coast_mask(mask));
        }
        codes.extend(bytecode::sound_stop());
        self.session.send_urgent(DirectCommand::no_reply(codes))
    }
}

fn device_list_poll() -> DirectCommand {
    DirectCommand::with_reply(
        COUNTER_DEVICE_LIST,
        bytecode::DEVICE_LIST_ALLOCATION,
        bytecode::device_list(),
    )
}

/// Read every known sensor and all four tacho counts.
///
/// Globals are laid out by port, not packed, so the reply decodes the same
/// whichever sensors are present.
fn values_poll(snapshot: &TelemetrySnapshot) -> DirectCommand {
    let mut codes = Vec::new();
    for port in 0..4u8 {
        let device = snapshot
            .try_get(Channel::SensorType(port))
            .map_or(JbDevice::None, JbDevice::from_code);
        if device != JbDevice::None {
            codes.extend(bytecode::read_si(port, device.mode(), port * 4));
        }
    }
    for port in 0..4u8 {
        codes.extend(bytecode::get_count(port, (4 + port) * 4));
    }
    DirectCommand::with_reply(COUNTER_VALUES, VALUES_ALLOCATION, codes)
}

async fn poll_brick(session: PeripheralSession<DirectCodec>, cancel: CancellationToken) {
    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            state = session.wait_for_state(SessionState::is_connected) => state.is_ok(),
        };
        if !connected {
            return;
        }

        debug!("Polling brick every {:?}", POLL_INTERVAL);
        let mut ticker = interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut count: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            if !session.is_connected() {
                debug!("Brick disconnected, polling paused");
                break;
            }

            let poll = if count % DEVICE_LIST_EVERY == 0 {
                device_list_poll()
            } else {
                values_poll(&session.snapshot())
            };
            count += 1;
            // A dropped poll is simply retried next tick
            let _ = session.send(poll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameCodec;
    use crate::codec::direct::DIRECT_REPLY;
    use crate::config::SessionConfig;
    use crate::session::SendOutcome;
    use crate::test_utils::{MockConnector, MockTransport, connect_mock};
    use tokio::time::Instant;

    const NONE: u8 = 126;

    fn reply(counter: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&((3 + body.len()) as u16).to_le_bytes());
        bytes.extend_from_slice(&counter.to_le_bytes());
        bytes.push(DIRECT_REPLY);
        bytes.extend_from_slice(body);
        bytes
    }

    fn device_list(sensors: [u8; 4], motors: [u8; 4]) -> Vec<u8> {
        let mut body = vec![NONE; 32];
        body[..4].copy_from_slice(&sensors);
        body[16..20].copy_from_slice(&motors);
        reply(COUNTER_DEVICE_LIST, &body)
    }

    fn values(sensors: [f32; 4], tachos: [i32; 4]) -> Vec<u8> {
        let mut body = Vec::new();
        for value in sensors {
            body.extend_from_slice(&value.to_le_bytes());
        }
        for tacho in tachos {
            body.extend_from_slice(&tacho.to_le_bytes());
        }
        reply(COUNTER_VALUES, &body)
    }

    fn sent(transport: &MockTransport, command: DirectCommand) -> usize {
        let frame = DirectCodec.encode(&command).unwrap();
        transport.writes().iter().filter(|written| **written == frame).count()
    }

    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    async fn brick() -> anyhow::Result<(JbBrick, Arc<MockTransport>)> {
        let _ = tracing_subscriber::fmt::try_init();
        let (session, transport) =
            connect_mock(DirectCodec, &MockConnector::new(), SessionConfig::jb_bluetooth()).await?;
        Ok((JbBrick::new(session), transport))
    }

    #[tokio::test(start_paused = true)]
    async fn poller_lists_devices_then_reads_what_it_found() -> anyhow::Result<()> {
        let (_brick, transport) = brick().await?;
        settle().await;
        assert_eq!(transport.writes()[0], DirectCodec.encode(&device_list_poll())?);

        transport.notify(device_list([16, NONE, 30, NONE], [7, NONE, NONE, NONE]));
        sleep(POLL_INTERVAL).await;

        let mut codes = bytecode::read_si(0, 0, 0);
        codes.extend(bytecode::read_si(2, 1, 8));
        for port in 0..4u8 {
            codes.extend(bytecode::get_count(port, 16 + port * 4));
        }
        let expected = DirectCommand::with_reply(COUNTER_VALUES, 32, codes);
        assert_eq!(transport.writes()[1], DirectCodec.encode(&expected)?);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn readers_interpret_polled_values() -> anyhow::Result<()> {
        let (brick, transport) = brick().await?;
        transport.notify(device_list([16, NONE, 30, NONE], [7, NONE, NONE, NONE]));
        transport.notify(values([1.0, 0.0, 42.567, 0.0], [-30, 0, 0, 0]));
        settle().await;

        assert!(brick.is_button_pressed(0));
        assert!(!brick.is_button_pressed(2));
        assert_eq!(brick.distance(), 42.57);
        assert_eq!(brick.brightness(), 0.0);
        assert!(brick.when_distance_less_than(50.0));
        assert!(!brick.when_distance_less_than(40.0));
        assert!(brick.when_distance_less_than(500.0));
        assert_eq!(brick.motor_position(MotorPort::A), 330);
        assert_eq!(brick.motor_position(MotorPort::B), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn timed_run_coasts_a_second_after_it_ends() -> anyhow::Result<()> {
        let (brick, transport) = brick().await?;
        transport.notify(device_list([NONE; 4], [7, NONE, NONE, NONE]));
        settle().await;

        let start = Instant::now();
        brick.motor_turn(MotorPort::A, Rotation::Clockwise, 1.0).await;
        assert_eq!(start.elapsed(), Duration::from_millis(1000));

        let run = DirectCommand::no_reply(bytecode::output_time_speed(0, 50, 1000));
        let coast = DirectCommand::no_reply(bytecode::output_coast(0));
        assert_eq!(sent(&transport, run), 1);
        assert_eq!(sent(&transport, coast.clone()), 0);

        sleep(Duration::from_millis(1100)).await;
        assert_eq!(sent(&transport, coast), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn newer_run_supersedes_pending_coast() -> anyhow::Result<()> {
        let (brick, transport) = brick().await?;
        transport.notify(device_list([NONE; 4], [8, NONE, NONE, NONE]));
        settle().await;

        drop(brick.motor_turn(MotorPort::A, Rotation::Clockwise, 1.0));
        sleep(Duration::from_millis(500)).await;
        drop(brick.motor_turn(MotorPort::A, Rotation::CounterClockwise, 1.0));
        sleep(Duration::from_millis(2600)).await;

        let reverse = DirectCommand::no_reply(bytecode::output_time_speed(0, -50, 1000));
        assert_eq!(sent(&transport, reverse), 1);
        assert_eq!(sent(&transport, DirectCommand::no_reply(bytecode::output_coast(0))), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn runs_without_motor_or_power_send_nothing_but_still_wait() -> anyhow::Result<()> {
        let (brick, transport) = brick().await?;
        transport.notify(device_list([NONE; 4], [7, NONE, NONE, NONE]));
        settle().await;

        let start = Instant::now();
        brick.motor_turn(MotorPort::B, Rotation::Clockwise, 0.5).await;
        assert_eq!(start.elapsed(), Duration::from_millis(500));

        brick.motor_set_power(MotorPort::A, 0);
        brick.motor_turn(MotorPort::A, Rotation::Clockwise, 0.5).await;

        let runs = transport
            .writes()
            .iter()
            .filter(|frame| frame.as_bytes().get(7) == Some(&bytecode::OPOUTPUT_TIME_SPEED))
            .count();
        assert_eq!(runs, 0);

        brick.motor_set_power(MotorPort::A, 150);
        assert_eq!(brick.motor(MotorPort::A).power(), 100);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_is_one_compound_command() -> anyhow::Result<()> {
        let (brick, transport) = brick().await?;
        transport.notify(device_list([NONE; 4], [7, NONE, 8, NONE]));
        settle().await;

        assert_eq!(brick.stop_all().await, SendOutcome::Transmitted);

        let mut codes = bytecode::output_coast_mask(0b101);
        codes.extend(bytecode::sound_stop());
        assert_eq!(sent(&transport, DirectCommand::no_reply(codes)), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn beep_converts_note_to_frequency() -> anyhow::Result<()> {
        let (brick, transport) = brick().await?;
        settle().await;

        let start = Instant::now();
        let beep = brick.beep(69, 0.5).expect("non-zero beep");
        assert_eq!(beep.await, SendOutcome::Transmitted);
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert_eq!(sent(&transport, DirectCommand::no_reply(bytecode::sound_tone(880, 500))), 1);

        assert!(brick.beep(60, 0.0).is_none());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn polling_stops_with_the_brick() -> anyhow::Result<()> {
        let (brick, transport) = brick().await?;
        settle().await;
        drop(brick);

        let before = transport.write_count();
        sleep(POLL_INTERVAL * 4).await;
        assert_eq!(transport.write_count(), before);
        Ok(())
    }
}
