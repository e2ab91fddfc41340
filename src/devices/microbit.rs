//! micro:bit-style board: LED display writes and streamed sensor reads.
//!
//! The board streams its sensor frame continuously, so every reader is a
//! plain lookup in the latest snapshot.

use std::time::Duration;

use super::round_half_up;
use crate::codec::microbit::MAX_TEXT_LEN;
use crate::codec::{MicrobitCodec, MicrobitCommand};
use crate::pacing::{Paced, chars_delay, paced};
use crate::session::{PeripheralSession, PendingSend};
use crate::types::Channel;

const MATRIX_DELAY: Duration = Duration::from_millis(100);

/// Degrees of tilt before a direction counts as tilted
pub const TILT_THRESHOLD: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TiltDirection {
    Front,
    Back,
    Left,
    Right,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    A,
    B,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    Moved,
    Shaken,
    Jumped,
}

impl Gesture {
    const fn bit(self) -> u32 {
        match self {
            Gesture::Moved => 0,
            Gesture::Shaken => 1,
            Gesture::Jumped => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Microbit {
    session: PeripheralSession<MicrobitCodec>,
}

impl Microbit {
    pub fn new(session: PeripheralSession<MicrobitCodec>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &PeripheralSession<MicrobitCodec> {
        &self.session
    }

    /// Scroll `text` across the display.
    ///
    /// Text is cut to the first 19 characters that fit the 19 byte payload;
    /// completion waits for the visible text to scroll past.
    pub fn display_text(&self, text: &str) -> Paced<PendingSend> {
        let mut len = 0;
        let mut end = 0;
        for (at, c) in text.char_indices() {
            if len == MAX_TEXT_LEN || at + c.len_utf8() > MAX_TEXT_LEN {
                break;
            }
            len += 1;
            end = at + c.len_utf8();
        }
        let shown = &text[..end];
        paced(self.session.send(MicrobitCommand::DisplayText(shown.to_string())), chars_delay(len))
    }

    /// Light the 5x5 matrix, `rows[row][column]`.
    pub fn display_matrix(&self, rows: [[bool; 5]; 5]) -> Paced<PendingSend> {
        let packed = rows.map(|row| {
            row.iter()
                .enumerate()
                .filter(|&(_, &lit)| lit)
                .fold(0u8, |bits, (column, _)| bits | (1 << (4 - column)))
        });
        paced(self.session.send(MicrobitCommand::DisplayLed(packed)), MATRIX_DELAY)
    }

    pub fn set_pin_config(&self, pin: u8, mode: u8) -> PendingSend {
        self.session.send(MicrobitCommand::PinConfig { pin, mode })
    }

    /// Tilt toward `direction` in whole degrees; negative when tilted away.
    ///
    /// [`TiltDirection::Any`] has no single angle and reads 0.
    pub fn tilt_angle(&self, direction: TiltDirection) -> f64 {
        let tenths = match direction {
            TiltDirection::Front => -self.session.read(Channel::TiltY),
            TiltDirection::Back => self.session.read(Channel::TiltY),
            TiltDirection::Left => -self.session.read(Channel::TiltX),
            TiltDirection::Right => self.session.read(Channel::TiltX),
            TiltDirection::Any => return 0.0,
        };
        round_half_up(tenths / 10.0)
    }

    pub fn is_tilted(&self, direction: TiltDirection) -> bool {
        match direction {
            TiltDirection::Any => {
                (self.session.read(Channel::TiltX) / 10.0).abs() >= TILT_THRESHOLD
                    || (self.session.read(Channel::TiltY) / 10.0).abs() >= TILT_THRESHOLD
            }
            direction => self.tilt_angle(direction) >= TILT_THRESHOLD,
        }
    }

    pub fn is_button_pressed(&self, button: Button) -> bool {
        let a = self.session.read(Channel::ButtonA) != 0.0;
        let b = self.session.read(Channel::ButtonB) != 0.0;
        match button {
            Button::A => a,
            Button::B => b,
            Button::Any => a || b,
        }
    }

    pub fn gesture(&self, gesture: Gesture) -> bool {
        ((self.session.read(Channel::Gesture) as u32) >> gesture.bit()) & 1 == 1
    }

    /// Whether touch pin 0, 1 or 2 is connected; other pins read false.
    pub fn is_pin_connected(&self, pin: u8) -> bool {
        pin <= 2 && self.session.read(Channel::TouchPin(pin)) != 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::test_utils::{MockConnector, MockTransport, connect_mock};
    use std::sync::Arc;
    use tokio::time::{Instant, sleep};

    const TILT_FRAME: [u8; 10] = [0xFE, 0xD4, 0x01, 0x2C, 1, 0, 0, 1, 0, 0b101];

    async fn microbit() -> anyhow::Result<(Microbit, Arc<MockTransport>)> {
        let _ = tracing_subscriber::fmt::try_init();
        let config = SessionConfig { liveness_timeout: None, ..SessionConfig::microbit() };
        let (session, transport) = connect_mock(MicrobitCodec, &MockConnector::new(), config).await?;
        Ok((Microbit::new(session), transport))
    }

    #[tokio::test(start_paused = true)]
    async fn tilt_readers_follow_the_latest_frame() -> anyhow::Result<()> {
        let (microbit, transport) = microbit().await?;
        transport.notify(TILT_FRAME);
        sleep(Duration::from_millis(1)).await;

        assert_eq!(microbit.tilt_angle(TiltDirection::Left), 30.0);
        assert_eq!(microbit.tilt_angle(TiltDirection::Right), -30.0);
        assert_eq!(microbit.tilt_angle(TiltDirection::Back), 30.0);
        assert_eq!(microbit.tilt_angle(TiltDirection::Front), -30.0);
        assert!(microbit.is_tilted(TiltDirection::Left));
        assert!(!microbit.is_tilted(TiltDirection::Right));
        assert!(microbit.is_tilted(TiltDirection::Any));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn buttons_gestures_and_pins_decode_from_frame() -> anyhow::Result<()> {
        let (microbit, transport) = microbit().await?;
        transport.notify(TILT_FRAME);
        sleep(Duration::from_millis(1)).await;

        assert!(microbit.is_button_pressed(Button::A));
        assert!(!microbit.is_button_pressed(Button::B));
        assert!(microbit.is_button_pressed(Button::Any));
        assert!(microbit.gesture(Gesture::Moved));
        assert!(!microbit.gesture(Gesture::Shaken));
        assert!(microbit.gesture(Gesture::Jumped));
        assert!(microbit.is_pin_connected(1));
        assert!(!microbit.is_pin_connected(0));
        assert!(!microbit.is_pin_connected(7));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn long_text_is_truncated_and_paced_by_length() -> anyhow::Result<()> {
        let (microbit, transport) = microbit().await?;
        let start = Instant::now();

        microbit.display_text("Hello, micro:bit world!").await;

        assert_eq!(start.elapsed(), chars_delay(19));
        let writes = transport.writes();
        assert_eq!(writes[0].as_bytes()[0], 0x81);
        assert_eq!(&writes[0].as_bytes()[1..], b"Hello, micro:bit wo");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn multibyte_text_is_cut_on_a_character_boundary() -> anyhow::Result<()> {
        let (microbit, transport) = microbit().await?;

        microbit.display_text(&"é".repeat(12)).await;

        let writes = transport.writes();
        assert_eq!(&writes[0].as_bytes()[1..], "é".repeat(9).as_bytes());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn matrix_packs_leftmost_column_into_bit_four() -> anyhow::Result<()> {
        let (microbit, transport) = microbit().await?;
        let mut rows = [[false; 5]; 5];
        for (i, row) in rows.iter_mut().enumerate() {
            row[i] = true;
        }
        let start = Instant::now();

        microbit.display_matrix(rows).await;

        assert_eq!(start.elapsed(), MATRIX_DELAY);
        assert_eq!(transport.writes()[0].as_bytes(), &[0x82, 0x10, 0x08, 0x04, 0x02, 0x01]);
        Ok(())
    }
}
