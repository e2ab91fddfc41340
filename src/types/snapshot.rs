//! Last-known telemetry values

use std::collections::HashMap;

use super::Channel;

/// Decoded telemetry fields from a single inbound frame.
pub type Fields = Vec<(Channel, f64)>;

/// Mapping from channel to its most recently decoded value.
///
/// Only the inbound-frame handler mutates a snapshot. Each frame overwrites
/// the channels it carries and leaves every other channel untouched, so a
/// partial frame never clobbers unrelated values. No history is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    values: HashMap<Channel, f64>,
    frames: u64,
}

impl TelemetrySnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a channel, or 0.0 if nothing has been received for it yet.
    pub fn get(&self, channel: Channel) -> f64 {
        self.values.get(&channel).copied().unwrap_or_default()
    }

    /// Value of a channel if it has ever been reported.
    pub fn try_get(&self, channel: Channel) -> Option<f64> {
        self.values.get(&channel).copied()
    }

    /// Boolean view of a channel: any non-zero value is `true`.
    pub fn flag(&self, channel: Channel) -> bool {
        self.get(channel) != 0.0
    }

    /// Apply one frame's decoded fields, last write wins per channel.
    pub fn apply(&mut self, fields: &[(Channel, f64)]) {
        for &(channel, value) in fields {
            self.values.insert(channel, value);
        }
        self.frames += 1;
    }

    /// Number of frames applied since the snapshot was created or cleared.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Whether any telemetry has been received.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over all reported channels.
    pub fn iter(&self) -> impl Iterator<Item = (Channel, f64)> + '_ {
        self.values.iter().map(|(channel, value)| (*channel, *value))
    }

    /// Reset every channel to its default.
    pub fn clear(&mut self) {
        self.values.clear();
        self.frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unreported_channels_read_as_zero() {
        let snapshot = TelemetrySnapshot::new();
        assert_eq!(snapshot.get(Channel::TiltX), 0.0);
        assert!(!snapshot.flag(Channel::ButtonA));
        assert_eq!(snapshot.try_get(Channel::Distance), None);
    }

    #[test]
    fn partial_frames_leave_other_channels_alone() {
        let mut snapshot = TelemetrySnapshot::new();
        snapshot.apply(&[(Channel::TiltX, -300.0), (Channel::ButtonA, 1.0)]);
        snapshot.apply(&[(Channel::TiltX, 120.0)]);

        assert_eq!(snapshot.get(Channel::TiltX), 120.0);
        assert_eq!(snapshot.get(Channel::ButtonA), 1.0);
        assert_eq!(snapshot.frame_count(), 2);
    }

    proptest! {
        #[test]
        fn second_frame_wins_for_shared_channel(first in -1e6f64..1e6, second in -1e6f64..1e6) {
            let mut snapshot = TelemetrySnapshot::new();
            snapshot.apply(&[(Channel::Distance, first)]);
            snapshot.apply(&[(Channel::Distance, second)]);
            prop_assert_eq!(snapshot.get(Channel::Distance), second);
        }
    }
}
