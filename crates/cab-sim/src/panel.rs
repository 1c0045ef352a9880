//! Virtual legacy touch panel
//!
//! Behaves like the legacy panel firmware: it stays silent until it receives
//! `{STAT}`, then produces a sensor frame whenever asked, and stops again on
//! `{HALT}`. Threshold queries are answered by echoing them back in panel
//! brackets.

use cab_protocol::legacy::{LegacySensorFrame, GROUPS_PER_PLAYER, SENSOR_MASK};
use cab_protocol::modern::ModernCodec;
use cab_protocol::{ControlCommand, FrameCodec, PlayerId};
use tracing::debug;

/// A simulated legacy touch panel
#[derive(Debug)]
pub struct VirtualLegacyPanel {
    streaming: bool,
    groups: [[u8; GROUPS_PER_PLAYER]; 2],
    codec: ModernCodec,
    commands_seen: Vec<ControlCommand>,
}

impl Default for VirtualLegacyPanel {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualLegacyPanel {
    /// Create a halted panel with nothing touched
    pub fn new() -> Self {
        Self {
            streaming: false,
            groups: [[0; GROUPS_PER_PLAYER]; 2],
            codec: ModernCodec::new(),
            commands_seen: Vec::new(),
        }
    }

    /// Whether the panel has been started
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Every control command received so far
    pub fn commands_seen(&self) -> &[ControlCommand] {
        &self.commands_seen
    }

    /// Replace one player's group bytes
    pub fn set_groups(&mut self, player: PlayerId, groups: [u8; GROUPS_PER_PLAYER]) {
        self.groups[player.index()] = groups.map(|g| g & SENSOR_MASK);
    }

    /// Touch or release one sensor
    pub fn set_sensor(&mut self, player: PlayerId, group: usize, bit: u8, touched: bool) {
        let Some(value) = self.groups[player.index()].get_mut(group) else {
            return;
        };
        if touched {
            *value |= bit & SENSOR_MASK;
        } else {
            *value &= !bit;
        }
    }

    /// Release every sensor
    pub fn release_all(&mut self) {
        self.groups = [[0; GROUPS_PER_PLAYER]; 2];
    }

    /// The sensor frame for the current touch state
    pub fn frame(&self) -> LegacySensorFrame {
        LegacySensorFrame::from_groups(self.groups[0], self.groups[1])
    }

    /// The next frame to send, if streaming
    pub fn poll_frame(&self) -> Option<LegacySensorFrame> {
        self.streaming.then(|| self.frame())
    }

    /// Feed bytes from the bridge, returning any reply bytes
    pub fn process_bytes(&mut self, data: &[u8]) -> Vec<u8> {
        self.codec.push_bytes(data);

        let mut out = Vec::new();
        while let Some(cmd) = self.codec.next_frame() {
            debug!("Virtual panel received {:?}", cmd);
            self.commands_seen.push(cmd);
            match cmd {
                ControlCommand::Start => self.streaming = true,
                ControlCommand::Halt => self.streaming = false,
                ControlCommand::ResetThreshold => {}
                ControlCommand::RatioQuery { .. } | ControlCommand::SensitivityQuery { .. } => {
                    if let Some(ack) = cmd.acknowledgement() {
                        out.extend_from_slice(&ack);
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_halt() {
        let mut panel = VirtualLegacyPanel::new();
        assert!(panel.poll_frame().is_none());

        assert!(panel.process_bytes(b"{STAT}").is_empty());
        assert!(panel.is_streaming());
        assert_eq!(panel.poll_frame(), Some(LegacySensorFrame::idle()));

        panel.process_bytes(b"{HALT}");
        assert!(!panel.is_streaming());
        assert_eq!(
            panel.commands_seen(),
            &[ControlCommand::Start, ControlCommand::Halt]
        );
    }

    #[test]
    fn test_sensor_state() {
        let mut panel = VirtualLegacyPanel::new();
        panel.set_sensor(PlayerId::Two, 3, 0x10, true);
        panel.set_sensor(PlayerId::One, 0, 0x01, true);
        assert_eq!(panel.frame().player_groups(PlayerId::Two), [0, 0, 0, 0x10]);

        panel.set_sensor(PlayerId::Two, 3, 0x10, false);
        assert_eq!(panel.frame().player_groups(PlayerId::Two), [0; 4]);
        assert_eq!(panel.frame().player_groups(PlayerId::One), [1, 0, 0, 0]);

        panel.release_all();
        assert_eq!(panel.frame(), LegacySensorFrame::idle());
    }

    #[test]
    fn test_query_echo() {
        let mut panel = VirtualLegacyPanel::new();
        assert_eq!(panel.process_bytes(b"{LBr\x02}"), b"(LBr\x02)".to_vec());
    }

    proptest::proptest! {
        #[test]
        fn prop_frames_stay_in_sensor_range(
            p1 in proptest::array::uniform4(proptest::num::u8::ANY),
            p2 in proptest::array::uniform4(proptest::num::u8::ANY),
        ) {
            let mut panel = VirtualLegacyPanel::new();
            panel.set_groups(PlayerId::One, p1);
            panel.set_groups(PlayerId::Two, p2);
            let frame = panel.frame();
            let reparsed = LegacySensorFrame::from_bytes(frame.as_bytes()).ok();
            proptest::prop_assert_eq!(reparsed, Some(frame));
            for group in frame.player_groups(PlayerId::One) {
                proptest::prop_assert_eq!(group & !SENSOR_MASK, 0);
            }
        }
    }
}
