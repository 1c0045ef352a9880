//! Modern touch panel protocol
//!
//! The game host expects one modern panel per player. Each panel streams
//! 9-byte sensor frames:
//!
//! ```text
//! ( [b1] [b2] [b3] [b4] [b5] [b6] [b7] )
//! ```
//!
//! Each data byte carries five zone bits, least significant first, in zone
//! order A1..A8, B1..B8, C1, C2, D1..D8, E1..E8 (see [`TouchZone`]).
//!
//! In the other direction the host sends 6-byte control frames in braces,
//! which [`ModernCodec`] turns into [`ControlCommand`]s.

use crate::area::TouchZone;
use crate::command::{
    ControlCommand, CONTROL_FRAME_LEN, HOST_OPEN, PANEL_CLOSE, PANEL_OPEN,
};
use crate::error::ParseError;
use crate::{EncodeFrame, FrameCodec};

/// Length of a modern sensor frame
pub const SENSOR_FRAME_LEN: usize = 9;

/// Number of data bytes in a modern sensor frame
pub const DATA_LEN: usize = 7;

/// Maximum bytes held while waiting for a frame to complete
const MAX_BUFFER_LEN: usize = CONTROL_FRAME_LEN * 16;

/// Touch state for one modern panel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ModernSensorFrame {
    data: [u8; DATA_LEN],
}

impl ModernSensorFrame {
    /// A frame with no zones touched
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a 9-byte frame as sent on the wire
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() != SENSOR_FRAME_LEN {
            return Err(ParseError::InvalidFrame(format!(
                "modern sensor frame is {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != PANEL_OPEN || bytes[SENSOR_FRAME_LEN - 1] != PANEL_CLOSE {
            return Err(ParseError::InvalidFrame(format!(
                "modern sensor frame markers {:02X?}",
                [bytes[0], bytes[SENSOR_FRAME_LEN - 1]]
            )));
        }
        let mut data = [0u8; DATA_LEN];
        data.copy_from_slice(&bytes[1..=DATA_LEN]);
        Ok(Self { data })
    }

    /// Mark a zone as touched
    pub fn set_zone(&mut self, zone: TouchZone) {
        self.data[zone.byte() - 1] |= zone.mask();
    }

    /// Check whether a zone is touched
    pub fn contains(&self, zone: TouchZone) -> bool {
        self.data[zone.byte() - 1] & zone.mask() != 0
    }

    /// All touched zones, in zone order
    pub fn zones(&self) -> Vec<TouchZone> {
        TouchZone::ALL
            .iter()
            .copied()
            .filter(|z| self.contains(*z))
            .collect()
    }

    /// Check whether no zone is touched
    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|b| *b == 0)
    }

    /// The 7 data bytes
    pub fn data(&self) -> &[u8; DATA_LEN] {
        &self.data
    }

    /// The full 9-byte frame
    pub fn to_bytes(&self) -> [u8; SENSOR_FRAME_LEN] {
        let mut frame = [0u8; SENSOR_FRAME_LEN];
        frame[0] = PANEL_OPEN;
        frame[1..=DATA_LEN].copy_from_slice(&self.data);
        frame[SENSOR_FRAME_LEN - 1] = PANEL_CLOSE;
        frame
    }
}

impl EncodeFrame for ModernSensorFrame {
    fn encode(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }
}

/// Streaming codec for control frames sent by the game host
#[derive(Debug, Default)]
pub struct ModernCodec {
    buffer: Vec<u8>,
}

impl ModernCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(CONTROL_FRAME_LEN * 2),
        }
    }

    fn find_open(&self) -> Option<usize> {
        self.buffer
            .iter()
            .position(|&b| b == HOST_OPEN || b == PANEL_OPEN)
    }
}

impl FrameCodec for ModernCodec {
    type Frame = ControlCommand;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Prevent buffer overflow
        if self.buffer.len() > MAX_BUFFER_LEN {
            let start = self.buffer.len() - CONTROL_FRAME_LEN;
            self.buffer.drain(..start);
        }
    }

    fn next_frame_with_bytes(&mut self) -> Option<(Self::Frame, Vec<u8>)> {
        loop {
            let Some(pos) = self.find_open() else {
                self.buffer.clear();
                return None;
            };
            if pos > 0 {
                tracing::debug!(
                    "Modern codec skipped {} bytes: {:02X?}",
                    pos,
                    &self.buffer[..pos]
                );
                self.buffer.drain(..pos);
            }

            if self.buffer.len() < CONTROL_FRAME_LEN {
                return None;
            }

            match ControlCommand::parse(&self.buffer[..CONTROL_FRAME_LEN]) {
                Ok(cmd) => {
                    let raw: Vec<u8> = self.buffer.drain(..CONTROL_FRAME_LEN).collect();
                    return Some((cmd, raw));
                }
                Err(ParseError::UnknownCommand(msg)) => {
                    tracing::debug!("Dropping host control frame: {}", msg);
                    self.buffer.drain(..CONTROL_FRAME_LEN);
                }
                Err(e) => {
                    tracing::debug!("Modern codec resync: {}", e);
                    self.buffer.drain(..1);
                }
            }
        }
    }

    fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame_encoding() {
        let frame = ModernSensorFrame::new();
        assert_eq!(frame.encode(), b"(\0\0\0\0\0\0\0)".to_vec());
        assert!(frame.is_empty());
    }

    #[test]
    fn test_zone_bits() {
        let mut frame = ModernSensorFrame::new();
        frame.set_zone(TouchZone::A1);
        frame.set_zone(TouchZone::B1);
        frame.set_zone(TouchZone::C2);
        frame.set_zone(TouchZone::E8);
        assert_eq!(frame.data(), &[0x01, 0x08, 0x00, 0x04, 0x00, 0x00, 0x08]);
        assert_eq!(
            frame.zones(),
            vec![TouchZone::A1, TouchZone::B1, TouchZone::C2, TouchZone::E8]
        );
    }

    #[test]
    fn test_from_bytes() {
        let mut frame = ModernSensorFrame::new();
        frame.set_zone(TouchZone::D5);
        let parsed = ModernSensorFrame::from_bytes(&frame.to_bytes()).unwrap();
        assert_eq!(parsed, frame);
        assert!(ModernSensorFrame::from_bytes(b"(\0\0\0\0\0\0\0}").is_err());
    }

    #[test]
    fn test_codec_host_commands() {
        let mut codec = ModernCodec::new();
        codec.push_bytes(b"{HALT}{STAT}{RSET}");
        assert_eq!(codec.next_frame(), Some(ControlCommand::Halt));
        assert_eq!(codec.next_frame(), Some(ControlCommand::Start));
        assert_eq!(codec.next_frame(), Some(ControlCommand::ResetThreshold));
        assert!(codec.next_frame().is_none());
    }

    #[test]
    fn test_codec_partial_command() {
        let mut codec = ModernCodec::new();
        codec.push_bytes(b"{LA");
        assert!(codec.next_frame().is_none());
        codec.push_bytes(b"k\x28}");
        let (cmd, raw) = codec.next_frame_with_bytes().unwrap();
        assert_eq!(
            cmd,
            ControlCommand::SensitivityQuery {
                side: b'L',
                area: b'A',
                value: 0x28
            }
        );
        assert_eq!(raw, b"{LAk\x28}".to_vec());
    }

    #[test]
    fn test_codec_drops_unknown_command() {
        let mut codec = ModernCodec::new();
        codec.push_bytes(b"{ABCD}{HALT}");
        assert_eq!(codec.next_frame(), Some(ControlCommand::Halt));
    }

    #[test]
    fn test_codec_resyncs_on_bad_close() {
        let mut codec = ModernCodec::new();
        codec.push_bytes(b"xx{HA{STAT}");
        assert_eq!(codec.next_frame(), Some(ControlCommand::Start));
    }

    #[test]
    fn test_query_echo() {
        let mut codec = ModernCodec::new();
        codec.push_bytes(b"{RCr\x05}");
        let cmd = codec.next_frame().unwrap();
        assert_eq!(cmd.acknowledgement(), Some(*b"(RCr\x05)"));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn threshold_queries_echo_verbatim(
                side in prop::sample::select(vec![b'L', b'R']),
                area in b'A'..=b'H',
                value in any::<u8>(),
                sensitivity in any::<bool>(),
            ) {
                let cmd = if sensitivity {
                    ControlCommand::SensitivityQuery { side, area, value }
                } else {
                    ControlCommand::RatioQuery { side, area, value }
                };
                let host = cmd.to_host_frame();

                let mut codec = ModernCodec::new();
                codec.push_bytes(&host);
                let parsed = codec.next_frame();
                prop_assert_eq!(parsed, Some(cmd));

                let echo = cmd.acknowledgement().unwrap();
                prop_assert_eq!(echo[0], b'(');
                prop_assert_eq!(echo[5], b')');
                prop_assert_eq!(&echo[1..5], &host[1..5]);
            }
        }
    }
}
