//! Legacy touch panel protocol
//!
//! The legacy panel streams 14-byte sensor frames continuously once started:
//!
//! ```text
//! ( [p1 g0] [p1 g1] [p1 g2] [p1 g3] [--] [--] [p2 g0] [p2 g1] [p2 g2] [p2 g3] [--] [--] )
//! ```
//!
//! Every data byte carries a `0x40` base; only the low five bits (1/2/4/8/16)
//! are sensor bits. The panel also answers control commands with 6-byte short
//! frames that share the `(` opening marker, so a short frame is told apart
//! from a sensor frame by its closing `)` at offset 5 (sensor data bytes are
//! never `)`).

use crate::command::{
    ControlCommand, CONTROL_FRAME_LEN, COMMAND_OFFSET, HALT_FRAME, PANEL_CLOSE, PANEL_OPEN,
    START_FRAME,
};
use crate::error::ParseError;
use crate::{FrameCodec, PlayerId};

/// Length of a legacy sensor frame
pub const SENSOR_FRAME_LEN: usize = 14;

/// Base value OR'd into every legacy data byte
pub const DATA_BASE: u8 = 0x40;

/// Bits of a data byte that carry sensor state
pub const SENSOR_MASK: u8 = 0x1F;

/// Sensor groups per player
pub const GROUPS_PER_PLAYER: usize = 4;

/// Frame offset of player 1's first group byte
pub const P1_GROUP_OFFSET: usize = 1;

/// Frame offset of player 2's first group byte
pub const P2_GROUP_OFFSET: usize = 7;

/// Command sent to stop the legacy panel streaming
pub const LEGACY_HALT: [u8; CONTROL_FRAME_LEN] = HALT_FRAME;

/// Command sent to start the legacy panel streaming
pub const LEGACY_START: [u8; CONTROL_FRAME_LEN] = START_FRAME;

/// Maximum bytes held while waiting for a frame to complete
const MAX_BUFFER_LEN: usize = SENSOR_FRAME_LEN * 8;

/// One 14-byte legacy sensor frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacySensorFrame([u8; SENSOR_FRAME_LEN]);

impl LegacySensorFrame {
    /// Wrap raw frame bytes, checking the markers
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() != SENSOR_FRAME_LEN {
            return Err(ParseError::InvalidFrame(format!(
                "legacy sensor frame is {} bytes",
                bytes.len()
            )));
        }
        if bytes[0] != PANEL_OPEN || bytes[SENSOR_FRAME_LEN - 1] != PANEL_CLOSE {
            return Err(ParseError::InvalidFrame(format!(
                "legacy sensor frame markers {:02X?}",
                [bytes[0], bytes[SENSOR_FRAME_LEN - 1]]
            )));
        }

        let mut frame = [0u8; SENSOR_FRAME_LEN];
        frame.copy_from_slice(bytes);
        Ok(Self(frame))
    }

    /// A frame with no sensors touched
    pub fn idle() -> Self {
        let mut frame = [DATA_BASE; SENSOR_FRAME_LEN];
        frame[0] = PANEL_OPEN;
        frame[SENSOR_FRAME_LEN - 1] = PANEL_CLOSE;
        Self(frame)
    }

    /// Build a frame from both players' group bytes (sensor bits only)
    pub fn from_groups(p1: [u8; GROUPS_PER_PLAYER], p2: [u8; GROUPS_PER_PLAYER]) -> Self {
        let mut frame = Self::idle();
        for (i, g) in p1.iter().enumerate() {
            frame.0[P1_GROUP_OFFSET + i] = DATA_BASE | (g & SENSOR_MASK);
        }
        for (i, g) in p2.iter().enumerate() {
            frame.0[P2_GROUP_OFFSET + i] = DATA_BASE | (g & SENSOR_MASK);
        }
        frame
    }

    /// The four sensor-group bytes for a player, with the base stripped
    pub fn player_groups(&self, player: PlayerId) -> [u8; GROUPS_PER_PLAYER] {
        let offset = match player {
            PlayerId::One => P1_GROUP_OFFSET,
            PlayerId::Two => P2_GROUP_OFFSET,
        };
        let mut groups = [0u8; GROUPS_PER_PLAYER];
        for (i, g) in groups.iter_mut().enumerate() {
            *g = self.0[offset + i] & SENSOR_MASK;
        }
        groups
    }

    /// Raw frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A frame read from the legacy panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyFrame {
    /// Sensor state for both players
    Sensor(LegacySensorFrame),
    /// Short reply frame answering a control command
    Reply(ControlCommand),
}

/// Streaming codec for frames read from the legacy panel
#[derive(Debug, Default)]
pub struct LegacyCodec {
    buffer: Vec<u8>,
}

impl LegacyCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(SENSOR_FRAME_LEN * 2),
        }
    }

    /// Discard everything before the next opening marker
    ///
    /// Returns false when no opening marker is buffered.
    fn resync(&mut self) -> bool {
        match self.buffer.iter().position(|&b| b == PANEL_OPEN) {
            Some(0) => true,
            Some(pos) => {
                tracing::debug!(
                    "Legacy codec skipped {} bytes: {:02X?}",
                    pos,
                    &self.buffer[..pos]
                );
                self.buffer.drain(..pos);
                true
            }
            None => {
                if !self.buffer.is_empty() {
                    tracing::debug!(
                        "Legacy codec dropped {} bytes without frame start",
                        self.buffer.len()
                    );
                    self.buffer.clear();
                }
                false
            }
        }
    }
}

impl FrameCodec for LegacyCodec {
    type Frame = LegacyFrame;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Prevent buffer overflow
        if self.buffer.len() > MAX_BUFFER_LEN {
            let start = self.buffer.len() - SENSOR_FRAME_LEN;
            self.buffer.drain(..start);
        }
    }

    fn next_frame_with_bytes(&mut self) -> Option<(Self::Frame, Vec<u8>)> {
        loop {
            if !self.resync() {
                return None;
            }
            if self.buffer.len() < CONTROL_FRAME_LEN {
                return None;
            }

            // Short reply frame
            if self.buffer[CONTROL_FRAME_LEN - 1] == PANEL_CLOSE {
                let raw: Vec<u8> = self.buffer.drain(..CONTROL_FRAME_LEN).collect();
                if !ControlCommand::is_known_code(raw[COMMAND_OFFSET]) {
                    tracing::debug!("Dropping legacy reply with unknown command: {:02X?}", raw);
                    continue;
                }
                match ControlCommand::parse(&raw) {
                    Ok(cmd) => return Some((LegacyFrame::Reply(cmd), raw)),
                    Err(e) => {
                        tracing::warn!("Failed to parse legacy reply: {}", e);
                        continue;
                    }
                }
            }

            if self.buffer.len() < SENSOR_FRAME_LEN {
                return None;
            }

            if self.buffer[SENSOR_FRAME_LEN - 1] != PANEL_CLOSE {
                // Not a frame start after all; drop the marker and look again
                tracing::debug!(
                    "Legacy frame missing close marker: {:02X?}",
                    &self.buffer[..SENSOR_FRAME_LEN]
                );
                self.buffer.drain(..1);
                continue;
            }

            let raw: Vec<u8> = self.buffer.drain(..SENSOR_FRAME_LEN).collect();
            match LegacySensorFrame::from_bytes(&raw) {
                Ok(frame) => return Some((LegacyFrame::Sensor(frame), raw)),
                Err(e) => {
                    tracing::warn!("Failed to parse legacy sensor frame: {}", e);
                    continue;
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
