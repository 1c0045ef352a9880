//! Cabinet Protocol Library
//!
//! This crate provides parsing and encoding for the serial protocols spoken
//! inside a rhythm-game arcade cabinet:
//!
//! - **Legacy touch**: the older panel's bracketed 14-byte sensor frames and
//!   6-byte control frames (four coarse sensor groups per player)
//! - **Modern touch**: the newer panel's 9-byte sensor frames (34 zones per
//!   player) and the 6-byte control frames the game host sends to it
//! - **JVS**: the I/O board's addressed, byte-stuffed, checksummed packets
//!
//! # Architecture
//!
//! Each framing module provides a streaming codec that accepts partial data
//! and yields complete frames as they become available, so a read that is
//! cut short by a timeout never loses bytes:
//!
//! - [`legacy::LegacyCodec`] yields sensor frames and control replies
//! - [`modern::ModernCodec`] yields control commands from the game host
//! - [`jvs::JvsCodec`] yields decoded (and checksum-verified) packets
//!
//! The [`area`] module remaps legacy sensor groups onto modern zones, and
//! [`inputs`] maps JVS switch bytes onto named buttons.
//!
//! # Example
//!
//! ```rust
//! use cab_protocol::{FrameCodec, PlayerId};
//! use cab_protocol::area::{translate_player, TouchZone};
//! use cab_protocol::legacy::{LegacyCodec, LegacyFrame, LegacySensorFrame};
//!
//! // Player 1 touches the first group-0 sensor
//! let frame = LegacySensorFrame::from_groups([0x01, 0, 0, 0], [0, 0, 0, 0]);
//!
//! let mut codec = LegacyCodec::new();
//! codec.push_bytes(frame.as_bytes());
//!
//! if let Some(LegacyFrame::Sensor(sensor)) = codec.next_frame() {
//!     let mut center_toggle = false;
//!     let modern = translate_player(&sensor, PlayerId::One, &mut center_toggle);
//!     assert!(modern.contains(TouchZone::A1));
//!     assert!(modern.contains(TouchZone::D1));
//!     assert!(modern.contains(TouchZone::D2));
//! }
//! ```

pub mod area;
pub mod command;
pub mod error;
pub mod inputs;
pub mod jvs;
pub mod legacy;
pub mod modern;

use std::fmt;

pub use command::ControlCommand;
pub use error::ParseError;

/// Identifies one of the two player positions on the cabinet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlayerId {
    /// Left-hand player
    One,
    /// Right-hand player
    Two,
}

impl PlayerId {
    /// Both players, in index order
    pub const ALL: [PlayerId; 2] = [PlayerId::One, PlayerId::Two];

    /// Zero-based index, for per-player arrays
    pub fn index(self) -> usize {
        match self {
            PlayerId::One => 0,
            PlayerId::Two => 1,
        }
    }

    /// One-based player number, as printed on the cabinet
    pub fn number(self) -> u8 {
        self.index() as u8 + 1
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.number())
    }
}

/// Trait for streaming codecs that parse frames out of a byte stream
pub trait FrameCodec {
    /// The frame type produced by this codec
    type Frame;

    /// Push raw bytes into the codec's buffer
    fn push_bytes(&mut self, data: &[u8]);

    /// Try to extract the next complete frame from the buffer
    fn next_frame(&mut self) -> Option<Self::Frame> {
        self.next_frame_with_bytes().map(|(frame, _)| frame)
    }

    /// Try to extract the next complete frame along with its raw bytes
    ///
    /// The raw bytes are what was consumed from the wire, which makes them
    /// the right thing to log when diagnosing hardware problems.
    fn next_frame_with_bytes(&mut self) -> Option<(Self::Frame, Vec<u8>)>;

    /// Number of bytes buffered but not yet consumed
    fn buffered(&self) -> usize;

    /// Clear the internal buffer
    fn clear(&mut self);
}

/// Trait for values that can be encoded to their wire format
pub trait EncodeFrame {
    /// Encode this value to the bytes sent on the wire
    fn encode(&self) -> Vec<u8>;
}

#[cfg(test)]
mod tests {
    use super::PlayerId;

    #[test]
    fn test_player_numbering() {
        assert_eq!(PlayerId::One.index(), 0);
        assert_eq!(PlayerId::Two.number(), 2);
        assert_eq!(PlayerId::Two.to_string(), "P2");
    }
}
