//! Touch panel control commands
//!
//! Both touch panel generations share the same 6-byte control frame layout:
//!
//! ```text
//! [open] [arg1] [arg2] [cmd] [arg3] [close]
//! ```
//!
//! The game host opens its frames with `{` and closes them with `}`
//! (`{HALT}`, `{STAT}`, `{RSET}`, `{LAr2}`). Panels answer with `(` and `)`.
//! Only the command byte at offset 3 selects the command; the remaining
//! bytes are arguments for the threshold commands and filler otherwise.
//! Frames are rebuilt from the parsed command rather than kept raw: query
//! arguments survive exactly, filler is replaced by the canonical text.

use crate::error::ParseError;

/// Length of every control frame
pub const CONTROL_FRAME_LEN: usize = 6;

/// Offset of the command byte within a control frame
pub const COMMAND_OFFSET: usize = 3;

/// Opening marker used by the game host
pub const HOST_OPEN: u8 = b'{';
/// Closing marker used by the game host
pub const HOST_CLOSE: u8 = b'}';
/// Opening marker used by panels
pub const PANEL_OPEN: u8 = b'(';
/// Closing marker used by panels
pub const PANEL_CLOSE: u8 = b')';

/// Command code: stop sending sensor data
pub const CODE_HALT: u8 = b'L';
/// Command code: start sending sensor data
pub const CODE_START: u8 = b'A';
/// Command code: reset thresholds
pub const CODE_RESET: u8 = b'E';
/// Command code: ratio query/set
pub const CODE_RATIO: u8 = b'r';
/// Command code: sensitivity (threshold) query/set
pub const CODE_SENSITIVITY: u8 = b'k';

/// `{HALT}` - tells a panel to stop streaming sensor frames
pub const HALT_FRAME: [u8; CONTROL_FRAME_LEN] = *b"{HALT}";
/// `{STAT}` - tells a panel to start streaming sensor frames
pub const START_FRAME: [u8; CONTROL_FRAME_LEN] = *b"{STAT}";
/// `{RSET}` - tells a panel to reset its thresholds
pub const RESET_FRAME: [u8; CONTROL_FRAME_LEN] = *b"{RSET}";

/// A parsed touch panel control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ControlCommand {
    /// Stop streaming sensor frames
    Halt,
    /// Start streaming sensor frames
    Start,
    /// Reset sensor thresholds
    ResetThreshold,
    /// Ratio query for one sensor area (`{ L/R area r value }`)
    RatioQuery {
        /// Panel side, `L` or `R`
        side: u8,
        /// Sensor area letter
        area: u8,
        /// Ratio value
        value: u8,
    },
    /// Sensitivity query for one sensor area (`{ L/R area k value }`)
    SensitivityQuery {
        /// Panel side, `L` or `R`
        side: u8,
        /// Sensor area letter
        area: u8,
        /// Threshold value
        value: u8,
    },
}

impl ControlCommand {
    /// Check whether a byte is a known command code
    pub fn is_known_code(code: u8) -> bool {
        matches!(
            code,
            CODE_HALT | CODE_START | CODE_RESET | CODE_RATIO | CODE_SENSITIVITY
        )
    }

    /// Parse a 6-byte control frame
    ///
    /// Either bracket style is accepted; the opening and closing markers must
    /// belong to the same style.
    pub fn parse(frame: &[u8]) -> Result<Self, ParseError> {
        if frame.len() != CONTROL_FRAME_LEN {
            return Err(ParseError::InvalidFrame(format!(
                "control frame is {} bytes",
                frame.len()
            )));
        }

        let close = frame[CONTROL_FRAME_LEN - 1];
        match (frame[0], close) {
            (HOST_OPEN, HOST_CLOSE) | (PANEL_OPEN, PANEL_CLOSE) => {}
            (open, close) => {
                return Err(ParseError::InvalidFrame(format!(
                    "bad control brackets 0x{:02X}/0x{:02X}",
                    open, close
                )))
            }
        }

        let (side, area, value) = (frame[1], frame[2], frame[4]);
        match frame[COMMAND_OFFSET] {
            CODE_HALT => Ok(Self::Halt),
            CODE_START => Ok(Self::Start),
            CODE_RESET => Ok(Self::ResetThreshold),
            CODE_RATIO => Ok(Self::RatioQuery { side, area, value }),
            CODE_SENSITIVITY => Ok(Self::SensitivityQuery { side, area, value }),
            other => Err(ParseError::UnknownCommand(format!(
                "touch cmd 0x{:02X} in {:02X?}",
                other, frame
            ))),
        }
    }

    /// The command byte for this command
    pub fn code(&self) -> u8 {
        match self {
            Self::Halt => CODE_HALT,
            Self::Start => CODE_START,
            Self::ResetThreshold => CODE_RESET,
            Self::RatioQuery { .. } => CODE_RATIO,
            Self::SensitivityQuery { .. } => CODE_SENSITIVITY,
        }
    }

    /// Short human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Halt => "HALT",
            Self::Start => "STAT",
            Self::ResetThreshold => "RSET",
            Self::RatioQuery { .. } => "ratio",
            Self::SensitivityQuery { .. } => "sensitivity",
        }
    }

    /// Build the frame for this command with the given bracket markers
    pub fn to_frame(&self, open: u8, close: u8) -> [u8; CONTROL_FRAME_LEN] {
        let mut frame = match self {
            Self::Halt => HALT_FRAME,
            Self::Start => START_FRAME,
            Self::ResetThreshold => RESET_FRAME,
            Self::RatioQuery { side, area, value }
            | Self::SensitivityQuery { side, area, value } => {
                [0, *side, *area, self.code(), *value, 0]
            }
        };
        frame[0] = open;
        frame[CONTROL_FRAME_LEN - 1] = close;
        frame
    }

    /// Build the frame the game host would send for this command
    pub fn to_host_frame(&self) -> [u8; CONTROL_FRAME_LEN] {
        self.to_frame(HOST_OPEN, HOST_CLOSE)
    }

    /// The acknowledgement a panel sends back for this command, if any
    ///
    /// Ratio and sensitivity queries are answered by echoing the request with
    /// panel brackets. All other commands are silent.
    pub fn acknowledgement(&self) -> Option<[u8; CONTROL_FRAME_LEN]> {
        match self {
            Self::RatioQuery { .. } | Self::SensitivityQuery { .. } => {
                Some(self.to_frame(PANEL_OPEN, PANEL_CLOSE))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_commands() {
        assert_eq!(ControlCommand::parse(b"{HALT}"), Ok(ControlCommand::Halt));
        assert_eq!(ControlCommand::parse(b"{STAT}"), Ok(ControlCommand::Start));
        assert_eq!(
            ControlCommand::parse(b"{RSET}"),
            Ok(ControlCommand::ResetThreshold)
        );
        assert_eq!(
            ControlCommand::parse(b"{LAr2}"),
            Ok(ControlCommand::RatioQuery {
                side: b'L',
                area: b'A',
                value: b'2'
            })
        );
    }

    #[test]
    fn test_parse_rejects_mixed_brackets() {
        assert!(matches!(
            ControlCommand::parse(b"{HALT)"),
            Err(ParseError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_parse_unknown_code() {
        assert!(matches!(
            ControlCommand::parse(b"{LAt2}"),
            Err(ParseError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_acknowledgement_swaps_brackets() {
        let cmd = ControlCommand::parse(b"{RBk\x14}").unwrap();
        assert_eq!(cmd.acknowledgement(), Some(*b"(RBk\x14)"));
        assert_eq!(ControlCommand::Halt.acknowledgement(), None);
    }

    #[test]
    fn test_host_frames() {
        assert_eq!(ControlCommand::Halt.to_host_frame(), HALT_FRAME);
        assert_eq!(ControlCommand::Start.to_host_frame(), START_FRAME);
    }

    #[test]
    fn test_filler_is_canonicalised() {
        let cmd = ControlCommand::parse(b"{xxLx}").unwrap();
        assert_eq!(cmd, ControlCommand::Halt);
        assert_eq!(cmd.to_host_frame(), HALT_FRAME);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn query_frames_rebuild_exactly(
                side: u8,
                area: u8,
                value: u8,
                code in prop_oneof![Just(CODE_RATIO), Just(CODE_SENSITIVITY)],
            ) {
                let raw = [HOST_OPEN, side, area, code, value, HOST_CLOSE];
                let cmd = ControlCommand::parse(&raw).unwrap();
                prop_assert_eq!(cmd.to_host_frame(), raw);

                let echo = cmd.acknowledgement().unwrap();
                prop_assert_eq!(&echo[1..5], &raw[1..5]);
                prop_assert_eq!((echo[0], echo[5]), (PANEL_OPEN, PANEL_CLOSE));
            }
        }
    }
}
