//! Digital input decoding
//!
//! A read-digital response section holds one system byte followed by
//! `players * bytes_per_player` switch bytes. [`SwitchBinding`]s describe
//! which bit of which byte drives which [`Button`], and with what polarity.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::PlayerId;

/// A named cabinet button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Button {
    /// Player select (start) button
    Select(PlayerId),
    /// One of the eight buttons around a player's screen, numbered 1..=8
    Ring { player: PlayerId, number: u8 },
}

impl Button {
    /// Stable name used in configuration, e.g. `p1_select` or `p2_ring5`
    pub fn key_name(&self) -> String {
        match self {
            Button::Select(player) => format!("p{}_select", player.number()),
            Button::Ring { player, number } => format!("p{}_ring{}", player.number(), number),
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Button::Select(player) => write!(f, "{} select", player),
            Button::Ring { player, number } => write!(f, "{} button {}", player, number),
        }
    }
}

impl FromStr for Button {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseError::UnknownCommand(format!("button name {:?}", s));

        let (player, rest) = match s.split_once('_') {
            Some(("p1", rest)) => (PlayerId::One, rest),
            Some(("p2", rest)) => (PlayerId::Two, rest),
            _ => return Err(bad()),
        };

        if rest == "select" {
            return Ok(Button::Select(player));
        }
        let number: u8 = rest
            .strip_prefix("ring")
            .and_then(|n| n.parse().ok())
            .ok_or_else(bad)?;
        if !(1..=8).contains(&number) {
            return Err(bad());
        }
        Ok(Button::Ring { player, number })
    }
}

/// Electrical polarity of a switch bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Bit set means pressed
    ActiveHigh,
    /// Bit clear means pressed
    ActiveLow,
}

/// Where a button lives in a [`DigitalInputFrame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchBinding {
    pub button: Button,
    /// Index into the frame (0 is the system byte)
    pub byte: usize,
    pub mask: u8,
    pub polarity: Polarity,
}

const fn select(player: PlayerId, byte: usize, mask: u8) -> SwitchBinding {
    SwitchBinding {
        button: Button::Select(player),
        byte,
        mask,
        polarity: Polarity::ActiveHigh,
    }
}

const fn ring(player: PlayerId, number: u8, byte: usize, mask: u8) -> SwitchBinding {
    SwitchBinding {
        button: Button::Ring { player, number },
        byte,
        mask,
        polarity: Polarity::ActiveLow,
    }
}

/// Switch wiring of the Finale cabinet harness (two players, two bytes each)
#[rustfmt::skip]
pub static FINALE_LAYOUT: [SwitchBinding; 18] = [
    select(PlayerId::One, 0, 0x80),
    select(PlayerId::Two, 1, 0x40),
    ring(PlayerId::One, 1, 1, 0x20),
    ring(PlayerId::One, 2, 1, 0x10),
    ring(PlayerId::One, 3, 1, 0x08),
    ring(PlayerId::One, 4, 1, 0x04),
    ring(PlayerId::One, 5, 1, 0x02),
    ring(PlayerId::One, 6, 1, 0x01),
    ring(PlayerId::One, 7, 2, 0x80),
    ring(PlayerId::One, 8, 2, 0x40),
    ring(PlayerId::Two, 1, 3, 0x20),
    ring(PlayerId::Two, 2, 3, 0x10),
    ring(PlayerId::Two, 3, 3, 0x08),
    ring(PlayerId::Two, 4, 3, 0x04),
    ring(PlayerId::Two, 5, 3, 0x02),
    ring(PlayerId::Two, 6, 3, 0x01),
    ring(PlayerId::Two, 7, 4, 0x80),
    ring(PlayerId::Two, 8, 4, 0x40),
];

/// Switch bytes from one read-digital response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitalInputFrame {
    bytes: Vec<u8>,
}

impl DigitalInputFrame {
    /// Wrap raw switch bytes (system byte first)
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Take the switch bytes out of a read-digital section
    pub fn from_section(
        data: &[u8],
        players: u8,
        bytes_per_player: u8,
    ) -> Result<Self, ParseError> {
        let needed = 1 + players as usize * bytes_per_player as usize;
        if data.len() < needed {
            return Err(ParseError::ShortResponse {
                command: "read digital",
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            bytes: data[..needed].to_vec(),
        })
    }

    /// The frame a harness with nothing pressed reports
    pub fn released(layout: &[SwitchBinding], len: usize) -> Self {
        let mut frame = Self::new(vec![0; len]);
        for binding in layout {
            frame.set(binding, false);
        }
        frame
    }

    /// System byte (test/service/tilt switches)
    pub fn system(&self) -> u8 {
        self.bytes.first().copied().unwrap_or(0)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether a bound button reads as pressed
    ///
    /// Bindings outside the frame read as released.
    pub fn pressed(&self, binding: &SwitchBinding) -> bool {
        let Some(byte) = self.bytes.get(binding.byte) else {
            return false;
        };
        let set = byte & binding.mask != 0;
        match binding.polarity {
            Polarity::ActiveHigh => set,
            Polarity::ActiveLow => !set,
        }
    }

    /// Drive a bound button to a state
    pub fn set(&mut self, binding: &SwitchBinding, pressed: bool) {
        let Some(byte) = self.bytes.get_mut(binding.byte) else {
            return;
        };
        let set = match binding.polarity {
            Polarity::ActiveHigh => pressed,
            Polarity::ActiveLow => !pressed,
        };
        if set {
            *byte |= binding.mask;
        } else {
            *byte &= !binding.mask;
        }
    }

    /// State of every bound button
    pub fn decode(&self, layout: &[SwitchBinding]) -> Vec<(Button, bool)> {
        layout
            .iter()
            .filter(|b| b.byte < self.bytes.len())
            .map(|b| (b.button, self.pressed(b)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_names() {
        for binding in FINALE_LAYOUT.iter() {
            let name = binding.button.key_name();
            assert_eq!(name.parse::<Button>(), Ok(binding.button));
        }
        assert_eq!(
            Button::Ring {
                player: PlayerId::Two,
                number: 5
            }
            .key_name(),
            "p2_ring5"
        );
        assert!("p3_select".parse::<Button>().is_err());
        assert!("p1_ring9".parse::<Button>().is_err());
        assert!("p1_coin".parse::<Button>().is_err());
    }

    #[test]
    fn test_idle_harness() {
        // Ring buttons idle high, selects idle low
        let frame = DigitalInputFrame::new(vec![0x00, 0x3F, 0xC0, 0x3F, 0xC0]);
        assert!(frame.decode(&FINALE_LAYOUT).iter().all(|(_, p)| !p));
        assert_eq!(frame, DigitalInputFrame::released(&FINALE_LAYOUT, 5));
    }

    #[test]
    fn test_pressed_buttons() {
        let frame = DigitalInputFrame::new(vec![0x80, 0x3F & !0x20, 0xC0, 0x3F, 0xC0 & !0x40]);
        let pressed: Vec<Button> = frame
            .decode(&FINALE_LAYOUT)
            .into_iter()
            .filter(|(_, p)| *p)
            .map(|(b, _)| b)
            .collect();
        assert_eq!(
            pressed,
            vec![
                Button::Select(PlayerId::One),
                Button::Ring {
                    player: PlayerId::One,
                    number: 1
                },
                Button::Ring {
                    player: PlayerId::Two,
                    number: 8
                },
            ]
        );
    }

    #[test]
    fn test_p2_select_shares_p1_byte() {
        let mut frame = DigitalInputFrame::released(&FINALE_LAYOUT, 5);
        frame.set(&FINALE_LAYOUT[1], true);
        assert_eq!(frame.as_bytes()[1], 0x7F);
        assert!(frame.pressed(&FINALE_LAYOUT[1]));
        assert!(!frame.pressed(&FINALE_LAYOUT[2]));
    }

    #[test]
    fn test_from_section() {
        let frame = DigitalInputFrame::from_section(&[0, 1, 2, 3, 4, 5], 2, 2).unwrap();
        assert_eq!(frame.as_bytes(), &[0, 1, 2, 3, 4]);
        assert_eq!(
            DigitalInputFrame::from_section(&[0, 1, 2], 2, 2),
            Err(ParseError::ShortResponse {
                command: "read digital",
                needed: 5,
                got: 3
            })
        );
    }

    #[test]
    fn test_short_frame_skips_missing_bindings() {
        let frame = DigitalInputFrame::new(vec![0x80, 0x3F]);
        let decoded = frame.decode(&FINALE_LAYOUT);
        assert_eq!(decoded.len(), 8);
    }
}
