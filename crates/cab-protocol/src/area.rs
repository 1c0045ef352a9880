//! Legacy-to-modern sensor area translation
//!
//! The legacy panel reports four coarse sensor groups per player, each with
//! five sensor bits. The modern panel reports 34 individual zones. Every
//! legacy sensor covers an outer `A`/`B` zone plus the two neighbouring inner
//! `D`/`E` zones, so a single legacy bit fans out to three modern zones.
//!
//! The centre is the exception: the legacy panel has a single centre sensor
//! where the modern panel has two (`C1`, `C2`). The translator alternates
//! between them on successive touches so that both halves see activity.

use std::fmt;

use crate::legacy::{LegacySensorFrame, GROUPS_PER_PLAYER};
use crate::modern::ModernSensorFrame;
use crate::PlayerId;

/// Bits of a legacy group byte, in table column order
pub const LEGACY_BITS: [u8; 5] = [1, 2, 4, 8, 16];

/// Zones per modern data byte
const ZONES_PER_BYTE: usize = 5;

/// One addressable zone of the modern touch panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[rustfmt::skip]
pub enum TouchZone {
    A1, A2, A3, A4, A5, A6, A7, A8,
    B1, B2, B3, B4, B5, B6, B7, B8,
    C1, C2,
    D1, D2, D3, D4, D5, D6, D7, D8,
    E1, E2, E3, E4, E5, E6, E7, E8,
}

impl TouchZone {
    /// All zones in wire order
    #[rustfmt::skip]
    pub const ALL: [TouchZone; 34] = [
        TouchZone::A1, TouchZone::A2, TouchZone::A3, TouchZone::A4,
        TouchZone::A5, TouchZone::A6, TouchZone::A7, TouchZone::A8,
        TouchZone::B1, TouchZone::B2, TouchZone::B3, TouchZone::B4,
        TouchZone::B5, TouchZone::B6, TouchZone::B7, TouchZone::B8,
        TouchZone::C1, TouchZone::C2,
        TouchZone::D1, TouchZone::D2, TouchZone::D3, TouchZone::D4,
        TouchZone::D5, TouchZone::D6, TouchZone::D7, TouchZone::D8,
        TouchZone::E1, TouchZone::E2, TouchZone::E3, TouchZone::E4,
        TouchZone::E5, TouchZone::E6, TouchZone::E7, TouchZone::E8,
    ];

    /// Position of this zone in wire order
    pub fn index(self) -> usize {
        self as usize
    }

    /// Data byte holding this zone (1-based frame offset, 1..=7)
    pub fn byte(self) -> usize {
        self.index() / ZONES_PER_BYTE + 1
    }

    /// Bit mask of this zone within its data byte
    pub fn mask(self) -> u8 {
        1 << (self.index() % ZONES_PER_BYTE)
    }

    /// Zone name as printed on the panel diagrams
    pub fn name(self) -> &'static str {
        const NAMES: [&str; 34] = [
            "A1", "A2", "A3", "A4", "A5", "A6", "A7", "A8", "B1", "B2", "B3", "B4", "B5", "B6",
            "B7", "B8", "C1", "C2", "D1", "D2", "D3", "D4", "D5", "D6", "D7", "D8", "E1", "E2",
            "E3", "E4", "E5", "E6", "E7", "E8",
        ];
        NAMES[self.index()]
    }
}

impl fmt::Display for TouchZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a single legacy sensor bit maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaMapping {
    /// An outer zone plus the two inner zones next to it
    Spread {
        primary: TouchZone,
        spread: [TouchZone; 2],
    },
    /// The centre sensor, alternating between two zones
    Alternating([TouchZone; 2]),
}

impl AreaMapping {
    const fn spread(primary: TouchZone, a: TouchZone, b: TouchZone) -> Option<Self> {
        Some(AreaMapping::Spread {
            primary,
            spread: [a, b],
        })
    }
}

use TouchZone::*;

/// Mapping table indexed by `[group][bit position]`
#[rustfmt::skip]
static AREA_TABLE: [[Option<AreaMapping>; 5]; GROUPS_PER_PLAYER] = [
    [
        AreaMapping::spread(A1, D1, D2),
        AreaMapping::spread(B1, E1, E2),
        AreaMapping::spread(A2, D2, D3),
        AreaMapping::spread(B2, E2, E3),
        None,
    ],
    [
        AreaMapping::spread(A3, D3, D4),
        AreaMapping::spread(B3, E3, E4),
        AreaMapping::spread(A4, D4, D5),
        AreaMapping::spread(B4, E4, E5),
        None,
    ],
    [
        AreaMapping::spread(A5, D5, D6),
        AreaMapping::spread(B5, E5, E6),
        AreaMapping::spread(A6, D6, D7),
        AreaMapping::spread(B6, E6, E7),
        None,
    ],
    [
        AreaMapping::spread(A7, D7, D8),
        AreaMapping::spread(B7, E7, E8),
        AreaMapping::spread(A8, D8, D1),
        AreaMapping::spread(B8, E8, E1),
        Some(AreaMapping::Alternating([C1, C2])),
    ],
];

/// Look up the mapping for a legacy group and sensor bit
///
/// Returns `None` for bits no sensor drives, for out-of-range groups and for
/// values that are not a single sensor bit.
pub fn mapping(group: usize, bit: u8) -> Option<&'static AreaMapping> {
    let column = LEGACY_BITS.iter().position(|b| *b == bit)?;
    AREA_TABLE.get(group)?.get(column)?.as_ref()
}

/// Translate one player's four legacy group bytes into a modern frame
///
/// `center_toggle` selects `C1` (false) or `C2` (true) for the centre sensor
/// and flips every time the centre sensor is seen touched.
pub fn translate_groups(
    groups: [u8; GROUPS_PER_PLAYER],
    center_toggle: &mut bool,
) -> ModernSensorFrame {
    let mut frame = ModernSensorFrame::new();

    for (group, value) in groups.iter().enumerate() {
        for bit in LEGACY_BITS {
            if value & bit == 0 {
                continue;
            }
            match mapping(group, bit) {
                Some(AreaMapping::Spread { primary, spread }) => {
                    frame.set_zone(*primary);
                    frame.set_zone(spread[0]);
                    frame.set_zone(spread[1]);
                }
                Some(AreaMapping::Alternating(zones)) => {
                    frame.set_zone(zones[usize::from(*center_toggle)]);
                    *center_toggle = !*center_toggle;
                }
                None => {}
            }
        }
    }

    frame
}

/// Translate one player's half of a legacy sensor frame
pub fn translate_player(
    frame: &LegacySensorFrame,
    player: PlayerId,
    center_toggle: &mut bool,
) -> ModernSensorFrame {
    translate_groups(frame.player_groups(player), center_toggle)
}
