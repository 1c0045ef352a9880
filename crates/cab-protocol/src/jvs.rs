//! JVS I/O board protocol
//!
//! JVS is an addressed master/slave protocol over RS-485. Every packet has
//! the shape:
//!
//! ```text
//! SYNC(E0) [destination] [size] [payload...] [checksum]
//! ```
//!
//! `size` counts the payload plus the checksum byte, and the checksum is the
//! 8-bit sum of destination, size and payload. Any byte after `SYNC` that
//! equals `SYNC` or `MARK` is sent as `MARK, value - 1`.
//!
//! Responses from a device are addressed to the host (`0x00`). Their payload
//! starts with a packet status byte, followed by one section per request
//! command, each starting with a report byte.

use std::fmt;

use crate::error::ParseError;
use crate::{EncodeFrame, FrameCodec};

/// Start of every packet
pub const SYNC: u8 = 0xE0;
/// Escape marker
pub const MARK: u8 = 0xD0;
/// Broadcast destination
pub const BROADCAST: u8 = 0xFF;
/// Address of the host
pub const HOST_ADDRESS: u8 = 0x00;

/// Largest payload that fits the size byte alongside the checksum
pub const MAX_PAYLOAD_LEN: usize = 254;

/// Reset all devices (broadcast, followed by [`RESET_ARG`])
pub const CMD_RESET: u8 = 0xF0;
/// Fixed argument of the reset command
pub const RESET_ARG: u8 = 0xD9;
/// Assign a device address
pub const CMD_ASSIGN_ADDRESS: u8 = 0xF1;
/// Request the identity string
pub const CMD_REQUEST_ID: u8 = 0x10;
/// Request the command format version
pub const CMD_COMMAND_VERSION: u8 = 0x11;
/// Request the JVS version
pub const CMD_JVS_VERSION: u8 = 0x12;
/// Request the communications version
pub const CMD_COMMS_VERSION: u8 = 0x13;
/// Request the function (capability) list
pub const CMD_CAPABILITIES: u8 = 0x14;
/// Read digital switch inputs
pub const CMD_READ_DIGITAL: u8 = 0x20;

/// Report byte for a normally processed command
pub const REPORT_NORMAL: u8 = 0x01;

/// Maximum raw bytes held while waiting for a packet to complete
const MAX_BUFFER_LEN: usize = 4096;

/// Compute the checksum of a packet
pub fn checksum(destination: u8, size: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(destination.wrapping_add(size), |sum, b| sum.wrapping_add(*b))
}

fn push_escaped(out: &mut Vec<u8>, byte: u8) {
    if byte == SYNC || byte == MARK {
        out.push(MARK);
        out.push(byte.wrapping_sub(1));
    } else {
        out.push(byte);
    }
}

/// A decoded or ready-to-send JVS packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvsPacket {
    destination: u8,
    payload: Vec<u8>,
    checksum: u8,
}

impl JvsPacket {
    /// Build a packet, computing its checksum
    pub fn new(destination: u8, payload: Vec<u8>) -> Result<Self, ParseError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ParseError::PayloadTooLong(payload.len()));
        }
        let checksum = checksum(destination, payload.len() as u8 + 1, &payload);
        Ok(Self {
            destination,
            payload,
            checksum,
        })
    }

    /// Destination address
    pub fn destination(&self) -> u8 {
        self.destination
    }

    /// Payload bytes (unescaped, without checksum)
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size byte as sent on the wire
    pub fn size(&self) -> u8 {
        self.payload.len() as u8 + 1
    }

    /// Checksum byte
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Check whether this packet is addressed to the host
    pub fn is_for_host(&self) -> bool {
        self.destination == HOST_ADDRESS
    }
}

impl EncodeFrame for JvsPacket {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 4);
        out.push(SYNC);
        push_escaped(&mut out, self.destination);
        push_escaped(&mut out, self.size());
        for b in &self.payload {
            push_escaped(&mut out, *b);
        }
        push_escaped(&mut out, self.checksum);
        out
    }
}

/// Result of scanning the buffer for one packet
enum Scan {
    /// Not enough bytes yet
    Incomplete,
    /// A raw SYNC appeared inside the candidate at this offset
    Restart(usize),
    /// A complete candidate of `consumed` raw bytes
    Complete { consumed: usize, body: Vec<u8> },
}

/// Streaming codec for JVS packets
///
/// Yields `Err` for packets that were framed correctly but failed
/// validation; those bytes are consumed so the stream keeps moving.
#[derive(Debug, Default)]
pub struct JvsCodec {
    buffer: Vec<u8>,
}

impl JvsCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(64),
        }
    }

    /// Unescape bytes following a SYNC at offset 0
    ///
    /// The body holds destination, size, payload and checksum.
    fn scan(&self) -> Scan {
        let mut body = Vec::new();
        let mut i = 1;
        let mut escaped = false;

        loop {
            if body.len() >= 2 {
                let size = body[1] as usize;
                if size == 0 || body.len() == size + 2 {
                    return Scan::Complete { consumed: i, body };
                }
            }

            let Some(&b) = self.buffer.get(i) else {
                return Scan::Incomplete;
            };
            if b == SYNC {
                return Scan::Restart(i);
            }
            i += 1;

            if escaped {
                body.push(b.wrapping_add(1));
                escaped = false;
            } else if b == MARK {
                escaped = true;
            } else {
                body.push(b);
            }
        }
    }
}

impl FrameCodec for JvsCodec {
    type Frame = Result<JvsPacket, ParseError>;

    fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);

        // Prevent buffer overflow
        if self.buffer.len() > MAX_BUFFER_LEN {
            let start = self.buffer.len() - MAX_BUFFER_LEN / 2;
            self.buffer.drain(..start);
        }
    }

    fn next_frame_with_bytes(&mut self) -> Option<(Self::Frame, Vec<u8>)> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == SYNC) else {
                if !self.buffer.is_empty() {
                    tracing::debug!("JVS codec dropped {:02X?}", self.buffer);
                    self.buffer.clear();
                }
                return None;
            };
            if pos > 0 {
                tracing::debug!("JVS codec skipped {:02X?}", &self.buffer[..pos]);
                self.buffer.drain(..pos);
            }

            match self.scan() {
                Scan::Incomplete => return None,
                Scan::Restart(at) => {
                    tracing::debug!(
                        "JVS packet interrupted by SYNC: {:02X?}",
                        &self.buffer[..at]
                    );
                    self.buffer.drain(..at);
                }
                Scan::Complete { consumed, body } => {
                    let raw: Vec<u8> = self.buffer.drain(..consumed).collect();
                    let (destination, size) = (body[0], body[1]);

                    if size == 0 {
                        return Some((
                            Err(ParseError::InvalidFrame("JVS packet with size 0".into())),
                            raw,
                        ));
                    }

                    let payload = body[2..body.len() - 1].to_vec();
                    let actual = body[body.len() - 1];
                    let expected = checksum(destination, size, &payload);
                    if expected != actual {
                        tracing::warn!("JVS checksum mismatch in {:02X?}", raw);
                        return Some((
                            Err(ParseError::ChecksumMismatch { expected, actual }),
                            raw,
                        ));
                    }

                    return Some((
                        Ok(JvsPacket {
                            destination,
                            payload,
                            checksum: actual,
                        }),
                        raw,
                    ));
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

/// Packet-level status reported by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Request processed normally
    Normal,
    /// Request contained an unknown command
    UnknownCommand,
    /// Device saw a checksum error in the request
    ChecksumError,
    /// Device's acknowledgement buffer overflowed
    Overflow,
    /// Any other status byte
    Other(u8),
}

impl ResponseStatus {
    /// Decode a status byte
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x01 => Self::Normal,
            0x02 => Self::UnknownCommand,
            0x03 => Self::ChecksumError,
            0x04 => Self::Overflow,
            other => Self::Other(other),
        }
    }

    /// Encode as a status byte
    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Normal => 0x01,
            Self::UnknownCommand => 0x02,
            Self::ChecksumError => 0x03,
            Self::Overflow => 0x04,
            Self::Other(b) => *b,
        }
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::UnknownCommand => write!(f, "unknown command"),
            Self::ChecksumError => write!(f, "checksum error"),
            Self::Overflow => write!(f, "acknowledgement overflow"),
            Self::Other(b) => write!(f, "0x{:02X}", b),
        }
    }
}

/// Commands the host sends to an I/O board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JvsCommand {
    /// Reset every device on the bus
    Reset,
    /// Assign an address to the next unaddressed device
    AssignAddress(u8),
    /// Request the identity string
    RequestId,
    /// Request the command format version
    CommandVersion,
    /// Request the JVS version
    JvsVersion,
    /// Request the communications version
    CommsVersion,
    /// Request the function list
    Capabilities,
    /// Read the digital switch inputs
    ReadDigital { players: u8, bytes_per_player: u8 },
}

impl JvsCommand {
    /// Encode the command bytes for a request payload
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Reset => vec![CMD_RESET, RESET_ARG],
            Self::AssignAddress(addr) => vec![CMD_ASSIGN_ADDRESS, *addr],
            Self::RequestId => vec![CMD_REQUEST_ID],
            Self::CommandVersion => vec![CMD_COMMAND_VERSION],
            Self::JvsVersion => vec![CMD_JVS_VERSION],
            Self::CommsVersion => vec![CMD_COMMS_VERSION],
            Self::Capabilities => vec![CMD_CAPABILITIES],
            Self::ReadDigital {
                players,
                bytes_per_player,
            } => vec![CMD_READ_DIGITAL, *players, *bytes_per_player],
        }
    }

    /// Parse a request payload holding a single command
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        let Some(&code) = payload.first() else {
            return Err(ParseError::InvalidFrame("empty JVS request".into()));
        };
        let arg = |n: usize| {
            payload.get(n).copied().ok_or_else(|| ParseError::Incomplete {
                needed: n + 1 - payload.len(),
            })
        };

        match code {
            CMD_RESET => {
                let a = arg(1)?;
                if a != RESET_ARG {
                    return Err(ParseError::InvalidFrame(format!(
                        "reset argument 0x{:02X}",
                        a
                    )));
                }
                Ok(Self::Reset)
            }
            CMD_ASSIGN_ADDRESS => Ok(Self::AssignAddress(arg(1)?)),
            CMD_REQUEST_ID => Ok(Self::RequestId),
            CMD_COMMAND_VERSION => Ok(Self::CommandVersion),
            CMD_JVS_VERSION => Ok(Self::JvsVersion),
            CMD_COMMS_VERSION => Ok(Self::CommsVersion),
            CMD_CAPABILITIES => Ok(Self::Capabilities),
            CMD_READ_DIGITAL => Ok(Self::ReadDigital {
                players: arg(1)?,
                bytes_per_player: arg(2)?,
            }),
            other => Err(ParseError::UnknownCommand(format!("JVS 0x{:02X}", other))),
        }
    }

    /// Whether a device answers this command
    pub fn expects_response(&self) -> bool {
        !matches!(self, Self::Reset)
    }

    /// Short name for logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::AssignAddress(_) => "assign address",
            Self::RequestId => "request id",
            Self::CommandVersion => "command version",
            Self::JvsVersion => "jvs version",
            Self::CommsVersion => "comms version",
            Self::Capabilities => "capabilities",
            Self::ReadDigital { .. } => "read digital",
        }
    }

    /// Build the request packet for this command
    pub fn to_packet(&self, destination: u8) -> JvsPacket {
        let payload = self.to_bytes();
        let checksum = checksum(destination, payload.len() as u8 + 1, &payload);
        JvsPacket {
            destination,
            payload,
            checksum,
        }
    }
}

/// A device response: packet status plus the command sections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JvsResponse {
    pub status: ResponseStatus,
    /// Everything after the status byte (report bytes included)
    pub data: Vec<u8>,
}

impl JvsResponse {
    /// A normal response carrying one command section
    pub fn normal(report: u8, data: &[u8]) -> Self {
        let mut section = Vec::with_capacity(data.len() + 1);
        section.push(report);
        section.extend_from_slice(data);
        Self {
            status: ResponseStatus::Normal,
            data: section,
        }
    }

    /// Interpret a packet payload as a response
    pub fn from_packet(packet: &JvsPacket) -> Result<Self, ParseError> {
        let payload = packet.payload();
        let Some((&status, data)) = payload.split_first() else {
            return Err(ParseError::ShortResponse {
                command: "status",
                needed: 1,
                got: 0,
            });
        };
        Ok(Self {
            status: ResponseStatus::from_byte(status),
            data: data.to_vec(),
        })
    }

    /// Build the packet a device would send to the host
    pub fn to_packet(&self) -> Result<JvsPacket, ParseError> {
        let mut payload = Vec::with_capacity(self.data.len() + 1);
        payload.push(self.status.as_byte());
        payload.extend_from_slice(&self.data);
        JvsPacket::new(HOST_ADDRESS, payload)
    }

    /// Check status and report, returning the section data for one command
    pub fn section(&self, command: &'static str) -> Result<&[u8], ParseError> {
        if self.status != ResponseStatus::Normal {
            return Err(ParseError::BadStatus(self.status));
        }
        let Some((&report, data)) = self.data.split_first() else {
            return Err(ParseError::ShortResponse {
                command,
                needed: 1,
                got: 0,
            });
        };
        if report != REPORT_NORMAL {
            return Err(ParseError::BadReport { command, report });
        }
        Ok(data)
    }
}

/// Decode a NUL-terminated identity string
pub fn parse_identity(data: &[u8]) -> String {
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// A BCD-encoded version number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    /// Decode a BCD byte, `0x13` being version 1.3
    pub fn from_bcd(b: u8) -> Self {
        Self {
            major: b >> 4,
            minor: b & 0x0F,
        }
    }

    /// Encode as a BCD byte
    pub fn to_bcd(&self) -> u8 {
        (self.major << 4) | (self.minor & 0x0F)
    }

    /// Decode the first byte of a version response section
    pub fn parse(command: &'static str, data: &[u8]) -> Result<Self, ParseError> {
        data.first()
            .map(|b| Self::from_bcd(*b))
            .ok_or(ParseError::ShortResponse {
                command,
                needed: 1,
                got: 0,
            })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// One entry of a device's function list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Capability {
    /// Digital switches: player count and switches per player
    Switches { players: u8, switches: u8 },
    /// Coin slots
    Coins { slots: u8 },
    /// Analog inputs with resolution in bits
    Analog { channels: u8, bits: u8 },
    /// Rotary encoders
    Rotary { channels: u8 },
    /// Keycode input
    Keycode,
    /// Screen position (light gun) input
    Screen { x_bits: u8, y_bits: u8, channels: u8 },
    /// Miscellaneous switch inputs
    MiscSwitches { count: u16 },
    /// Card slots
    Card { slots: u8 },
    /// Medal hoppers
    Hopper { channels: u8 },
    /// General purpose outputs
    Outputs { slots: u8 },
    /// Analog outputs
    AnalogOutputs { channels: u8 },
    /// Character display
    Display { width: u8, height: u8, kind: u8 },
    /// Backup data
    Backup,
    /// Function code this crate does not know
    Unknown { code: u8, params: [u8; 3] },
}

/// Terminates a function list
pub const CAPABILITY_END: u8 = 0x00;

impl Capability {
    /// Decode one 4-byte function entry
    pub fn from_entry(entry: [u8; 4]) -> Self {
        let [code, a, b, c] = entry;
        match code {
            0x01 => Self::Switches {
                players: a,
                switches: b,
            },
            0x02 => Self::Coins { slots: a },
            0x03 => Self::Analog {
                channels: a,
                bits: b,
            },
            0x04 => Self::Rotary { channels: a },
            0x05 => Self::Keycode,
            0x06 => Self::Screen {
                x_bits: a,
                y_bits: b,
                channels: c,
            },
            0x07 => Self::MiscSwitches {
                count: u16::from_be_bytes([a, b]),
            },
            0x10 => Self::Card { slots: a },
            0x11 => Self::Hopper { channels: a },
            0x12 => Self::Outputs { slots: a },
            0x13 => Self::AnalogOutputs { channels: a },
            0x14 => Self::Display {
                width: a,
                height: b,
                kind: c,
            },
            0x15 => Self::Backup,
            code => Self::Unknown {
                code,
                params: [a, b, c],
            },
        }
    }

    /// Encode as a 4-byte function entry
    pub fn to_entry(&self) -> [u8; 4] {
        match *self {
            Self::Switches { players, switches } => [0x01, players, switches, 0],
            Self::Coins { slots } => [0x02, slots, 0, 0],
            Self::Analog { channels, bits } => [0x03, channels, bits, 0],
            Self::Rotary { channels } => [0x04, channels, 0, 0],
            Self::Keycode => [0x05, 0, 0, 0],
            Self::Screen {
                x_bits,
                y_bits,
                channels,
            } => [0x06, x_bits, y_bits, channels],
            Self::MiscSwitches { count } => {
                let [hi, lo] = count.to_be_bytes();
                [0x07, hi, lo, 0]
            }
            Self::Card { slots } => [0x10, slots, 0, 0],
            Self::Hopper { channels } => [0x11, channels, 0, 0],
            Self::Outputs { slots } => [0x12, slots, 0, 0],
            Self::AnalogOutputs { channels } => [0x13, channels, 0, 0],
            Self::Display {
                width,
                height,
                kind,
            } => [0x14, width, height, kind],
            Self::Backup => [0x15, 0, 0, 0],
            Self::Unknown { code, params } => [code, params[0], params[1], params[2]],
        }
    }
}

/// Parse a function list up to its terminator
pub fn parse_capabilities(data: &[u8]) -> Result<Vec<Capability>, ParseError> {
    let mut caps = Vec::new();
    let mut rest = data;
    loop {
        match rest.first() {
            None | Some(&CAPABILITY_END) => return Ok(caps),
            Some(_) if rest.len() < 4 => {
                return Err(ParseError::ShortResponse {
                    command: "capabilities",
                    needed: 4,
                    got: rest.len(),
                })
            }
            Some(_) => {
                caps.push(Capability::from_entry([rest[0], rest[1], rest[2], rest[3]]));
                rest = &rest[4..];
            }
        }
    }
}

/// Encode a function list with its terminator
pub fn encode_capabilities(caps: &[Capability]) -> Vec<u8> {
    let mut out: Vec<u8> = caps.iter().flat_map(|c| c.to_entry()).collect();
    out.push(CAPABILITY_END);
    out
}

/// Everything learned about a device during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JvsDevice {
    pub address: u8,
    pub identity: String,
    pub command_version: Version,
    pub jvs_version: Version,
    pub comms_version: Version,
    pub capabilities: Vec<Capability>,
}

impl JvsDevice {
    /// Switch layout advertised by the device, if any
    pub fn switch_layout(&self) -> Option<(u8, u8)> {
        self.capabilities.iter().find_map(|c| match c {
            Capability::Switches { players, switches } => Some((*players, *switches)),
            _ => None,
        })
    }
}
