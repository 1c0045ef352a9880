//! Virtual JVS I/O board
//!
//! Answers the host the way a real board does: ignores everything until it
//! has an address, reports a configurable identity and function list, and
//! returns its switch bytes for read-digital requests. Faults can be queued
//! to exercise the host's error handling.

use std::collections::VecDeque;

use cab_protocol::inputs::{Button, DigitalInputFrame, SwitchBinding, FINALE_LAYOUT};
use cab_protocol::jvs::{
    encode_capabilities, Capability, JvsCommand, JvsPacket, JvsResponse, ResponseStatus,
    BROADCAST, REPORT_NORMAL,
};
use cab_protocol::{EncodeFrame, ParseError};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Static description of a virtual board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualBoardConfig {
    /// Identity string returned for request-id
    pub identity: String,
    /// Command format version (BCD)
    pub command_version: u8,
    /// JVS version (BCD)
    pub jvs_version: u8,
    /// Communications version (BCD)
    pub comms_version: u8,
    /// Players advertised in the switch capability
    pub players: u8,
    /// Switches per player advertised in the switch capability
    pub switches: u8,
    /// Coin slots advertised
    pub coin_slots: u8,
}

impl Default for VirtualBoardConfig {
    fn default() -> Self {
        Self {
            identity: "SEGA ENTERPRISES,LTD.;I/O BD JVS;837-14572;Ver1.00;2005/10".to_string(),
            command_version: 0x13,
            jvs_version: 0x30,
            comms_version: 0x10,
            players: 2,
            switches: 13,
            coin_slots: 2,
        }
    }
}

impl VirtualBoardConfig {
    /// Function list advertised for the capabilities request
    pub fn capabilities(&self) -> Vec<Capability> {
        vec![
            Capability::Switches {
                players: self.players,
                switches: self.switches,
            },
            Capability::Coins {
                slots: self.coin_slots,
            },
        ]
    }
}

/// A one-shot misbehaviour for the next response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardFault {
    /// Send the response with a wrong checksum
    BadChecksum,
    /// Report a checksum error in the status byte
    BadStatus,
    /// Report an error in the command's report byte
    BadReport,
    /// Send a response too short for the command
    ShortPayload,
    /// Do not answer at all
    Silence,
}

/// A simulated JVS I/O board
#[derive(Debug)]
pub struct VirtualIoBoard {
    config: VirtualBoardConfig,
    address: Option<u8>,
    layout: Vec<SwitchBinding>,
    switches: DigitalInputFrame,
    faults: VecDeque<BoardFault>,
    resets: u32,
    requests: u64,
}

impl VirtualIoBoard {
    /// Create an unaddressed board with the Finale switch layout
    pub fn new(config: VirtualBoardConfig) -> Self {
        let len = 1 + config.players as usize * 2;
        Self {
            config,
            address: None,
            layout: FINALE_LAYOUT.to_vec(),
            switches: DigitalInputFrame::released(&FINALE_LAYOUT, len),
            faults: VecDeque::new(),
            resets: 0,
            requests: 0,
        }
    }

    /// Board configuration
    pub fn config(&self) -> &VirtualBoardConfig {
        &self.config
    }

    /// Address assigned by the host, if any
    pub fn address(&self) -> Option<u8> {
        self.address
    }

    /// Number of reset commands seen
    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Number of requests addressed to this board
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Current switch bytes
    pub fn switches(&self) -> &DigitalInputFrame {
        &self.switches
    }

    /// Press or release a button
    pub fn set_button(&mut self, button: Button, pressed: bool) {
        if let Some(binding) = self.layout.iter().find(|b| b.button == button) {
            self.switches.set(binding, pressed);
        } else {
            warn!("Virtual board has no switch for {}", button);
        }
    }

    /// Queue a fault for an upcoming response
    pub fn inject_fault(&mut self, fault: BoardFault) {
        self.faults.push_back(fault);
    }

    /// Handle one request packet, returning the wire bytes to send back
    pub fn handle_packet(&mut self, packet: &JvsPacket) -> Option<Vec<u8>> {
        let for_us = match (packet.destination(), self.address) {
            (BROADCAST, _) => true,
            (dest, Some(addr)) => dest == addr,
            (_, None) => false,
        };
        if !for_us {
            return None;
        }

        let command = match JvsCommand::parse(packet.payload()) {
            Ok(command) => command,
            Err(ParseError::UnknownCommand(msg)) => {
                debug!("Virtual board rejecting {}", msg);
                return self.finish(JvsResponse {
                    status: ResponseStatus::UnknownCommand,
                    data: Vec::new(),
                });
            }
            Err(e) => {
                warn!("Virtual board ignoring malformed request: {}", e);
                return None;
            }
        };

        match command {
            JvsCommand::Reset => {
                self.resets += 1;
                self.address = None;
                return None;
            }
            JvsCommand::AssignAddress(addr) => {
                if self.address.is_some() {
                    return None;
                }
                self.address = Some(addr);
            }
            _ if self.address.is_none() => return None,
            _ => {}
        }

        self.requests += 1;
        let data = match command {
            JvsCommand::Reset | JvsCommand::AssignAddress(_) => Vec::new(),
            JvsCommand::RequestId => {
                let mut id = self.config.identity.as_bytes().to_vec();
                id.push(0);
                id
            }
            JvsCommand::CommandVersion => vec![self.config.command_version],
            JvsCommand::JvsVersion => vec![self.config.jvs_version],
            JvsCommand::CommsVersion => vec![self.config.comms_version],
            JvsCommand::Capabilities => encode_capabilities(&self.config.capabilities()),
            JvsCommand::ReadDigital {
                players,
                bytes_per_player,
            } => self.read_digital(players, bytes_per_player),
        };

        self.finish(JvsResponse::normal(REPORT_NORMAL, &data))
    }

    fn read_digital(&self, players: u8, bytes_per_player: u8) -> Vec<u8> {
        let len = 1 + players as usize * bytes_per_player as usize;
        let mut data = self.switches.as_bytes().to_vec();
        data.resize(len, 0);
        data
    }

    /// Apply any queued fault and encode the response
    fn finish(&mut self, mut response: JvsResponse) -> Option<Vec<u8>> {
        let fault = self.faults.pop_front();
        match fault {
            Some(BoardFault::Silence) => return None,
            Some(BoardFault::BadStatus) => response.status = ResponseStatus::ChecksumError,
            Some(BoardFault::BadReport) => {
                if let Some(report) = response.data.first_mut() {
                    *report = 0x02;
                }
            }
            Some(BoardFault::ShortPayload) => response.data.truncate(1),
            Some(BoardFault::BadChecksum) | None => {}
        }

        let packet = match response.to_packet() {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Virtual board cannot encode response: {}", e);
                return None;
            }
        };
        let mut bytes = packet.encode();
        if fault == Some(BoardFault::BadChecksum) {
            // Corrupt the checksum without colliding with SYNC or MARK
            if let Some(last) = bytes.last_mut() {
                *last = if *last == 0x01 { 0x02 } else { 0x01 };
            }
        }
        Some(bytes)
    }
}

#[cfg(test)]
mod tests {
    use cab_protocol::jvs::{parse_capabilities, parse_identity, JvsCodec};
    use cab_protocol::{FrameCodec, PlayerId};

    use super::*;

    fn respond(board: &mut VirtualIoBoard, dest: u8, command: JvsCommand) -> Option<JvsResponse> {
        let bytes = board.handle_packet(&command.to_packet(dest))?;
        let mut codec = JvsCodec::new();
        codec.push_bytes(&bytes);
        let packet = codec.next_frame()?.ok()?;
        assert!(packet.is_for_host());
        Some(JvsResponse::from_packet(&packet).unwrap())
    }

    #[test]
    fn test_silent_until_addressed() {
        let mut board = VirtualIoBoard::new(VirtualBoardConfig::default());
        assert!(respond(&mut board, 0x01, JvsCommand::RequestId).is_none());
        assert!(respond(&mut board, BROADCAST, JvsCommand::Reset).is_none());
        assert_eq!(board.resets(), 1);

        let ack = respond(&mut board, BROADCAST, JvsCommand::AssignAddress(1)).unwrap();
        assert_eq!(ack.section("assign").unwrap(), &[] as &[u8]);
        assert_eq!(board.address(), Some(1));

        let id = respond(&mut board, 0x01, JvsCommand::RequestId).unwrap();
        assert_eq!(
            parse_identity(id.section("id").unwrap()),
            board.config().identity
        );
        assert!(respond(&mut board, 0x02, JvsCommand::RequestId).is_none());
    }

    #[test]
    fn test_capabilities_and_inputs() {
        let mut board = VirtualIoBoard::new(VirtualBoardConfig::default());
        respond(&mut board, BROADCAST, JvsCommand::AssignAddress(1));

        let caps = respond(&mut board, 1, JvsCommand::Capabilities).unwrap();
        assert_eq!(
            parse_capabilities(caps.section("caps").unwrap()).unwrap(),
            board.config().capabilities()
        );

        board.set_button(Button::Select(PlayerId::One), true);
        let inputs = respond(
            &mut board,
            1,
            JvsCommand::ReadDigital {
                players: 2,
                bytes_per_player: 2,
            },
        )
        .unwrap();
        let data = inputs.section("read").unwrap();
        assert_eq!(data, &[0x80, 0x3F, 0xC0, 0x3F, 0xC0]);
    }

    #[test]
    fn test_injected_faults() {
        let mut board = VirtualIoBoard::new(VirtualBoardConfig::default());
        respond(&mut board, BROADCAST, JvsCommand::AssignAddress(1));

        board.inject_fault(BoardFault::BadStatus);
        let bad = respond(&mut board, 1, JvsCommand::RequestId).unwrap();
        assert_eq!(bad.status, ResponseStatus::ChecksumError);

        board.inject_fault(BoardFault::Silence);
        assert!(board
            .handle_packet(&JvsCommand::RequestId.to_packet(1))
            .is_none());

        board.inject_fault(BoardFault::BadChecksum);
        let bytes = board
            .handle_packet(&JvsCommand::RequestId.to_packet(1))
            .unwrap();
        let mut codec = JvsCodec::new();
        codec.push_bytes(&bytes);
        assert!(matches!(
            codec.next_frame(),
            Some(Err(ParseError::ChecksumMismatch { .. }))
        ));

        // Faults are one-shot
        assert!(respond(&mut board, 1, JvsCommand::RequestId).is_some());
    }

    #[test]
    fn test_unknown_command_status() {
        let mut board = VirtualIoBoard::new(VirtualBoardConfig::default());
        respond(&mut board, BROADCAST, JvsCommand::AssignAddress(1));
        let bytes = board
            .handle_packet(&JvsPacket::new(1, vec![0x70]).unwrap())
            .unwrap();
        let mut codec = JvsCodec::new();
        codec.push_bytes(&bytes);
        let packet = codec.next_frame().unwrap().unwrap();
        assert_eq!(
            JvsResponse::from_packet(&packet).unwrap().status,
            ResponseStatus::UnknownCommand
        );
    }
}
