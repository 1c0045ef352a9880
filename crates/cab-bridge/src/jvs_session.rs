//! JVS I/O board session
//!
//! A session owns one JVS transport. It walks the board through the fixed
//! handshake (reset, address assignment, identification, capabilities) and
//! then polls the digital inputs at a fixed interval, feeding each frame to
//! an [`InputTracker`] so that only button edges leave the session.
//!
//! Faults during the handshake end the session. While polling, a bad or
//! missing response only costs that poll; transport faults still end the
//! session.

use std::io::ErrorKind;

use cab_protocol::inputs::{DigitalInputFrame, FINALE_LAYOUT};
use cab_protocol::jvs::{
    parse_capabilities, parse_identity, JvsCodec, JvsCommand, JvsDevice, JvsPacket,
    JvsResponse, Version, BROADCAST,
};
use cab_protocol::{EncodeFrame, FrameCodec};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::events::BridgeEvent;
use crate::input::{ButtonSink, InputTracker};
use crate::state::JvsConfig;

/// Endpoint name used in errors
const JVS_ENDPOINT: &str = "JVS";

/// Counters reported when a session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    /// Input polls attempted
    pub polls: u64,
    /// Polls that failed without ending the session
    pub faults: u64,
}

/// A JVS session over any async byte stream
pub struct JvsSession<T> {
    io: T,
    config: JvsConfig,
    codec: JvsCodec,
    tracker: InputTracker,
    sink: Option<Box<dyn ButtonSink>>,
    event_tx: mpsc::Sender<BridgeEvent>,
    stats: PollStats,
}

impl<T> JvsSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a session using the Finale switch layout
    pub fn new(io: T, config: JvsConfig, event_tx: mpsc::Sender<BridgeEvent>) -> Self {
        Self {
            io,
            config,
            codec: JvsCodec::new(),
            tracker: InputTracker::new(FINALE_LAYOUT.to_vec()),
            sink: None,
            event_tx,
            stats: PollStats::default(),
        }
    }

    /// Also deliver button edges to a sink
    pub fn with_sink(mut self, sink: Box<dyn ButtonSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run the handshake and poll until shutdown
    ///
    /// Shutdown is honoured between and during exchanges.
    pub async fn run(
        mut self,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) -> Result<PollStats, BridgeError> {
        info!("JVS session starting");

        let device = tokio::select! {
            _ = &mut shutdown_rx => {
                info!("JVS session cancelled during handshake");
                return Ok(self.stats);
            }
            result = self.handshake() => result?,
        };
        let _ = self
            .event_tx
            .send(BridgeEvent::JvsDeviceReady { device })
            .await;

        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let result = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => break Ok(()),

                result = Self::poll_cycle(&mut self, &mut ticker) => {
                    if let Err(e) = result {
                        break Err(e);
                    }
                }
            }
        };

        info!(
            "JVS session stopped after {} polls ({} faults)",
            self.stats.polls, self.stats.faults
        );
        let _ = self.event_tx.send(BridgeEvent::JvsStopped).await;
        result.map(|()| self.stats)
    }

    /// Bring the board up and read its identification
    pub async fn handshake(&mut self) -> Result<JvsDevice, BridgeError> {
        if !self.config.address_is_valid() {
            return Err(BridgeError::Handshake {
                step: "assign address",
                source: Box::new(BridgeError::Protocol(
                    cab_protocol::ParseError::InvalidFrame(format!(
                        "address 0x{:02X} is reserved",
                        self.config.address
                    )),
                )),
            });
        }

        let reset = JvsCommand::Reset.to_packet(BROADCAST);
        for _ in 0..2 {
            self.send(&reset).await.map_err(step("reset"))?;
        }
        debug!("JVS reset sent, settling for {:?}", self.config.reset_delay());
        tokio::time::sleep(self.config.reset_delay()).await;
        self.codec.clear();

        let address = self.config.address;
        let assign = JvsCommand::AssignAddress(address);
        self.request(BROADCAST, assign)
            .await
            .and_then(|r| r.section(assign.name()).map_err(BridgeError::from).map(|_| ()))
            .map_err(step("assign address"))?;
        info!("JVS board assigned address 0x{:02X}", address);

        let identity = self
            .query(address, JvsCommand::RequestId)
            .await
            .map(|data| parse_identity(&data))
            .map_err(step("request id"))?;

        let command_version = self.version(address, JvsCommand::CommandVersion).await?;
        let jvs_version = self.version(address, JvsCommand::JvsVersion).await?;
        let comms_version = self.version(address, JvsCommand::CommsVersion).await?;

        let capabilities = self
            .query(address, JvsCommand::Capabilities)
            .await
            .and_then(|data| parse_capabilities(&data).map_err(BridgeError::from))
            .map_err(step("capabilities"))?;

        info!("JVS board: {}", identity);
        info!(
            "JVS versions: command {}, JVS {}, comms {}",
            command_version, jvs_version, comms_version
        );
        info!("JVS capabilities: {:?}", capabilities);

        let device = JvsDevice {
            address,
            identity,
            command_version,
            jvs_version,
            comms_version,
            capabilities,
        };

        if let Some((players, switches)) = device.switch_layout() {
            if players < self.config.players {
                warn!(
                    "JVS board reports {} players ({} switches), polling for {}",
                    players, switches, self.config.players
                );
            }
        }

        Ok(device)
    }

    /// Wait for the next tick and read inputs once
    ///
    /// Only transport faults are returned; everything else is counted.
    async fn poll_cycle(
        &mut self,
        ticker: &mut tokio::time::Interval,
    ) -> Result<(), BridgeError> {
        ticker.tick().await;
        self.stats.polls += 1;

        match self.poll_inputs().await {
            Ok(frame) => {
                for (button, pressed) in self.tracker.update(&frame) {
                    debug!("{} {}", button, if pressed { "pressed" } else { "released" });
                    if let Some(sink) = self.sink.as_mut() {
                        sink.button_changed(button, pressed);
                    }
                    let _ = self
                        .event_tx
                        .send(BridgeEvent::ButtonChanged { button, pressed })
                        .await;
                }
                Ok(())
            }
            Err(e) if e.is_transport() => Err(e),
            Err(e) => {
                self.stats.faults += 1;
                warn!("JVS poll failed: {}", e);
                Ok(())
            }
        }
    }

    /// Read the digital inputs once
    pub async fn poll_inputs(&mut self) -> Result<DigitalInputFrame, BridgeError> {
        let players = self.config.players;
        let bytes_per_player = self.config.bytes_per_player;
        let data = self
            .query(
                self.config.address,
                JvsCommand::ReadDigital {
                    players,
                    bytes_per_player,
                },
            )
            .await?;
        Ok(DigitalInputFrame::from_section(&data, players, bytes_per_player)?)
    }

    async fn version(
        &mut self,
        address: u8,
        command: JvsCommand,
    ) -> Result<Version, BridgeError> {
        let name = command.name();
        self.query(address, command)
            .await
            .and_then(|data| Version::parse(name, &data).map_err(BridgeError::from))
            .map_err(step(name))
    }

    /// One exchange, returning the checked section data for the command
    async fn query(&mut self, address: u8, command: JvsCommand) -> Result<Vec<u8>, BridgeError> {
        let response = self.request(address, command).await?;
        Ok(response.section(command.name())?.to_vec())
    }

    /// Send a command and wait for the response addressed to the host
    async fn request(
        &mut self,
        address: u8,
        command: JvsCommand,
    ) -> Result<JvsResponse, BridgeError> {
        self.send(&command.to_packet(address)).await?;

        let limit = self.config.response_timeout();
        let deadline = Instant::now() + limit;
        match tokio::time::timeout_at(deadline, self.receive()).await {
            Ok(packet) => Ok(JvsResponse::from_packet(&packet?)?),
            Err(_) => {
                // A late response must not be taken for the next one
                self.codec.clear();
                Err(BridgeError::Timeout {
                    endpoint: JVS_ENDPOINT.to_string(),
                    ms: limit.as_millis() as u64,
                })
            }
        }
    }

    async fn send(&mut self, packet: &JvsPacket) -> Result<(), BridgeError> {
        let bytes = packet.encode();
        debug!("host -> JVS {:02X?}", bytes);
        self.io
            .write_all(&bytes)
            .await
            .map_err(|e| BridgeError::transport(JVS_ENDPOINT, e))?;
        self.io
            .flush()
            .await
            .map_err(|e| BridgeError::transport(JVS_ENDPOINT, e))
    }

    /// Read until a packet for the host arrives
    async fn receive(&mut self) -> Result<JvsPacket, BridgeError> {
        let mut buf = [0u8; 256];
        loop {
            while let Some((frame, raw)) = self.codec.next_frame_with_bytes() {
                match frame {
                    Ok(packet) if packet.is_for_host() => {
                        debug!("JVS -> host {:02X?}", raw);
                        return Ok(packet);
                    }
                    Ok(packet) => {
                        debug!(
                            "Skipping JVS packet for 0x{:02X}",
                            packet.destination()
                        );
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let n = match self.io.read(&mut buf).await {
                Ok(0) => {
                    return Err(BridgeError::transport(
                        JVS_ENDPOINT,
                        std::io::Error::new(ErrorKind::UnexpectedEof, "JVS port closed"),
                    ))
                }
                Ok(n) => n,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue
                }
                Err(e) => return Err(BridgeError::transport(JVS_ENDPOINT, e)),
            };
            self.codec.push_bytes(&buf[..n]);
        }
    }
}

/// Wrap an error as a failure of a named handshake step
fn step(name: &'static str) -> impl Fn(BridgeError) -> BridgeError {
    move |e| BridgeError::Handshake {
        step: name,
        source: Box::new(e),
    }
}
