//! Touch bridge coordinator
//!
//! The coordinator is an actor that owns the legacy panel transport, the
//! write halves of both modern endpoints and all per-player touch state.
//! Listener tasks post [`CoordinatorCommand`]s into its queue; nothing else
//! touches player state.
//!
//! Each loop iteration prefers a queued command. When the queue is empty the
//! legacy panel is read for at most `poll_timeout`, and every complete sensor
//! frame is translated and written to each player that wants frames. Because
//! partial reads are buffered in the [`LegacyCodec`], a read abandoned by the
//! timeout or by a queued command never loses bytes.

use std::io::ErrorKind;

use cab_protocol::area::translate_player;
use cab_protocol::legacy::{LegacyCodec, LegacyFrame, LegacySensorFrame, LEGACY_HALT, LEGACY_START};
use cab_protocol::{ControlCommand, FrameCodec, PlayerId};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::BridgeError;
use crate::events::BridgeEvent;
use crate::listener::run_endpoint_listener;
use crate::state::{BridgeState, PlayerTouchState, TouchConfig};

/// Endpoint name used in errors for the legacy panel
const LEGACY_ENDPOINT: &str = "legacy panel";

/// Commands accepted by the coordinator
#[derive(Debug)]
pub enum CoordinatorCommand {
    /// A control frame arrived on a player's modern endpoint
    Control {
        /// Player whose endpoint sent the frame
        player: PlayerId,
        /// The parsed command
        command: ControlCommand,
    },

    /// A player's modern endpoint can no longer be read
    EndpointClosed {
        /// Player whose endpoint closed
        player: PlayerId,
        /// What happened
        reason: String,
    },

    /// Halt the legacy panel and stop
    Shutdown,
}

/// The touch bridge actor
pub struct TouchCoordinator<L, W> {
    legacy: L,
    outputs: [Option<W>; 2],
    players: [PlayerTouchState; 2],
    codec: LegacyCodec,
    config: TouchConfig,
    event_tx: mpsc::Sender<BridgeEvent>,
    state: BridgeState,
    frames_in: u64,
}

impl<L, W> TouchCoordinator<L, W>
where
    L: AsyncRead + AsyncWrite + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Create a coordinator
    ///
    /// `outputs` are the write sides of the player 1 and player 2 endpoints.
    pub fn new(
        legacy: L,
        outputs: [W; 2],
        config: TouchConfig,
        event_tx: mpsc::Sender<BridgeEvent>,
    ) -> Self {
        let [p1, p2] = outputs;
        Self {
            legacy,
            outputs: [Some(p1), Some(p2)],
            players: PlayerId::ALL.map(|p| PlayerTouchState::new(p, config.initial_active)),
            codec: LegacyCodec::new(),
            config,
            event_tx,
            state: BridgeState::Idle,
            frames_in: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Touch state for one player
    pub fn player(&self, player: PlayerId) -> &PlayerTouchState {
        &self.players[player.index()]
    }

    /// Run until shutdown or a legacy transport fault
    ///
    /// The legacy panel is sent `{STAT}` on entry and `{HALT}` on exit, even
    /// when exiting because of an error.
    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<CoordinatorCommand>,
    ) -> Result<(), BridgeError> {
        if let Err(e) = self.write_legacy(&LEGACY_START).await {
            self.stop().await;
            return Err(e);
        }
        self.state = BridgeState::Running;
        info!("Touch bridge running");
        let _ = self.event_tx.send(BridgeEvent::TouchStarted).await;

        let poll_timeout = self.config.poll_timeout();
        let mut buf = vec![0u8; 256];

        let result = loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(CoordinatorCommand::Shutdown) => {
                            info!("Touch bridge shutdown requested");
                            break Ok(());
                        }
                        None => {
                            info!("Touch bridge command queue closed");
                            break Ok(());
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }

                result = timeout(poll_timeout, self.legacy.read(&mut buf)) => {
                    match result {
                        Ok(Ok(0)) => {
                            break Err(BridgeError::transport(
                                LEGACY_ENDPOINT,
                                std::io::Error::new(ErrorKind::UnexpectedEof, "legacy panel closed"),
                            ));
                        }
                        Ok(Ok(n)) => {
                            self.codec.push_bytes(&buf[..n]);
                            self.drain_frames().await;
                        }
                        Ok(Err(e)) => {
                            if e.kind() != ErrorKind::WouldBlock && e.kind() != ErrorKind::TimedOut {
                                break Err(BridgeError::transport(LEGACY_ENDPOINT, e));
                            }
                        }
                        Err(_) => {} // Timeout, recheck the queue
                    }
                }
            }
        };

        if let Err(e) = &result {
            warn!("Touch bridge stopping on error: {}", e);
            let _ = self
                .event_tx
                .send(BridgeEvent::Error {
                    source: LEGACY_ENDPOINT.to_string(),
                    message: e.to_string(),
                })
                .await;
        }

        self.stop().await;
        result
    }

    async fn stop(&mut self) {
        self.state = BridgeState::ShuttingDown;
        if let Err(e) = self.write_legacy(&LEGACY_HALT).await {
            warn!("Failed to halt legacy panel: {}", e);
        }
        info!(
            "Touch bridge stopped after {} legacy frames",
            self.frames_in
        );
        let _ = self.event_tx.send(BridgeEvent::TouchStopped).await;
    }

    async fn write_legacy(&mut self, data: &[u8]) -> Result<(), BridgeError> {
        debug!("bridge -> legacy {:02X?}", data);
        self.legacy
            .write_all(data)
            .await
            .map_err(|e| BridgeError::transport(LEGACY_ENDPOINT, e))?;
        self.legacy
            .flush()
            .await
            .map_err(|e| BridgeError::transport(LEGACY_ENDPOINT, e))
    }

    async fn handle_command(&mut self, cmd: CoordinatorCommand) {
        match cmd {
            CoordinatorCommand::Control { player, command } => {
                self.handle_control(player, command).await
            }
            CoordinatorCommand::EndpointClosed { player, reason } => {
                self.disconnect(player, reason).await
            }
            CoordinatorCommand::Shutdown => {}
        }
    }

    async fn handle_control(&mut self, player: PlayerId, command: ControlCommand) {
        match command {
            ControlCommand::Halt => self.set_active(player, false).await,
            ControlCommand::Start => self.set_active(player, true).await,
            ControlCommand::ResetThreshold => {
                info!("{} host requested threshold reset", player);
            }
            ControlCommand::RatioQuery { .. } | ControlCommand::SensitivityQuery { .. } => {
                let Some(echo) = command.acknowledgement() else {
                    return;
                };
                if self.write_player(player, &echo).await {
                    debug!("{} answered {} query", player, command.name());
                    let _ = self
                        .event_tx
                        .send(BridgeEvent::ControlRelayed { player, command })
                        .await;
                }
            }
        }
    }

    async fn set_active(&mut self, player: PlayerId, active: bool) {
        let state = &mut self.players[player.index()];
        if state.active == active {
            return;
        }
        state.active = active;
        info!(
            "{} touch {}",
            player,
            if active { "started" } else { "halted" }
        );
        let _ = self
            .event_tx
            .send(BridgeEvent::PlayerActiveChanged { player, active })
            .await;
    }

    async fn disconnect(&mut self, player: PlayerId, reason: String) {
        let state = &mut self.players[player.index()];
        if !state.connected {
            return;
        }
        state.connected = false;
        self.outputs[player.index()] = None;
        warn!("{} endpoint disconnected: {}", player, reason);
        let _ = self
            .event_tx
            .send(BridgeEvent::EndpointClosed { player, reason })
            .await;
    }

    /// Write to a player's endpoint, disconnecting it on failure
    async fn write_player(&mut self, player: PlayerId, data: &[u8]) -> bool {
        let Some(output) = self.outputs[player.index()].as_mut() else {
            return false;
        };

        let result = match output.write_all(data).await {
            Ok(()) => output.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                let message = format!("write error: {}", e);
                let _ = self
                    .event_tx
                    .send(BridgeEvent::Error {
                        source: player.to_string(),
                        message: message.clone(),
                    })
                    .await;
                self.disconnect(player, message).await;
                false
            }
        }
    }

    async fn drain_frames(&mut self) {
        while let Some((frame, raw)) = self.codec.next_frame_with_bytes() {
            match frame {
                LegacyFrame::Sensor(sensor) => {
                    self.frames_in += 1;
                    self.relay(&sensor).await;
                }
                LegacyFrame::Reply(command) => {
                    debug!("legacy reply {:02X?}", raw);
                    let _ = self
                        .event_tx
                        .send(BridgeEvent::LegacyReply { command })
                        .await;
                }
            }
        }
    }

    async fn relay(&mut self, sensor: &LegacySensorFrame) {
        for player in PlayerId::ALL {
            let state = &mut self.players[player.index()];
            if !state.wants_frames() {
                continue;
            }
            let modern = translate_player(sensor, player, &mut state.center_toggle);
            self.write_player(player, &modern.to_bytes()).await;
        }
    }
}

/// Handle for controlling a spawned touch bridge
#[derive(Debug, Clone)]
pub struct TouchBridgeHandle {
    cmd_tx: mpsc::Sender<CoordinatorCommand>,
}

impl TouchBridgeHandle {
    /// Ask the bridge to halt the legacy panel and stop
    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        self.cmd_tx
            .send(CoordinatorCommand::Shutdown)
            .await
            .map_err(|_| BridgeError::ChannelClosed)
    }
}

/// Split the modern endpoints, spawn their listeners and the coordinator
///
/// The returned task resolves when the coordinator stops; the listeners are
/// aborted at that point.
pub fn spawn_touch_bridge<L, M>(
    legacy: L,
    endpoints: [M; 2],
    config: TouchConfig,
    event_tx: mpsc::Sender<BridgeEvent>,
) -> (TouchBridgeHandle, JoinHandle<Result<(), BridgeError>>)
where
    L: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    M: AsyncRead + AsyncWrite + Send + 'static,
{
    let (cmd_tx, cmd_rx) = mpsc::channel(config.queue_capacity.max(1));

    let [p1, p2] = endpoints;
    let (p1_read, p1_write) = tokio::io::split(p1);
    let (p2_read, p2_write) = tokio::io::split(p2);

    let listeners = [
        tokio::spawn(run_endpoint_listener(PlayerId::One, p1_read, cmd_tx.clone())),
        tokio::spawn(run_endpoint_listener(PlayerId::Two, p2_read, cmd_tx.clone())),
    ];

    let coordinator = TouchCoordinator::new(legacy, [p1_write, p2_write], config, event_tx);
    let task = tokio::spawn(async move {
        let result = coordinator.run(cmd_rx).await;
        for listener in listeners {
            listener.abort();
        }
        result
    });

    (TouchBridgeHandle { cmd_tx }, task)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::DuplexStream;

    use super::*;

    struct Rig {
        panel: DuplexStream,
        hosts: [DuplexStream; 2],
        cmd_tx: mpsc::Sender<CoordinatorCommand>,
        event_rx: mpsc::Receiver<BridgeEvent>,
        task: JoinHandle<Result<(), BridgeError>>,
    }

    fn rig(config: TouchConfig) -> Rig {
        let (panel, legacy) = tokio::io::duplex(1024);
        let (host1, out1) = tokio::io::duplex(1024);
        let (host2, out2) = tokio::io::duplex(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(64);

        let coordinator = TouchCoordinator::new(legacy, [out1, out2], config, event_tx);
        assert_eq!(coordinator.state(), BridgeState::Idle);
        assert!(coordinator.player(PlayerId::One).active);
        let task = tokio::spawn(coordinator.run(cmd_rx));

        Rig {
            panel,
            hosts: [host1, host2],
            cmd_tx,
            event_rx,
            task,
        }
    }

    async fn read_exact<R: AsyncRead + Unpin>(r: &mut R, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        tokio::time::timeout(Duration::from_secs(2), r.read_exact(&mut buf))
            .await
            .expect("read timed out")
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_start_and_shutdown_commands() {
        let mut rig = rig(TouchConfig::default());
        assert_eq!(read_exact(&mut rig.panel, 6).await, b"{STAT}");
        assert!(matches!(
            rig.event_rx.recv().await,
            Some(BridgeEvent::TouchStarted)
        ));

        rig.cmd_tx.send(CoordinatorCommand::Shutdown).await.unwrap();
        assert_eq!(read_exact(&mut rig.panel, 6).await, b"{HALT}");
        rig.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_sensor_frame_relayed_to_both_players() {
        let mut rig = rig(TouchConfig::default());
        read_exact(&mut rig.panel, 6).await;

        let frame = LegacySensorFrame::from_groups([0x01, 0, 0, 0], [0, 0, 0, 0x10]);
        rig.panel.write_all(frame.as_bytes()).await.unwrap();

        let p1 = read_exact(&mut rig.hosts[0], 9).await;
        assert_eq!(p1, vec![b'(', 0x01, 0x00, 0x00, 0x18, 0x00, 0x00, 0x00, b')']);
        let p2 = read_exact(&mut rig.hosts[1], 9).await;
        assert_eq!(p2, vec![b'(', 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, b')']);

        rig.cmd_tx.send(CoordinatorCommand::Shutdown).await.unwrap();
        rig.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_halted_player_gets_no_frames() {
        let mut rig = rig(TouchConfig::default());
        read_exact(&mut rig.panel, 6).await;

        rig.cmd_tx
            .send(CoordinatorCommand::Control {
                player: PlayerId::One,
                command: ControlCommand::Halt,
            })
            .await
            .unwrap();

        let frame = LegacySensorFrame::from_groups([0x02, 0, 0, 0], [0x02, 0, 0, 0]);
        rig.panel.write_all(frame.as_bytes()).await.unwrap();
        read_exact(&mut rig.hosts[1], 9).await;

        let mut leftover = [0u8; 9];
        let nothing =
            tokio::time::timeout(Duration::from_millis(50), rig.hosts[0].read(&mut leftover)).await;
        assert!(nothing.is_err(), "halted player received data");

        rig.cmd_tx
            .send(CoordinatorCommand::Control {
                player: PlayerId::One,
                command: ControlCommand::Start,
            })
            .await
            .unwrap();
        rig.panel.write_all(frame.as_bytes()).await.unwrap();
        assert_eq!(read_exact(&mut rig.hosts[0], 9).await[1], 0x00);

        rig.cmd_tx.send(CoordinatorCommand::Shutdown).await.unwrap();
        rig.task.await.unwrap().unwrap();

        let mut changes = Vec::new();
        while let Ok(event) = rig.event_rx.try_recv() {
            if let BridgeEvent::PlayerActiveChanged { player, active } = event {
                changes.push((player, active));
            }
        }
        assert_eq!(
            changes,
            vec![(PlayerId::One, false), (PlayerId::One, true)]
        );
    }

    #[tokio::test]
    async fn test_query_echoed_to_requesting_player() {
        let mut rig = rig(TouchConfig {
            initial_active: false,
            ..Default::default()
        });
        read_exact(&mut rig.panel, 6).await;

        rig.cmd_tx
            .send(CoordinatorCommand::Control {
                player: PlayerId::Two,
                command: ControlCommand::parse(b"{RAk\x30}").unwrap(),
            })
            .await
            .unwrap();
        assert_eq!(read_exact(&mut rig.hosts[1], 6).await, b"(RAk\x30)");

        rig.cmd_tx.send(CoordinatorCommand::Shutdown).await.unwrap();
        rig.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_legacy_eof_is_fatal() {
        let rig = rig(TouchConfig::default());
        let Rig {
            mut panel, task, ..
        } = rig;
        read_exact(&mut panel, 6).await;
        drop(panel);

        let result = task.await.unwrap();
        assert!(matches!(result, Err(BridgeError::Transport { .. })));
    }
}
