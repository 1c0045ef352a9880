//! Cabinet Bridge
//!
//! Runs the legacy touch panel bridge and the JVS input session for a
//! converted cabinet. Ports and tuning come from a JSON settings file; any
//! port can be overridden on the command line. `--simulate` replaces all
//! hardware with the simulators for a dry run.

mod config;
mod sink;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use cab_bridge::serial::open_port;
use cab_bridge::{
    spawn_touch_bridge, BridgeError, BridgeEvent, JvsSession, PollStats, TouchBridgeHandle,
};
use cab_protocol::inputs::Button;
use cab_protocol::modern::{ModernSensorFrame, SENSOR_FRAME_LEN};
use cab_protocol::PlayerId;
use cab_sim::{
    run_virtual_board_task, run_virtual_panel_task, VirtualBoardCommand, VirtualBoardConfig,
    VirtualIoBoard, VirtualLegacyPanel, VirtualPanelCommand, FRAME_INTERVAL,
};
use clap::Parser;
use tokio::io::{AsyncReadExt, DuplexStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Settings;
use crate::sink::KeyLogSink;

#[derive(Parser, Debug)]
#[command(name = "cabinet-bridge")]
#[command(version)]
#[command(about = "Bridge a legacy touch panel and JVS I/O board to a modern game host")]
struct Cli {
    /// Settings file
    #[arg(long, env = "CABINET_BRIDGE_CONFIG", default_value = "cabinet-bridge.json")]
    config: PathBuf,

    /// Write the default settings to the settings file and exit
    #[arg(long)]
    write_default_config: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Log level (overrides the settings file; RUST_LOG overrides both)
    #[arg(long)]
    log_level: Option<String>,

    /// Run against the simulated panel and I/O board instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Legacy touch panel port
    #[arg(long)]
    legacy_port: Option<String>,

    /// Game host's player 1 touch port
    #[arg(long)]
    p1_port: Option<String>,

    /// Game host's player 2 touch port
    #[arg(long)]
    p2_port: Option<String>,

    /// JVS I/O board port
    #[arg(long)]
    jvs_port: Option<String>,

    /// Do not run the touch bridge
    #[arg(long)]
    disable_touch: bool,

    /// Do not run the JVS session
    #[arg(long)]
    disable_jvs: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the settings file
    fn apply(&self, settings: &mut Settings) {
        if let Some(level) = &self.log_level {
            settings.log_level = level.clone();
        }
        let ports = &mut settings.ports;
        for (flag, port) in [
            (&self.legacy_port, &mut ports.legacy),
            (&self.p1_port, &mut ports.player1),
            (&self.p2_port, &mut ports.player2),
            (&self.jvs_port, &mut ports.jvs),
        ] {
            if let Some(name) = flag {
                *port = name.clone();
            }
        }
        settings.disable_touch |= self.disable_touch;
        settings.disable_jvs |= self.disable_jvs;
    }
}

type TouchTask = JoinHandle<Result<(), BridgeError>>;
type JvsTask = JoinHandle<Result<PollStats, BridgeError>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.write_default_config {
        Settings::default().save(&cli.config)?;
        println!("Wrote default settings to {}", cli.config.display());
        return Ok(());
    }

    let loaded = Settings::load(&cli.config)?;
    let from_file = loaded.is_some();
    let mut settings = loaded.unwrap_or_default();
    cli.apply(&mut settings);
    init_logging(&settings.log_level);
    if from_file {
        info!("Loaded settings from {}", cli.config.display());
    } else {
        info!("No config at {}, using defaults", cli.config.display());
    }

    if cli.list_ports {
        return list_ports();
    }

    info!("Starting cabinet bridge");
    if settings.disable_touch && settings.disable_jvs {
        warn!("Touch and JVS are both disabled, nothing to do");
        return Ok(());
    }

    let keys = settings.key_map()?;
    let (event_tx, event_rx) = mpsc::channel::<BridgeEvent>(256);
    let logger = tokio::spawn(log_events(event_rx));
    let mut simulators = Vec::new();

    let mut touch: Option<(TouchBridgeHandle, TouchTask)> = None;
    if !settings.disable_touch {
        let spawned = if cli.simulate {
            let (legacy, hosts, tasks) = start_panel_simulation();
            simulators.extend(tasks);
            spawn_touch_bridge(legacy, hosts, settings.touch.clone(), event_tx.clone())
        } else {
            let ports = &settings.ports;
            let legacy = open_port(&ports.legacy, ports.legacy_baud)
                .context("opening legacy touch panel")?;
            let p1 = open_port(&ports.player1, ports.modern_baud)
                .context("opening player 1 touch port")?;
            let p2 = open_port(&ports.player2, ports.modern_baud)
                .context("opening player 2 touch port")?;
            spawn_touch_bridge(legacy, [p1, p2], settings.touch.clone(), event_tx.clone())
        };
        touch = Some(spawned);
    }

    let mut jvs: Option<(oneshot::Sender<()>, JvsTask)> = None;
    if !settings.disable_jvs {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let sink = Box::new(KeyLogSink::new(keys));
        let task = if cli.simulate {
            let (io, tasks) = start_board_simulation();
            simulators.extend(tasks);
            let session =
                JvsSession::new(io, settings.jvs.clone(), event_tx.clone()).with_sink(sink);
            tokio::spawn(session.run(shutdown_rx))
        } else {
            let io = open_port(&settings.ports.jvs, settings.ports.jvs_baud)
                .context("opening JVS port")?;
            let session =
                JvsSession::new(io, settings.jvs.clone(), event_tx.clone()).with_sink(sink);
            tokio::spawn(session.run(shutdown_rx))
        };
        jvs = Some((shutdown_tx, task));
    }
    drop(event_tx);

    let failed = supervise(touch, jvs).await;

    for task in simulators {
        task.abort();
    }
    let _ = logger.await;

    if failed {
        anyhow::bail!("bridge stopped on error");
    }
    info!("Cabinet bridge stopped");
    Ok(())
}

fn init_logging(level: &str) {
    let default = format!(
        "cabinet_bridge={level},cab_protocol={level},cab_bridge={level},cab_sim={level}"
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn list_ports() -> Result<()> {
    let ports = serialport::available_ports().context("enumerating serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => println!(
                "{}  USB {:04x}:{:04x} {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}

/// Wait for ctrl-c or for both sessions to end, returning whether either failed
async fn supervise(
    mut touch: Option<(TouchBridgeHandle, TouchTask)>,
    mut jvs: Option<(oneshot::Sender<()>, JvsTask)>,
) -> bool {
    let mut failed = false;

    while touch.is_some() || jvs.is_some() {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Cannot listen for ctrl-c: {}", e);
                }
                info!("Shutting down");
                if let Some((handle, task)) = touch.take() {
                    if handle.shutdown().await.is_err() {
                        debug!("Touch bridge already stopped");
                    }
                    failed |= report_touch(task.await);
                }
                if let Some((shutdown_tx, task)) = jvs.take() {
                    let _ = shutdown_tx.send(());
                    failed |= report_jvs(task.await);
                }
            }

            result = async {
                match touch.as_mut() {
                    Some((_, task)) => task.await,
                    None => std::future::pending().await,
                }
            }, if touch.is_some() => {
                touch = None;
                failed |= report_touch(result);
            }

            result = async {
                match jvs.as_mut() {
                    Some((_, task)) => task.await,
                    None => std::future::pending().await,
                }
            }, if jvs.is_some() => {
                jvs = None;
                failed |= report_jvs(result);
            }
        }
    }

    failed
}

fn report_touch(result: Result<Result<(), BridgeError>, tokio::task::JoinError>) -> bool {
    match result {
        Ok(Ok(())) => {
            info!("Touch bridge finished");
            false
        }
        Ok(Err(e)) => {
            error!("Touch bridge failed: {}", e);
            true
        }
        Err(e) => {
            error!("Touch bridge task panicked: {}", e);
            true
        }
    }
}

fn report_jvs(result: Result<Result<PollStats, BridgeError>, tokio::task::JoinError>) -> bool {
    match result {
        Ok(Ok(stats)) => {
            info!(
                "JVS session finished: {} polls, {} faults",
                stats.polls, stats.faults
            );
            false
        }
        Ok(Err(e)) => {
            error!("JVS session failed: {}", e);
            true
        }
        Err(e) => {
            error!("JVS session task panicked: {}", e);
            true
        }
    }
}

async fn log_events(mut event_rx: mpsc::Receiver<BridgeEvent>) {
    while let Some(event) = event_rx.recv().await {
        match event {
            BridgeEvent::JvsDeviceReady { device } => {
                info!("JVS board ready at 0x{:02X}: {}", device.address, device.identity);
            }
            BridgeEvent::PlayerActiveChanged { player, active } => {
                info!("{} host {} touch", player, if active { "started" } else { "halted" });
            }
            BridgeEvent::EndpointClosed { player, reason } => {
                warn!("{} endpoint closed: {}", player, reason);
            }
            BridgeEvent::Error { source, message } => {
                warn!("{}: {}", source, message);
            }
            other if other.is_touch() => debug!("touch: {:?}", other),
            other if other.is_jvs() => debug!("jvs: {:?}", other),
            other => debug!("{:?}", other),
        }
    }
}

// ----------------------------------------------------------------------------
// Simulation
// ----------------------------------------------------------------------------

/// Start a virtual legacy panel and the game host's side of both endpoints
fn start_panel_simulation() -> (DuplexStream, [DuplexStream; 2], Vec<JoinHandle<()>>) {
    let (panel_side, legacy) = tokio::io::duplex(4096);
    let (host1, p1) = tokio::io::duplex(4096);
    let (host2, p2) = tokio::io::duplex(4096);
    let (panel_tx, panel_rx) = mpsc::channel(16);
    let (streaming_tx, _) = watch::channel(false);

    let panel = tokio::spawn(async move {
        match run_virtual_panel_task(
            panel_side,
            VirtualLegacyPanel::new(),
            FRAME_INTERVAL,
            panel_rx,
            streaming_tx,
        )
        .await
        {
            Ok(panel) => debug!("Virtual panel saw {:?}", panel.commands_seen()),
            Err(e) => warn!("Virtual panel failed: {}", e),
        }
    });

    // Tap the centre sensor once a second
    let driver = tokio::spawn(async move {
        let mut touched = false;
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            touched = !touched;
            let groups = if touched { [0, 0, 0, 0x10] } else { [0; 4] };
            let cmd = VirtualPanelCommand::SetGroups {
                player: PlayerId::One,
                groups,
            };
            if panel_tx.send(cmd).await.is_err() {
                break;
            }
        }
    });

    let tasks = vec![
        panel,
        driver,
        tokio::spawn(simulated_host(PlayerId::One, host1)),
        tokio::spawn(simulated_host(PlayerId::Two, host2)),
    ];
    (legacy, [p1, p2], tasks)
}

/// Read a player's frames the way the game host would, logging touches
async fn simulated_host(player: PlayerId, mut stream: DuplexStream) {
    let mut buf = [0u8; SENSOR_FRAME_LEN];
    let mut last = ModernSensorFrame::new();
    while stream.read_exact(&mut buf).await.is_ok() {
        match ModernSensorFrame::from_bytes(&buf) {
            Ok(frame) if frame != last => {
                info!("{} host sees {:?}", player, frame.zones());
                last = frame;
            }
            Ok(_) => {}
            Err(e) => debug!("{} host got {:02X?}: {}", player, buf, e),
        }
    }
}

/// Start a virtual I/O board, returning the bridge's side of the bus
fn start_board_simulation() -> (DuplexStream, Vec<JoinHandle<()>>) {
    let (host, board_side) = tokio::io::duplex(4096);
    let (board_tx, board_rx) = mpsc::channel(16);

    let board = tokio::spawn(async move {
        let board = VirtualIoBoard::new(VirtualBoardConfig::default());
        if let Err(e) = run_virtual_board_task(board_side, board, board_rx).await {
            warn!("Virtual I/O board failed: {}", e);
        }
    });

    // Press and release player 1's first ring button every two seconds
    let driver = tokio::spawn(async move {
        let ring = Button::Ring {
            player: PlayerId::One,
            number: 1,
        };
        loop {
            tokio::time::sleep(Duration::from_secs(2)).await;
            if board_tx.send(VirtualBoardCommand::Press(ring)).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
            if board_tx.send(VirtualBoardCommand::Release(ring)).await.is_err() {
                break;
            }
        }
    });

    (host, vec![board, driver])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "cabinet-bridge",
            "--legacy-port",
            "/dev/ttyUSB0",
            "--disable-jvs",
            "--log-level",
            "debug",
        ]);
        let mut settings = Settings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.ports.legacy, "/dev/ttyUSB0");
        assert_eq!(settings.ports.player1, "COM6");
        assert!(settings.disable_jvs);
        assert!(!settings.disable_touch);
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["cabinet-bridge"]);
        assert_eq!(cli.config, PathBuf::from("cabinet-bridge.json"));
        assert!(!cli.simulate);
    }
}
