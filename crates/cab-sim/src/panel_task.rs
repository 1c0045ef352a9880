//! Virtual legacy panel actor task
//!
//! Owns a [`VirtualLegacyPanel`] and talks to the bridge over an async
//! stream. While the panel is streaming, a sensor frame is written on every
//! tick of the frame timer, like the real panel's continuous output.

use std::io;
use std::time::Duration;

use cab_protocol::legacy::GROUPS_PER_PLAYER;
use cab_protocol::PlayerId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::panel::VirtualLegacyPanel;

/// Commands that can be sent to a virtual panel task
#[derive(Debug, Clone)]
pub enum VirtualPanelCommand {
    /// Replace one player's sensor groups
    SetGroups {
        player: PlayerId,
        groups: [u8; GROUPS_PER_PLAYER],
    },
    /// Write raw bytes to the bridge (for garbage and partial-frame tests)
    Inject(Vec<u8>),
    /// Stop the task
    Shutdown,
}

/// Default time between sensor frames
pub const FRAME_INTERVAL: Duration = Duration::from_millis(2);

/// Run the virtual panel task
///
/// The streaming flag is published on `streaming_tx` each time it changes.
pub async fn run_virtual_panel_task<S>(
    mut stream: S,
    mut panel: VirtualLegacyPanel,
    frame_interval: Duration,
    mut cmd_rx: mpsc::Receiver<VirtualPanelCommand>,
    streaming_tx: watch::Sender<bool>,
) -> io::Result<VirtualLegacyPanel>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 256];
    let mut ticker = interval(frame_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Virtual legacy panel started");

    loop {
        tokio::select! {
            // Bridge commands are applied before the next frame goes out
            biased;

            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual panel stream closed");
                        break;
                    }
                    Ok(n) => {
                        let reply = panel.process_bytes(&buf[..n]);
                        let _ = streaming_tx.send_if_modified(|s| {
                            let changed = *s != panel.is_streaming();
                            *s = panel.is_streaming();
                            changed
                        });
                        if !reply.is_empty() {
                            stream.write_all(&reply).await?;
                            stream.flush().await?;
                        }
                    }
                    Err(e) => {
                        warn!("Virtual panel stream error: {}", e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualPanelCommand::SetGroups { player, groups }) => {
                        panel.set_groups(player, groups);
                    }
                    Some(VirtualPanelCommand::Inject(bytes)) => {
                        stream.write_all(&bytes).await?;
                        stream.flush().await?;
                    }
                    Some(VirtualPanelCommand::Shutdown) | None => break,
                }
            }

            _ = ticker.tick(), if panel.is_streaming() => {
                if let Some(frame) = panel.poll_frame() {
                    stream.write_all(frame.as_bytes()).await?;
                }
            }
        }
    }

    info!("Virtual legacy panel stopped");
    Ok(panel)
}

#[cfg(test)]
mod tests {
    use cab_protocol::legacy::{LegacyCodec, LegacyFrame};
    use cab_protocol::FrameCodec;

    use super::*;

    #[tokio::test]
    async fn test_panel_streams_after_start() {
        let (mut bridge, panel_side) = tokio::io::duplex(4096);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (streaming_tx, mut streaming_rx) = watch::channel(false);

        let task = tokio::spawn(run_virtual_panel_task(
            panel_side,
            VirtualLegacyPanel::new(),
            FRAME_INTERVAL,
            cmd_rx,
            streaming_tx,
        ));

        cmd_tx
            .send(VirtualPanelCommand::SetGroups {
                player: PlayerId::One,
                groups: [0, 0, 4, 0],
            })
            .await
            .unwrap();
        bridge.write_all(b"{STAT}").await.unwrap();
        streaming_rx.changed().await.unwrap();
        assert!(*streaming_rx.borrow());

        let mut codec = LegacyCodec::new();
        let mut buf = [0u8; 64];
        let touched = async {
            loop {
                let n = bridge.read(&mut buf).await.unwrap();
                codec.push_bytes(&buf[..n]);
                while let Some(frame) = codec.next_frame() {
                    if let LegacyFrame::Sensor(sensor) = frame {
                        if sensor.player_groups(PlayerId::One) == [0, 0, 4, 0] {
                            return sensor;
                        }
                    }
                }
            }
        };
        let frame = tokio::time::timeout(Duration::from_secs(2), touched)
            .await
            .expect("no touched frame");
        assert_eq!(frame.player_groups(PlayerId::Two), [0; 4]);

        bridge.write_all(b"{HALT}").await.unwrap();
        streaming_rx.changed().await.unwrap();
        assert!(!*streaming_rx.borrow());

        cmd_tx.send(VirtualPanelCommand::Shutdown).await.unwrap();
        let panel = task.await.unwrap().unwrap();
        assert!(!panel.is_streaming());
    }
}
