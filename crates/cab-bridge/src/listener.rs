//! Modern endpoint listeners
//!
//! Each modern endpoint is split: the coordinator keeps the write half, and
//! a listener task owns the read half. The listener turns host control frames
//! into [`CoordinatorCommand`]s and reports when the endpoint goes away.

use std::io::ErrorKind;

use cab_protocol::modern::ModernCodec;
use cab_protocol::{FrameCodec, PlayerId};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::coordinator::CoordinatorCommand;

/// Read host control frames from one modern endpoint until it closes
///
/// Returns when the endpoint reaches EOF or fails, or when the coordinator's
/// queue is closed.
pub async fn run_endpoint_listener<R>(
    player: PlayerId,
    mut reader: R,
    cmd_tx: mpsc::Sender<CoordinatorCommand>,
) where
    R: AsyncRead + Unpin + Send,
{
    info!("{} endpoint listener started", player);

    let mut codec = ModernCodec::new();
    let mut buf = [0u8; 64];

    let reason = loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break "endpoint closed".to_string(),
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                continue
            }
            Err(e) => break format!("read error: {}", e),
        };

        debug!("{} host -> bridge {:02X?}", player, &buf[..n]);
        codec.push_bytes(&buf[..n]);

        while let Some((command, raw)) = codec.next_frame_with_bytes() {
            debug!("{} control {:?} from {:02X?}", player, command, raw);
            if cmd_tx
                .send(CoordinatorCommand::Control { player, command })
                .await
                .is_err()
            {
                debug!("{} listener stopping: coordinator gone", player);
                return;
            }
        }
    };

    info!("{} endpoint listener stopped: {}", player, reason);
    let _ = cmd_tx
        .send(CoordinatorCommand::EndpointClosed { player, reason })
        .await;
}

#[cfg(test)]
mod tests {
    use cab_protocol::ControlCommand;
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn test_listener_forwards_commands() {
        let (mut host, bridge_side) = tokio::io::duplex(64);
        let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_endpoint_listener(PlayerId::Two, bridge_side, cmd_tx));

        host.write_all(b"{HA").await.unwrap();
        host.write_all(b"LT}{LAr\x03}").await.unwrap();

        match cmd_rx.recv().await {
            Some(CoordinatorCommand::Control { player, command }) => {
                assert_eq!(player, PlayerId::Two);
                assert_eq!(command, ControlCommand::Halt);
            }
            other => panic!("unexpected {:?}", other),
        }
        match cmd_rx.recv().await {
            Some(CoordinatorCommand::Control { command, .. }) => {
                assert!(matches!(command, ControlCommand::RatioQuery { value: 3, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }

        drop(host);
        match cmd_rx.recv().await {
            Some(CoordinatorCommand::EndpointClosed { player, .. }) => {
                assert_eq!(player, PlayerId::Two)
            }
            other => panic!("unexpected {:?}", other),
        }
        task.await.unwrap();
    }
}
