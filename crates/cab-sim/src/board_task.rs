//! Virtual I/O board actor task

use std::io;

use cab_protocol::inputs::Button;
use cab_protocol::jvs::JvsCodec;
use cab_protocol::FrameCodec;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::board::{BoardFault, VirtualIoBoard};

/// Commands that can be sent to a virtual board task
#[derive(Debug, Clone)]
pub enum VirtualBoardCommand {
    /// Press a button
    Press(Button),
    /// Release a button
    Release(Button),
    /// Misbehave on an upcoming response
    Fault(BoardFault),
    /// Stop the task
    Shutdown,
}

/// Run the virtual board task until the host hangs up or it is shut down
pub async fn run_virtual_board_task<S>(
    mut stream: S,
    mut board: VirtualIoBoard,
    mut cmd_rx: mpsc::Receiver<VirtualBoardCommand>,
) -> io::Result<VirtualIoBoard>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = JvsCodec::new();
    let mut buf = [0u8; 256];

    info!("Virtual I/O board started");

    loop {
        tokio::select! {
            // Button changes land before any request already in flight
            biased;

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualBoardCommand::Press(button)) => board.set_button(button, true),
                    Some(VirtualBoardCommand::Release(button)) => board.set_button(button, false),
                    Some(VirtualBoardCommand::Fault(fault)) => board.inject_fault(fault),
                    Some(VirtualBoardCommand::Shutdown) | None => break,
                }
            }

            result = stream.read(&mut buf) => {
                let n = match result {
                    Ok(0) => {
                        debug!("Virtual board stream closed");
                        break;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        warn!("Virtual board stream error: {}", e);
                        return Err(e);
                    }
                };

                codec.push_bytes(&buf[..n]);
                while let Some(frame) = codec.next_frame() {
                    let packet = match frame {
                        Ok(packet) => packet,
                        Err(e) => {
                            debug!("Virtual board dropped request: {}", e);
                            continue;
                        }
                    };
                    if let Some(reply) = board.handle_packet(&packet) {
                        stream.write_all(&reply).await?;
                        stream.flush().await?;
                    }
                }
            }
        }
    }

    info!("Virtual I/O board stopped");
    Ok(board)
}

#[cfg(test)]
mod tests {
    use cab_protocol::jvs::{JvsCommand, JvsResponse, BROADCAST};
    use cab_protocol::{EncodeFrame, PlayerId};

    use super::*;
    use crate::board::VirtualBoardConfig;

    async fn exchange<S>(
        host: &mut S,
        codec: &mut JvsCodec,
        command: JvsCommand,
        dest: u8,
    ) -> JvsResponse
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        host.write_all(&command.to_packet(dest).encode()).await.unwrap();
        let mut buf = [0u8; 256];
        loop {
            if let Some(frame) = codec.next_frame() {
                return JvsResponse::from_packet(&frame.unwrap()).unwrap();
            }
            let n = host.read(&mut buf).await.unwrap();
            assert!(n > 0, "board hung up");
            codec.push_bytes(&buf[..n]);
        }
    }

    #[tokio::test]
    async fn test_board_task_answers_polls() {
        let (mut host, board_side) = tokio::io::duplex(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let task = tokio::spawn(run_virtual_board_task(
            board_side,
            VirtualIoBoard::new(VirtualBoardConfig::default()),
            cmd_rx,
        ));

        let mut codec = JvsCodec::new();
        exchange(&mut host, &mut codec, JvsCommand::AssignAddress(1), BROADCAST).await;

        let ring = Button::Ring {
            player: PlayerId::Two,
            number: 8,
        };
        cmd_tx.send(VirtualBoardCommand::Press(ring)).await.unwrap();
        let read = JvsCommand::ReadDigital {
            players: 2,
            bytes_per_player: 2,
        };
        let response = exchange(&mut host, &mut codec, read, 1).await;
        assert_eq!(response.section("read").unwrap()[4], 0x80);

        cmd_tx.send(VirtualBoardCommand::Shutdown).await.unwrap();
        let board = task.await.unwrap().unwrap();
        assert_eq!(board.address(), Some(1));
        assert_eq!(board.requests(), 2);
    }
}
