//! Cabinet hardware simulators
//!
//! Stand-ins for the legacy touch panel and the JVS I/O board, so the bridge
//! can be exercised end to end over in-memory streams or a virtual serial
//! pair.
//!
//! Each simulator comes in two layers: a synchronous model
//! ([`VirtualLegacyPanel`], [`VirtualIoBoard`]) that turns request bytes into
//! reply bytes, and an async task that drives the model over a stream and
//! takes commands from a channel.

pub mod board;
pub mod board_task;
pub mod panel;
pub mod panel_task;

pub use board::{BoardFault, VirtualBoardConfig, VirtualIoBoard};
pub use board_task::{run_virtual_board_task, VirtualBoardCommand};
pub use panel::VirtualLegacyPanel;
pub use panel_task::{run_virtual_panel_task, VirtualPanelCommand, FRAME_INTERVAL};
