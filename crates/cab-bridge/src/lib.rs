//! Cabinet Bridge Engine
//!
//! This crate runs the two independent halves of the cabinet bridge:
//!
//! - **Touch bridge**: reads the legacy touch panel, translates each sensor
//!   frame into two modern sensor frames and writes them to the game host's
//!   per-player endpoints, while answering the host's control commands.
//! - **JVS session**: initialises the I/O board and polls its switches,
//!   turning switch bytes into button press/release events.
//!
//! # Actor Architecture
//!
//! The touch bridge is an actor ([`TouchCoordinator`]) that owns the legacy
//! transport, the write halves of both modern endpoints and all per-player
//! state. One listener task per modern endpoint owns its read half and posts
//! [`CoordinatorCommand`]s into the coordinator's queue.
//!
//! The JVS session ([`JvsSession`]) is a separate task with its own transport
//! and its own `Result`, so a fault on one side never stops the other.
//!
//! Both report through a single [`BridgeEvent`] channel.
//!
//! # Example
//!
//! ```rust,no_run
//! use cab_bridge::{spawn_touch_bridge, BridgeEvent, TouchConfig};
//! use tokio::sync::mpsc;
//!
//! # async fn example() {
//! let (event_tx, mut event_rx) = mpsc::channel::<BridgeEvent>(256);
//! let (_panel, legacy) = tokio::io::duplex(1024);
//! let (_host1, p1) = tokio::io::duplex(1024);
//! let (_host2, p2) = tokio::io::duplex(1024);
//!
//! let (handle, task) = spawn_touch_bridge(legacy, [p1, p2], TouchConfig::default(), event_tx);
//! // ... later
//! handle.shutdown().await.ok();
//! let _ = task.await;
//! # }
//! ```

pub mod coordinator;
pub mod error;
pub mod events;
pub mod input;
pub mod jvs_session;
pub mod listener;
pub mod serial;
pub mod state;

pub use coordinator::{spawn_touch_bridge, CoordinatorCommand, TouchBridgeHandle, TouchCoordinator};
pub use error::BridgeError;
pub use events::BridgeEvent;
pub use input::{ButtonSink, InputTracker};
pub use jvs_session::{JvsSession, PollStats};
pub use listener::run_endpoint_listener;
pub use state::{BridgeState, JvsConfig, PlayerTouchState, TouchConfig};
