//! Unified event stream for the bridge
//!
//! The touch bridge and the JVS session both report through a single
//! `BridgeEvent` channel. Observers (the binary's logger, the key-injection
//! sink, tests) only ever need to watch one receiver.

use cab_protocol::inputs::Button;
use cab_protocol::jvs::JvsDevice;
use cab_protocol::{ControlCommand, PlayerId};

/// Unified event enum for all bridge activity
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    // -------------------------------------------------------------------------
    // Touch bridge events
    // -------------------------------------------------------------------------
    /// The legacy panel was told to start streaming
    TouchStarted,

    /// The touch bridge stopped and halted the legacy panel
    TouchStopped,

    /// The game host started or halted a player's panel
    PlayerActiveChanged {
        /// Player whose endpoint sent the command
        player: PlayerId,
        /// New state
        active: bool,
    },

    /// A threshold query was answered on a player's endpoint
    ControlRelayed {
        /// Player whose endpoint sent the query
        player: PlayerId,
        /// The query
        command: ControlCommand,
    },

    /// The legacy panel sent a short reply frame
    LegacyReply {
        /// The parsed reply
        command: ControlCommand,
    },

    /// A player's modern endpoint stopped working
    EndpointClosed {
        /// Player whose endpoint closed
        player: PlayerId,
        /// What happened
        reason: String,
    },

    // -------------------------------------------------------------------------
    // JVS events
    // -------------------------------------------------------------------------
    /// The I/O board finished its handshake
    JvsDeviceReady {
        /// What the board reported about itself
        device: JvsDevice,
    },

    /// A button was pressed or released
    ButtonChanged {
        /// Which button
        button: Button,
        /// New state
        pressed: bool,
    },

    /// The JVS session stopped polling
    JvsStopped,

    // -------------------------------------------------------------------------
    // Errors
    // -------------------------------------------------------------------------
    /// A recoverable error occurred
    Error {
        /// Source of the error
        source: String,
        /// Error message
        message: String,
    },
}

impl BridgeEvent {
    /// Check if this event comes from the touch side
    pub fn is_touch(&self) -> bool {
        matches!(
            self,
            BridgeEvent::TouchStarted
                | BridgeEvent::TouchStopped
                | BridgeEvent::PlayerActiveChanged { .. }
                | BridgeEvent::ControlRelayed { .. }
                | BridgeEvent::LegacyReply { .. }
                | BridgeEvent::EndpointClosed { .. }
        )
    }

    /// Check if this event comes from the JVS side
    pub fn is_jvs(&self) -> bool {
        matches!(
            self,
            BridgeEvent::JvsDeviceReady { .. }
                | BridgeEvent::ButtonChanged { .. }
                | BridgeEvent::JvsStopped
        )
    }
}
