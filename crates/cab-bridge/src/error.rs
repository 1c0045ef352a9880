//! Error types for the bridge engine

use std::io;

use cab_protocol::ParseError;
use thiserror::Error;

/// Errors that can end a touch bridge or JVS session
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Read, write or EOF on a byte transport
    #[error("{endpoint} transport error: {source}")]
    Transport {
        /// Which endpoint failed
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// Serial port could not be opened
    #[error("cannot open serial port {port}: {source}")]
    Serial {
        /// Port name
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    /// A handshake step failed
    #[error("JVS handshake failed at {step}: {source}")]
    Handshake {
        /// Name of the failed step
        step: &'static str,
        #[source]
        source: Box<BridgeError>,
    },

    /// No response within the allowed time
    #[error("{endpoint} did not respond within {ms}ms")]
    Timeout {
        /// Which endpoint timed out
        endpoint: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Malformed or rejected protocol data
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The peer task or channel went away
    #[error("channel closed")]
    ChannelClosed,
}

impl BridgeError {
    /// Build a transport error for an endpoint
    pub fn transport(endpoint: impl Into<String>, source: io::Error) -> Self {
        BridgeError::Transport {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Whether the error came from the byte transport itself
    ///
    /// Transport faults end a session; everything else is scoped to one
    /// exchange.
    pub fn is_transport(&self) -> bool {
        match self {
            BridgeError::Transport { .. } | BridgeError::Serial { .. } => true,
            BridgeError::Handshake { source, .. } => source.is_transport(),
            _ => false,
        }
    }
}
