//! Per-player touch state and engine configuration

use std::time::Duration;

use cab_protocol::jvs::BROADCAST;
use cab_protocol::PlayerId;
use serde::{Deserialize, Serialize};

/// Lifecycle of the touch bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Created, legacy panel not yet started
    Idle,
    /// Relaying sensor frames
    Running,
    /// Stopping; terminal
    ShuttingDown,
}

/// Touch state the bridge keeps for one player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerTouchState {
    /// Which player this is
    pub player: PlayerId,
    /// Whether the game host wants sensor frames (Start/Halt)
    pub active: bool,
    /// Which centre zone the next centre touch maps to (false = C1)
    pub center_toggle: bool,
    /// Whether the modern endpoint can still be written
    pub connected: bool,
}

impl PlayerTouchState {
    /// Create the state a player starts with
    pub fn new(player: PlayerId, active: bool) -> Self {
        Self {
            player,
            active,
            center_toggle: false,
            connected: true,
        }
    }

    /// Whether sensor frames should be relayed to this player
    pub fn wants_frames(&self) -> bool {
        self.active && self.connected
    }
}

/// Touch bridge settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchConfig {
    /// Whether players receive frames before the host sends `{STAT}`
    pub initial_active: bool,
    /// Upper bound on one legacy read before queued commands are rechecked
    pub poll_timeout_ms: u64,
    /// Capacity of the coordinator's command queue
    pub queue_capacity: usize,
}

impl Default for TouchConfig {
    fn default() -> Self {
        Self {
            initial_active: true,
            poll_timeout_ms: 1,
            queue_capacity: 64,
        }
    }
}

impl TouchConfig {
    /// Legacy read timeout
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }
}

/// JVS session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JvsConfig {
    /// Address assigned to the I/O board
    pub address: u8,
    /// Settle time after the bus reset
    pub reset_delay_ms: u64,
    /// How long to wait for each response
    pub response_timeout_ms: u64,
    /// Time between input polls
    pub poll_interval_ms: u64,
    /// Players requested in each input read
    pub players: u8,
    /// Switch bytes per player requested in each input read
    pub bytes_per_player: u8,
}

impl Default for JvsConfig {
    fn default() -> Self {
        Self {
            address: 0x01,
            reset_delay_ms: 1000,
            response_timeout_ms: 500,
            poll_interval_ms: 4,
            players: 2,
            bytes_per_player: 2,
        }
    }
}

impl JvsConfig {
    /// Settle time after the bus reset
    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    /// Per-exchange response timeout
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Input poll period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Check the address is usable for a device
    pub fn address_is_valid(&self) -> bool {
        self.address != 0x00 && self.address != BROADCAST
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_state_gating() {
        let mut state = PlayerTouchState::new(PlayerId::One, true);
        assert!(state.wants_frames());
        state.connected = false;
        assert!(!state.wants_frames());

        let state = PlayerTouchState::new(PlayerId::Two, false);
        assert!(!state.wants_frames());
        assert!(!state.center_toggle);
    }

    #[test]
    fn test_jvs_defaults() {
        let config = JvsConfig::default();
        assert_eq!(config.address, 0x01);
        assert_eq!(config.reset_delay(), Duration::from_secs(1));
        assert_eq!(config.response_timeout(), Duration::from_millis(500));
        assert_eq!(config.poll_interval(), Duration::from_millis(4));
        assert!(config.address_is_valid());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: JvsConfig = serde_json::from_str(r#"{"address": 2}"#).unwrap();
        assert_eq!(config.address, 2);
        assert_eq!(config.players, 2);
    }
}
