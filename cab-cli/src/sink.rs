//! Key reporting sink
//!
//! Stands in for an OS key-injection backend: every button edge is reported
//! as a key down/up on the configured key name.

use std::collections::BTreeMap;

use cab_bridge::ButtonSink;
use cab_protocol::inputs::Button;
use tracing::info;

/// Logs button edges as key events
#[derive(Debug, Default)]
pub struct KeyLogSink {
    keys: BTreeMap<Button, String>,
    events: u64,
}

impl KeyLogSink {
    pub fn new(keys: BTreeMap<Button, String>) -> Self {
        Self { keys, events: 0 }
    }

    /// Key name for a button, falling back to the button's own name
    pub fn key_for(&self, button: Button) -> String {
        self.keys
            .get(&button)
            .cloned()
            .unwrap_or_else(|| button.key_name())
    }

    /// Number of edges reported so far
    pub fn events(&self) -> u64 {
        self.events
    }
}

impl ButtonSink for KeyLogSink {
    fn button_changed(&mut self, button: Button, pressed: bool) {
        self.events += 1;
        let key = self.key_for(button);
        if pressed {
            info!("key down {} ({})", key, button);
        } else {
            info!("key up {} ({})", key, button);
        }
    }
}

#[cfg(test)]
mod tests {
    use cab_protocol::PlayerId;

    use super::*;

    #[test]
    fn test_key_lookup() {
        let ring = Button::Ring {
            player: PlayerId::One,
            number: 4,
        };
        let mut keys = BTreeMap::new();
        keys.insert(ring, "C".to_string());
        let mut sink = KeyLogSink::new(keys);

        assert_eq!(sink.key_for(ring), "C");
        assert_eq!(sink.key_for(Button::Select(PlayerId::Two)), "p2_select");

        sink.button_changed(ring, true);
        sink.button_changed(ring, false);
        assert_eq!(sink.events(), 2);
    }
}
