//! Button edge detection
//!
//! The JVS session polls switch state hundreds of times a second. The
//! [`InputTracker`] remembers the last decoded state and reports only the
//! buttons that changed, which is what a key-injection backend needs.

use std::collections::BTreeMap;

use cab_protocol::inputs::{Button, DigitalInputFrame, SwitchBinding, FINALE_LAYOUT};

/// Receives button edges
///
/// This is the seam where an OS input backend plugs in.
pub trait ButtonSink: Send {
    /// Called once per press and once per release
    fn button_changed(&mut self, button: Button, pressed: bool);
}

impl<F> ButtonSink for F
where
    F: FnMut(Button, bool) + Send,
{
    fn button_changed(&mut self, button: Button, pressed: bool) {
        self(button, pressed)
    }
}

/// Tracks button state across polls
#[derive(Debug, Clone)]
pub struct InputTracker {
    layout: Vec<SwitchBinding>,
    state: BTreeMap<Button, bool>,
}

impl Default for InputTracker {
    fn default() -> Self {
        Self::new(FINALE_LAYOUT.to_vec())
    }
}

impl InputTracker {
    /// Create a tracker for a switch layout, with every button released
    pub fn new(layout: Vec<SwitchBinding>) -> Self {
        let state = layout.iter().map(|b| (b.button, false)).collect();
        Self { layout, state }
    }

    /// Apply a new frame, returning the buttons whose state changed
    pub fn update(&mut self, frame: &DigitalInputFrame) -> Vec<(Button, bool)> {
        let mut changes = Vec::new();
        for (button, pressed) in frame.decode(&self.layout) {
            let previous = self.state.insert(button, pressed);
            if previous != Some(pressed) {
                changes.push((button, pressed));
            }
        }
        changes
    }

    /// Current state of a button
    pub fn is_pressed(&self, button: Button) -> bool {
        self.state.get(&button).copied().unwrap_or(false)
    }

    /// Buttons currently held
    pub fn pressed(&self) -> Vec<Button> {
        self.state
            .iter()
            .filter(|(_, p)| **p)
            .map(|(b, _)| *b)
            .collect()
    }
}
