//! Bridge settings file
//!
//! Settings live in a JSON file next to the binary by default. Every field
//! has a default, so a missing file or a file written by an older version
//! still loads.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cab_bridge::serial::{JVS_BAUD, LEGACY_BAUD, MODERN_BAUD};
use cab_bridge::{JvsConfig, TouchConfig};
use cab_protocol::inputs::{Button, FINALE_LAYOUT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for settings file operations
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid settings JSON
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The settings could not be serialized
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A key mapping names a button the cabinet does not have
    #[error("unknown button {0:?} in key mapping")]
    UnknownButton(String),
}

/// Serial port names and speeds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortSettings {
    /// Legacy touch panel
    pub legacy: String,
    /// Baud rate of the legacy touch panel
    pub legacy_baud: u32,
    /// Game host's player 1 touch port
    pub player1: String,
    /// Game host's player 2 touch port
    pub player2: String,
    /// Baud rate of both host touch ports
    pub modern_baud: u32,
    /// JVS I/O board
    pub jvs: String,
    /// Baud rate of the JVS bus
    pub jvs_baud: u32,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            legacy: "COM9".to_string(),
            legacy_baud: LEGACY_BAUD,
            player1: "COM6".to_string(),
            player2: "COM7".to_string(),
            modern_baud: MODERN_BAUD,
            jvs: "COM24".to_string(),
            jvs_baud: JVS_BAUD,
        }
    }
}

/// Everything the binary reads from its settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    /// Skip the touch bridge entirely
    pub disable_touch: bool,
    /// Skip the JVS session entirely
    pub disable_jvs: bool,
    /// Serial ports
    pub ports: PortSettings,
    /// Touch bridge tuning
    pub touch: TouchConfig,
    /// JVS session tuning
    pub jvs: JvsConfig,
    /// Key name reported for each button (`p1_ring1` -> `W`)
    pub keys: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            disable_touch: false,
            disable_jvs: false,
            ports: PortSettings::default(),
            touch: TouchConfig::default(),
            jvs: JvsConfig::default(),
            keys: default_keys(),
        }
    }
}

/// Keys a stock keyboard-input setup expects
fn default_keys() -> BTreeMap<String, String> {
    #[rustfmt::skip]
    const KEYS: [(&str, &str); 18] = [
        ("p1_select", "1"), ("p2_select", "2"),
        ("p1_ring1", "W"), ("p1_ring2", "E"), ("p1_ring3", "D"), ("p1_ring4", "C"),
        ("p1_ring5", "X"), ("p1_ring6", "Z"), ("p1_ring7", "A"), ("p1_ring8", "Q"),
        ("p2_ring1", "Numpad8"), ("p2_ring2", "Numpad9"), ("p2_ring3", "Numpad6"),
        ("p2_ring4", "Numpad3"), ("p2_ring5", "Numpad2"), ("p2_ring6", "Numpad1"),
        ("p2_ring7", "Numpad4"), ("p2_ring8", "Numpad7"),
    ];
    KEYS.iter()
        .map(|(button, key)| (button.to_string(), key.to_string()))
        .collect()
}

impl Settings {
    /// Load settings from a file
    ///
    /// Returns `None` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write settings as pretty-printed JSON
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the key mapping into buttons
    ///
    /// Buttons without an entry are reported by name only.
    pub fn key_map(&self) -> Result<BTreeMap<Button, String>, ConfigError> {
        let mut map = BTreeMap::new();
        for (name, key) in &self.keys {
            let button: Button = name
                .parse()
                .map_err(|_| ConfigError::UnknownButton(name.clone()))?;
            map.insert(button, key.clone());
        }
        for binding in FINALE_LAYOUT.iter() {
            if !map.contains_key(&binding.button) {
                tracing::debug!("No key mapped for {}", binding.button);
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use cab_protocol::PlayerId;

    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "disable_jvs": true, "ports": { "legacy": "/dev/ttyUSB3" } }"#)
                .unwrap();
        assert!(settings.disable_jvs);
        assert_eq!(settings.ports.legacy, "/dev/ttyUSB3");
        assert_eq!(settings.ports.legacy_baud, LEGACY_BAUD);
        assert_eq!(settings.jvs, JvsConfig::default());
        assert_eq!(settings.keys.len(), 18);
    }

    #[test]
    fn test_default_keys_cover_layout() {
        let map = Settings::default().key_map().unwrap();
        for binding in FINALE_LAYOUT.iter() {
            assert!(map.contains_key(&binding.button), "{}", binding.button);
        }
        assert_eq!(
            map[&Button::Ring {
                player: PlayerId::Two,
                number: 1
            }],
            "Numpad8"
        );
    }

    #[test]
    fn test_unknown_button_rejected() {
        let mut settings = Settings::default();
        settings.keys.insert("p3_ring1".into(), "F".into());
        assert!(matches!(
            settings.key_map(),
            Err(ConfigError::UnknownButton(name)) if name == "p3_ring1"
        ));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!(
            "cabinet-bridge-test-{}.json",
            std::process::id()
        ));
        let mut settings = Settings::default();
        settings.touch.initial_active = false;
        settings.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, Some(settings));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let path = std::env::temp_dir().join("cabinet-bridge-does-not-exist.json");
        assert_eq!(Settings::load(&path).unwrap(), None);
    }

    #[test]
    fn test_bad_json_names_the_file() {
        let path = std::env::temp_dir().join(format!(
            "cabinet-bridge-bad-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "{ not json").unwrap();
        let result = Settings::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Parse { path: p, .. }) if p == path));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn port_name() -> impl Strategy<Value = String> {
            prop_oneof!["COM[0-9]{1,2}", "/dev/tty(USB|S|ACM)[0-9]"]
        }

        fn baud() -> impl Strategy<Value = u32> {
            prop_oneof![Just(9600u32), Just(38400), Just(115200)]
        }

        proptest! {
            #[test]
            fn settings_survive_json(
                legacy in port_name(),
                player1 in port_name(),
                player2 in port_name(),
                jvs in port_name(),
                legacy_baud in baud(),
                jvs_baud in baud(),
                disable_touch: bool,
                disable_jvs: bool,
                initial_active: bool,
                level in prop_oneof![Just("info"), Just("debug"), Just("cab_bridge=trace")],
                key in "[A-Z]|Numpad[0-9]",
            ) {
                let mut settings = Settings {
                    log_level: level.to_string(),
                    disable_touch,
                    disable_jvs,
                    ..Default::default()
                };
                settings.ports.legacy = legacy;
                settings.ports.player1 = player1;
                settings.ports.player2 = player2;
                settings.ports.jvs = jvs;
                settings.ports.legacy_baud = legacy_baud;
                settings.ports.jvs_baud = jvs_baud;
                settings.touch.initial_active = initial_active;
                settings.keys.insert("p1_select".into(), key.clone());

                let json = serde_json::to_string_pretty(&settings).unwrap();
                let parsed: Settings = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(&parsed, &settings);
                prop_assert_eq!(&parsed.key_map().unwrap()[&Button::Select(PlayerId::One)], &key);
            }
        }
    }
}
