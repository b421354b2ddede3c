// indicator.rs — The physical thing we flash. The production indicator is a
// keyboard lock key (Caps Lock) toggled through enigo.

use enigo::{Direction, Enigo, Key, Keyboard};
use serde::{Deserialize, Serialize};

/// Error type for indicator toggles
#[derive(Debug, thiserror::Error)]
pub enum IndicatorError {
    #[error("Could not connect to the input backend: {0}")]
    Backend(String),
    #[error("Key press failed: {0}")]
    Input(String),
}

/// Something with an on/off state that can be flipped.
pub trait Indicator: Send + Sync {
    fn toggle(&self) -> Result<(), IndicatorError>;

    /// Indicator name for logging/display
    fn name(&self) -> &str;
}

/// Which lock key carries the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKey {
    #[default]
    CapsLock,
}

impl IndicatorKey {
    fn enigo_key(self) -> Key {
        match self {
            IndicatorKey::CapsLock => Key::CapsLock,
        }
    }
}

/// Flashes a lock-key LED by pressing and releasing the key.
///
/// A fresh `Enigo` connection is opened per toggle so the indicator stays
/// `Send + Sync` on every platform; toggles are rare enough for that to be
/// cheap.
pub struct KeyboardIndicator {
    key: IndicatorKey,
}

impl KeyboardIndicator {
    pub fn new(key: IndicatorKey) -> Self {
        Self { key }
    }
}

impl Indicator for KeyboardIndicator {
    fn toggle(&self) -> Result<(), IndicatorError> {
        let mut enigo = Enigo::new(&enigo::Settings::default())
            .map_err(|e| IndicatorError::Backend(e.to_string()))?;
        enigo
            .key(self.key.enigo_key(), Direction::Click)
            .map_err(|e| IndicatorError::Input(e.to_string()))
    }

    fn name(&self) -> &str {
        match self.key {
            IndicatorKey::CapsLock => "caps lock",
        }
    }
}
