//! Sample - One Timestamped Coil Reading

use serde::{Deserialize, Serialize};

/// A single reading of the monitored coil, as relayed by the bridge.
///
/// The timestamp is kept as the ISO-8601 string the bridge produced; it is
/// never reparsed or reordered on the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: String,
    pub value: bool,
}

impl Sample {
    pub fn new(timestamp: impl Into<String>, value: bool) -> Self {
        Self {
            timestamp: timestamp.into(),
            value,
        }
    }

    /// Chart-friendly value (1 for on, 0 for off)
    pub fn level(&self) -> u8 {
        u8::from(self.value)
    }
}

impl std::fmt::Display for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.value { "ON" } else { "OFF" };
        write!(f, "{} @ {}", state, self.timestamp)
    }
}
