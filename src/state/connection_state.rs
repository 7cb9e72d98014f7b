//! ConnectionState - Device Connection State Machine
//!
//! A thin projection of what the bridge reports plus channel liveness. The
//! machine never retries and never infers a state from data arrival; each
//! input returns the effects the session must carry out.

use serde::{Deserialize, Serialize};

/// Device link status as reported by the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Why the machine ended up disconnected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The bridge channel itself dropped
    ChannelLost,
    /// The bridge reported the device link closed
    DeviceDisconnected,
    /// The user asked to disconnect
    UserRequested,
}

/// Side effects requested by a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// The device link came up; show success and switch to the monitor view
    Connected,
    /// The device link went down for the given reason
    Disconnected(DisconnectCause),
    /// Connect was forwarded; tell the user we are working on it
    Connecting,
}

/// Connection state machine for the device link
#[derive(Debug, Clone, Default)]
pub struct ConnectionMachine {
    status: ConnectionStatus,
    channel_open: bool,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.status == ConnectionStatus::Connecting
    }

    /// Whether the bridge channel is currently open
    pub fn channel_open(&self) -> bool {
        self.channel_open
    }

    /// A connect command was forwarded to the channel.
    ///
    /// Not guarded: a connect while already connecting or connected moves the
    /// machine back to `Connecting` and the bridge decides what happens.
    pub fn connect_forwarded(&mut self) -> Vec<Effect> {
        if self.status != ConnectionStatus::Disconnected {
            tracing::debug!("connect issued while {}", self.status);
        }
        self.status = ConnectionStatus::Connecting;
        vec![Effect::Connecting]
    }

    /// The user asked to disconnect the device
    pub fn disconnect_requested(&mut self) -> Vec<Effect> {
        self.enter_disconnected(DisconnectCause::UserRequested)
    }

    /// The bridge channel opened
    pub fn channel_opened(&mut self) -> Vec<Effect> {
        self.channel_open = true;
        Vec::new()
    }

    /// The bridge channel dropped
    pub fn channel_closed(&mut self) -> Vec<Effect> {
        self.channel_open = false;
        self.enter_disconnected(DisconnectCause::ChannelLost)
    }

    /// The bridge reported a device link status
    pub fn status_reported(&mut self, status: ConnectionStatus) -> Vec<Effect> {
        match status {
            ConnectionStatus::Connected => {
                self.status = ConnectionStatus::Connected;
                vec![Effect::Connected]
            }
            ConnectionStatus::Disconnected => {
                self.enter_disconnected(DisconnectCause::DeviceDisconnected)
            }
            ConnectionStatus::Connecting => {
                self.status = ConnectionStatus::Connecting;
                Vec::new()
            }
        }
    }

    fn enter_disconnected(&mut self, cause: DisconnectCause) -> Vec<Effect> {
        self.status = ConnectionStatus::Disconnected;
        vec![Effect::Disconnected(cause)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_tracks_last_report() {
        let reports = [
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connected,
        ];
        let mut machine = ConnectionMachine::new();
        for status in reports {
            machine.status_reported(status);
            assert_eq!(machine.status(), status);
        }
    }

    #[test]
    fn test_connected_only_on_explicit_status() {
        let mut machine = ConnectionMachine::new();
        assert_eq!(machine.connect_forwarded(), vec![Effect::Connecting]);
        machine.channel_opened();
        assert!(machine.is_connecting());

        assert_eq!(
            machine.status_reported(ConnectionStatus::Connected),
            vec![Effect::Connected]
        );
        assert!(machine.is_connected());
    }

    #[test]
    fn test_disconnect_causes() {
        let mut machine = ConnectionMachine::new();
        machine.status_reported(ConnectionStatus::Connected);
        assert_eq!(
            machine.channel_closed(),
            vec![Effect::Disconnected(DisconnectCause::ChannelLost)]
        );
        assert!(!machine.channel_open());

        machine.status_reported(ConnectionStatus::Connected);
        assert_eq!(
            machine.status_reported(ConnectionStatus::Disconnected),
            vec![Effect::Disconnected(DisconnectCause::DeviceDisconnected)]
        );

        machine.status_reported(ConnectionStatus::Connecting);
        assert_eq!(
            machine.disconnect_requested(),
            vec![Effect::Disconnected(DisconnectCause::UserRequested)]
        );
        assert_eq!(machine.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_wire_labels() {
        let status: ConnectionStatus = serde_json::from_str("\"connecting\"").expect("parse");
        assert_eq!(status, ConnectionStatus::Connecting);
        assert!(serde_json::from_str::<ConnectionStatus>("\"online\"").is_err());
    }
}
