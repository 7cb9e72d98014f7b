//! Bridge Wire Protocol
//!
//! The bridge speaks named events with at most one JSON argument. Over
//! Socket.IO the name and argument travel as the event packet; the line-JSON
//! link carries one object per line instead:
//!
//! ```text
//! {"event":"connect"}
//! {"event":"connect_plc","data":{"modbusType":"tcp",...}}
//! {"event":"disconnect_plc"}
//! {"event":"plc_connection_status","data":"connected"}
//! {"event":"plc_data","data":{"timestamp":"2024-05-01T10:00:00","value":true}}
//! {"event":"error","data":"Modbus read error"}
//! ```
//!
//! On the line-JSON link the bridge must open with the `connect` frame before
//! the channel counts as open; `disconnect` is the socket closing.

use crate::domain::profile::DeviceProfile;
use crate::domain::sample::Sample;
use crate::error::Result;
use crate::state::connection_state::ConnectionStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Client -> bridge commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    ConnectPlc(DeviceProfile),
    DisconnectPlc,
}

/// Bridge -> client events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    PlcConnectionStatus(ConnectionStatus),
    PlcData(Sample),
    Error(String),
}

/// What a link driver reports upward
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Opened,
    Closed,
    Message(ServerMessage),
}

/// Greeting a line-JSON bridge sends before anything else
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Handshake {
    Connect,
}

/// Whether `line` is the bridge's opening `connect` frame
pub fn is_handshake(line: &str) -> bool {
    serde_json::from_str::<Handshake>(line.trim()).is_ok()
}

/// Split a command into its event name and argument (`None` for no argument)
pub fn event_parts(message: &ClientMessage) -> Result<(&'static str, Option<Value>)> {
    Ok(match message {
        ClientMessage::ConnectPlc(profile) => ("connect_plc", Some(serde_json::to_value(profile)?)),
        ClientMessage::DisconnectPlc => ("disconnect_plc", None),
    })
}

/// Decode a named event and its arguments; only the first argument is used
pub fn decode_event(event: &str, args: Vec<Value>) -> Result<ServerMessage> {
    let data = args.into_iter().next().unwrap_or(Value::Null);
    Ok(serde_json::from_value(json!({ "event": event, "data": data }))?)
}

/// Encode a command as a newline-terminated frame
pub fn encode(message: &ClientMessage) -> Result<String> {
    let mut frame = serde_json::to_string(message)?;
    frame.push('\n');
    Ok(frame)
}

/// Decode one line received from the bridge
pub fn decode(line: &str) -> Result<ServerMessage> {
    Ok(serde_json::from_str(line.trim())?)
}
