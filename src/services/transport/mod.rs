//! Transport Channel
//!
//! One long-lived event channel to the bridge server. A `ChannelConnector`
//! owns the actual link (and its reconnect policy); the channel turns link
//! events into `ChannelHandler` callbacks and queues outbound commands.
//!
//! ```text
//! connect_to_plc ──► commands ──► link driver ──► bridge
//!                                     │
//! ChannelHandler ◄── dispatcher ◄── LinkEvent
//! ```

#[cfg(test)]
pub mod loopback;
mod socketio;
mod tcp_link;
pub mod wire;

pub use socketio::SocketIoConnector;
pub use tcp_link::TcpLinkConnector;
pub use wire::{ClientMessage, LinkEvent, ServerMessage};

use crate::domain::profile::DeviceProfile;
use crate::domain::sample::Sample;
use crate::error::{Error, Result};
use crate::eventing::{AppEvent, AppEventSender};
use crate::services::supervisor::RetryConfig;
use crate::state::connection_state::ConnectionStatus;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Callbacks fired by the channel, in the order the bridge emitted them
pub trait ChannelHandler: Send + Sync {
    /// The channel to the bridge opened
    fn on_connect(&self);
    /// The channel to the bridge dropped
    fn on_disconnect(&self);
    /// The bridge reported the device link status
    fn on_connection_status(&self, status: ConnectionStatus);
    /// The bridge relayed a coil sample
    fn on_plc_data(&self, sample: Sample);
    /// The bridge pushed an error
    fn on_error(&self, message: String);
}

/// Session wiring: every callback becomes an event on the session queue
impl ChannelHandler for AppEventSender {
    fn on_connect(&self) {
        let _ = self.send(AppEvent::ChannelOpened);
    }

    fn on_disconnect(&self) {
        let _ = self.send(AppEvent::ChannelClosed);
    }

    fn on_connection_status(&self, status: ConnectionStatus) {
        let _ = self.send(AppEvent::DeviceStatus(status));
    }

    fn on_plc_data(&self, sample: Sample) {
        let _ = self.send(AppEvent::Data(sample));
    }

    fn on_error(&self, message: String) {
        let _ = self.send(AppEvent::RemoteError(message));
    }
}

/// Something that can drive a link to a bridge endpoint.
///
/// The driver reads commands from `commands` and writes them to the bridge,
/// and reports link lifecycle and inbound frames on `events`. It stops when
/// either channel closes.
pub trait ChannelConnector: Send + Sync {
    fn spawn(
        &self,
        endpoint: &str,
        commands: mpsc::UnboundedReceiver<ClientMessage>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> JoinHandle<()>;
}

/// How one link session ended
pub(crate) enum LinkEnd {
    /// The client side went away; stop for good
    Shutdown,
    /// The link dropped; try again after backoff
    Dropped(String),
}

/// Wire flavour a bridge endpoint speaks, picked from its URL scheme
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkKind {
    /// Socket.IO over `http(s)://` or `ws(s)://`
    SocketIo,
    /// Line-delimited JSON over `tcp://`
    LineJson,
}

impl LinkKind {
    pub fn from_endpoint(endpoint: &str) -> Self {
        match endpoint.split_once("://") {
            Some((scheme, _)) if scheme.eq_ignore_ascii_case("tcp") => Self::LineJson,
            _ => Self::SocketIo,
        }
    }
}

/// Connector matching the endpoint's scheme
pub fn connector_for(endpoint: &str, retry: RetryConfig) -> Arc<dyn ChannelConnector> {
    match LinkKind::from_endpoint(endpoint) {
        LinkKind::SocketIo => Arc::new(SocketIoConnector::new(retry)),
        LinkKind::LineJson => Arc::new(TcpLinkConnector::new(retry)),
    }
}

type HandlerSlot = Arc<RwLock<Option<Arc<dyn ChannelHandler>>>>;

struct ActiveChannel {
    endpoint: String,
    commands: mpsc::UnboundedSender<ClientMessage>,
    handler: HandlerSlot,
    driver: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

/// The client's event channel to the bridge server
pub struct TransportChannel {
    connector: Arc<dyn ChannelConnector>,
    active: Mutex<Option<ActiveChannel>>,
}

impl TransportChannel {
    pub fn new(connector: Arc<dyn ChannelConnector>) -> Self {
        Self {
            connector,
            active: Mutex::new(None),
        }
    }

    /// Open the channel and register the callback set.
    ///
    /// Calling it again while initialized is a no-op. Must run inside a
    /// tokio runtime.
    pub fn initialize(&self, endpoint: &str, handler: Arc<dyn ChannelHandler>) {
        let mut active = self.active.lock();
        if let Some(existing) = active.as_ref() {
            tracing::warn!(
                "Channel already initialized for {}, ignoring initialize({})",
                existing.endpoint,
                endpoint
            );
            return;
        }

        tracing::info!("Opening bridge channel to {}", endpoint);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handler: HandlerSlot = Arc::new(RwLock::new(Some(handler)));

        let driver = self.connector.spawn(endpoint, command_rx, event_tx);
        let dispatcher = tokio::spawn(dispatch(event_rx, handler.clone()));

        *active = Some(ActiveChannel {
            endpoint: endpoint.to_string(),
            commands: command_tx,
            handler,
            driver,
            dispatcher,
        });
    }

    pub fn is_initialized(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Ask the bridge to open the device link described by `profile`.
    ///
    /// Fails fast when the channel was never initialized; otherwise the
    /// outcome arrives later through `on_connection_status`.
    pub fn connect_to_plc(&self, profile: &DeviceProfile) -> Result<()> {
        let active = self.active.lock();
        let Some(channel) = active.as_ref() else {
            return Err(Error::ChannelUnavailable {
                message: "Socket not initialized".to_string(),
            });
        };

        tracing::info!("Sending PLC connection request for {}", profile.address());
        channel
            .commands
            .send(ClientMessage::ConnectPlc(profile.clone()))
            .map_err(|e| Error::ChannelSend {
                message: e.to_string(),
            })
    }

    /// Ask the bridge to close the device link. No-op if uninitialized.
    pub fn disconnect_from_plc(&self) {
        let active = self.active.lock();
        let Some(channel) = active.as_ref() else {
            return;
        };

        tracing::info!("Sending PLC disconnect request");
        if channel.commands.send(ClientMessage::DisconnectPlc).is_err() {
            tracing::warn!("Bridge link driver stopped, disconnect request dropped");
        }
    }

    /// Tear the channel down. No callback fires after this returns.
    pub fn disconnect(&self) {
        let Some(channel) = self.active.lock().take() else {
            return;
        };

        tracing::info!("Closing bridge channel to {}", channel.endpoint);
        channel.handler.write().take();
        channel.driver.abort();
        channel.dispatcher.abort();
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let endpoint = self.active.lock().as_ref().map(|c| c.endpoint.clone());
        f.debug_struct("TransportChannel")
            .field("endpoint", &endpoint)
            .finish()
    }
}

async fn dispatch(mut events: mpsc::UnboundedReceiver<LinkEvent>, handler: HandlerSlot) {
    while let Some(event) = events.recv().await {
        let Some(handler) = handler.read().clone() else {
            break;
        };

        match event {
            LinkEvent::Opened => {
                tracing::info!("Socket connected");
                handler.on_connect();
            }
            LinkEvent::Closed => {
                tracing::info!("Socket disconnected");
                handler.on_disconnect();
            }
            LinkEvent::Message(ServerMessage::PlcConnectionStatus(status)) => {
                tracing::info!("PLC connection status: {}", status);
                handler.on_connection_status(status);
            }
            LinkEvent::Message(ServerMessage::PlcData(sample)) => {
                tracing::debug!("PLC data received: {}", sample);
                handler.on_plc_data(sample);
            }
            LinkEvent::Message(ServerMessage::Error(message)) => {
                tracing::error!("Bridge error: {}", message);
                handler.on_error(message);
            }
        }
    }
}
