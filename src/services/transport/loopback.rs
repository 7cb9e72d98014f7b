//! In-process bridge used by tests: the test drives the server side.

use super::{ChannelConnector, ClientMessage, LinkEvent, ServerMessage};
use crate::domain::sample::Sample;
use crate::state::connection_state::ConnectionStatus;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type EventSlot = Arc<Mutex<Option<mpsc::UnboundedSender<LinkEvent>>>>;

/// Client half, handed to `TransportChannel::new`
pub struct LoopbackConnector {
    events: EventSlot,
    received: mpsc::UnboundedSender<ClientMessage>,
}

/// Server half, kept by the test
pub struct LoopbackServer {
    events: EventSlot,
    received: mpsc::UnboundedReceiver<ClientMessage>,
}

impl LoopbackConnector {
    pub fn pair() -> (LoopbackConnector, LoopbackServer) {
        let events: EventSlot = Arc::new(Mutex::new(None));
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        (
            LoopbackConnector {
                events: events.clone(),
                received: received_tx,
            },
            LoopbackServer {
                events,
                received: received_rx,
            },
        )
    }
}

impl ChannelConnector for LoopbackConnector {
    fn spawn(
        &self,
        _endpoint: &str,
        mut commands: mpsc::UnboundedReceiver<ClientMessage>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> JoinHandle<()> {
        *self.events.lock() = Some(events);
        let received = self.received.clone();
        tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                if received.send(command).is_err() {
                    break;
                }
            }
        })
    }
}

impl LoopbackServer {
    /// Push a link event; false when no client is attached
    pub fn emit(&self, event: LinkEvent) -> bool {
        self.events
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    pub fn open(&self) -> bool {
        self.emit(LinkEvent::Opened)
    }

    pub fn close(&self) -> bool {
        self.emit(LinkEvent::Closed)
    }

    pub fn send(&self, message: ServerMessage) -> bool {
        self.emit(LinkEvent::Message(message))
    }

    pub fn status(&self, status: ConnectionStatus) -> bool {
        self.send(ServerMessage::PlcConnectionStatus(status))
    }

    pub fn data(&self, timestamp: &str, value: bool) -> bool {
        self.send(ServerMessage::PlcData(Sample::new(timestamp, value)))
    }

    /// Next command written by the client
    pub async fn recv_command(&mut self) -> Option<ClientMessage> {
        self.received.recv().await
    }

    pub fn try_recv_command(&mut self) -> Option<ClientMessage> {
        self.received.try_recv().ok()
    }
}
