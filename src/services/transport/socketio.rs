//! Socket.IO Link Driver
//!
//! The bridge is a Socket.IO server. Each named bridge event is decoded
//! through `wire` and relayed as a `LinkEvent`; commands go out as
//! `connect_plc(profile)` and a bare `disconnect_plc`. The client library's
//! own reconnect is off so the `Supervisor` owns the retry policy here too.

use super::wire::{self, ClientMessage, LinkEvent};
use super::{ChannelConnector, LinkEnd};
use crate::services::supervisor::{RetryConfig, Supervisor};
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use rust_socketio::asynchronous::{Client, ClientBuilder};
use rust_socketio::{Event, Payload};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Bridge events relayed to the channel
const BRIDGE_EVENTS: [&str; 3] = ["plc_connection_status", "plc_data", "error"];

/// Connector for Socket.IO bridges (`http://`, `https://`, `ws://`, `wss://`)
#[derive(Clone, Debug, Default)]
pub struct SocketIoConnector {
    retry: RetryConfig,
}

impl SocketIoConnector {
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }
}

impl ChannelConnector for SocketIoConnector {
    fn spawn(
        &self,
        endpoint: &str,
        commands: mpsc::UnboundedReceiver<ClientMessage>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> JoinHandle<()> {
        let supervisor = Arc::new(Supervisor::new(endpoint, self.retry.clone()));
        tokio::spawn(drive(endpoint.to_string(), supervisor, commands, events))
    }
}

async fn drive(
    endpoint: String,
    supervisor: Arc<Supervisor>,
    mut commands: mpsc::UnboundedReceiver<ClientMessage>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    loop {
        supervisor.on_dialing();
        let opened = Arc::new(AtomicBool::new(false));
        let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();

        let builder = link_builder(&endpoint, &supervisor, &events, &opened, closed_tx);
        match builder.connect().await {
            Ok(client) => {
                let end = serve(&client, &mut commands, &mut closed_rx, &events).await;
                if let Err(e) = client.disconnect().await {
                    tracing::debug!("{}: socket close failed: {}", endpoint, e);
                }
                match end {
                    LinkEnd::Shutdown => return,
                    LinkEnd::Dropped(reason) => supervisor.on_disconnected(&reason),
                }
            }
            Err(e) => supervisor.on_disconnected(&e.to_string()),
        }

        if opened.load(Ordering::SeqCst) && events.send(LinkEvent::Closed).is_err() {
            return;
        }

        let Some(delay) = supervisor.next_retry_delay() else {
            return;
        };
        tokio::time::sleep(delay).await;
    }
}

/// Client for one attempt; callbacks report into `events` and `closed`
fn link_builder(
    endpoint: &str,
    supervisor: &Arc<Supervisor>,
    events: &mpsc::UnboundedSender<LinkEvent>,
    opened: &Arc<AtomicBool>,
    closed: mpsc::UnboundedSender<String>,
) -> ClientBuilder {
    let on_connect = {
        let supervisor = supervisor.clone();
        let events = events.clone();
        let opened = opened.clone();
        move |_payload: Payload, _client: Client| -> BoxFuture<'static, ()> {
            if !opened.swap(true, Ordering::SeqCst) {
                supervisor.on_connected();
                let _ = events.send(LinkEvent::Opened);
            }
            future::ready(()).boxed()
        }
    };

    let on_close = move |_payload: Payload, _client: Client| -> BoxFuture<'static, ()> {
        let _ = closed.send("closed by bridge".to_string());
        future::ready(()).boxed()
    };

    BRIDGE_EVENTS.into_iter().fold(
        ClientBuilder::new(endpoint)
            .reconnect(false)
            .on(Event::Connect, on_connect)
            .on(Event::Close, on_close),
        |builder, name| builder.on(name, relay(name, events.clone())),
    )
}

/// Decode one named bridge event and pass it on
fn relay(
    name: &'static str,
    events: mpsc::UnboundedSender<LinkEvent>,
) -> impl FnMut(Payload, Client) -> BoxFuture<'static, ()> + Send + Sync + 'static {
    move |payload, _client| {
        match wire::decode_event(name, payload_args(payload)) {
            Ok(message) => {
                let _ = events.send(LinkEvent::Message(message));
            }
            Err(e) => tracing::warn!("Ignoring malformed {} event: {}", name, e),
        }
        future::ready(()).boxed()
    }
}

async fn serve(
    client: &Client,
    commands: &mut mpsc::UnboundedReceiver<ClientMessage>,
    closed: &mut mpsc::UnboundedReceiver<String>,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> LinkEnd {
    loop {
        tokio::select! {
            reason = closed.recv() => {
                return LinkEnd::Dropped(reason.unwrap_or_else(|| "socket gone".to_string()));
            }
            _ = events.closed() => return LinkEnd::Shutdown,
            command = commands.recv() => {
                let Some(command) = command else {
                    return LinkEnd::Shutdown;
                };
                let (name, data) = match wire::event_parts(&command) {
                    Ok(parts) => parts,
                    Err(e) => {
                        tracing::error!("Failed to encode bridge command: {}", e);
                        continue;
                    }
                };
                let payload = Payload::Text(data.into_iter().collect());
                if let Err(e) = client.emit(name, payload).await {
                    return LinkEnd::Dropped(e.to_string());
                }
            }
        }
    }
}

/// Event arguments as JSON values
fn payload_args(payload: Payload) -> Vec<Value> {
    match payload {
        Payload::Text(args) => args,
        #[allow(deprecated)]
        Payload::String(text) => {
            vec![serde_json::from_str(&text).unwrap_or(Value::String(text))]
        }
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    #[test]
    fn test_payload_args() {
        assert_eq!(
            payload_args(Payload::Text(vec![json!("connected")])),
            vec![json!("connected")]
        );
        assert!(payload_args(Payload::Text(Vec::new())).is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_bridge_never_opens() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let retry = RetryConfig {
            initial_delay: Duration::from_millis(10),
            max_attempts: 1,
            ..RetryConfig::default()
        };
        let (_command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let driver = SocketIoConnector::new(retry).spawn(
            &format!("http://{}", addr),
            command_rx,
            event_tx,
        );

        timeout(Duration::from_secs(10), driver)
            .await
            .expect("gives up")
            .expect("no panic");
        assert!(event_rx.try_recv().is_err());
    }
}
