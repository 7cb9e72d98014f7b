//! TCP Link Driver
//!
//! Speaks the line-delimited JSON protocol from `wire` over a plain TCP
//! socket and reconnects with backoff when the bridge goes away. The link
//! only counts as open once the bridge has sent its `connect` frame; a peer
//! that answers with anything else (an HTTP server, a Socket.IO bridge) is
//! dropped and retried. Commands queued while the link is down stay in the
//! channel and are written once it comes back.

use super::wire::{self, ClientMessage, LinkEvent};
use super::{ChannelConnector, LinkEnd};
use crate::constants::LINK_HANDSHAKE_TIMEOUT_MS;
use crate::services::supervisor::{RetryConfig, Supervisor};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type LineReader = Lines<BufReader<OwnedReadHalf>>;

/// Connector for bridges reachable over TCP
#[derive(Clone, Debug)]
pub struct TcpLinkConnector {
    retry: RetryConfig,
    handshake_timeout: Duration,
}

impl Default for TcpLinkConnector {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl TcpLinkConnector {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            retry,
            handshake_timeout: Duration::from_millis(LINK_HANDSHAKE_TIMEOUT_MS),
        }
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl ChannelConnector for TcpLinkConnector {
    fn spawn(
        &self,
        endpoint: &str,
        commands: mpsc::UnboundedReceiver<ClientMessage>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> JoinHandle<()> {
        let addr = socket_addr(endpoint);
        let supervisor = Supervisor::new(addr.clone(), self.retry.clone());
        tokio::spawn(drive(addr, self.handshake_timeout, supervisor, commands, events))
    }
}

/// Strip a URL scheme and trailing path from an endpoint ("tcp://host:5000/" -> "host:5000")
pub fn socket_addr(endpoint: &str) -> String {
    let without_scheme = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest);
    without_scheme
        .split('/')
        .next()
        .unwrap_or(without_scheme)
        .to_string()
}

async fn drive(
    addr: String,
    handshake_timeout: Duration,
    supervisor: Supervisor,
    mut commands: mpsc::UnboundedReceiver<ClientMessage>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    loop {
        supervisor.on_dialing();
        match open(&addr, handshake_timeout).await {
            Ok((lines, write_half)) => {
                supervisor.on_connected();
                if events.send(LinkEvent::Opened).is_err() {
                    return;
                }
                match run_link(lines, write_half, &mut commands, &events).await {
                    LinkEnd::Shutdown => return,
                    LinkEnd::Dropped(reason) => {
                        supervisor.on_disconnected(&reason);
                        if events.send(LinkEvent::Closed).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(reason) => supervisor.on_disconnected(&reason),
        }

        let Some(delay) = supervisor.next_retry_delay() else {
            return;
        };
        tokio::time::sleep(delay).await;
    }
}

/// Dial the bridge and wait for its `connect` frame
async fn open(
    addr: &str,
    handshake_timeout: Duration,
) -> Result<(LineReader, OwnedWriteHalf), String> {
    let stream = TcpStream::connect(addr).await.map_err(|e| e.to_string())?;
    let (read_half, write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let first = tokio::time::timeout(handshake_timeout, async {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                other => return other,
            }
        }
    })
    .await;

    match first {
        Ok(Ok(Some(line))) if wire::is_handshake(&line) => Ok((lines, write_half)),
        Ok(Ok(Some(line))) => Err(format!("unexpected greeting: {}", line.trim())),
        Ok(Ok(None)) => Err("closed by bridge before handshake".to_string()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("no handshake from bridge".to_string()),
    }
}

async fn run_link(
    mut lines: LineReader,
    mut write_half: OwnedWriteHalf,
    commands: &mut mpsc::UnboundedReceiver<ClientMessage>,
    events: &mpsc::UnboundedSender<LinkEvent>,
) -> LinkEnd {
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match wire::decode(&line) {
                        Ok(message) => {
                            if events.send(LinkEvent::Message(message)).is_err() {
                                return LinkEnd::Shutdown;
                            }
                        }
                        Err(e) => tracing::warn!("Ignoring malformed bridge frame: {}", e),
                    }
                }
                Ok(None) => return LinkEnd::Dropped("closed by bridge".to_string()),
                Err(e) => return LinkEnd::Dropped(e.to_string()),
            },
            command = commands.recv() => {
                let Some(command) = command else {
                    return LinkEnd::Shutdown;
                };
                let frame = match wire::encode(&command) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!("Failed to encode bridge command: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write_half.write_all(frame.as_bytes()).await {
                    return LinkEnd::Dropped(e.to_string());
                }
            }
        }
    }
}
