//! # Node Transport
//!
//! Raw frame delivery to and from nodes, one WebSocket per node ip.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Per-node WebSocket connection                        │
//! │                                                                         │
//! │  open(ip)                                                              │
//! │     │   ws://{ip}:{port}{path}                                          │
//! │     ▼                                                                   │
//! │  ┌────────────┐  failure   ┌────────────┐                              │
//! │  │ Connecting │ ─────────► │  Backoff   │ ── retries left ──┐          │
//! │  └─────┬──────┘            └─────┬──────┘                   │          │
//! │        │ success                 │ exhausted                │          │
//! │        ▼                         ▼                          │          │
//! │  ┌────────────┐            ConnectionFailed      ◄──────────┘          │
//! │  │   Open     │  writer task: outgoing queue → socket                  │
//! │  │            │  reader task: socket → IncomingFrame channel           │
//! │  └─────┬──────┘               (answers WebSocket pings)                │
//! │        │ close(ip) / remote close / error                               │
//! │        ▼                                                                │
//! │    Closed (entry removed; the next open() reconnects)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Frames are WebSocket binary messages; text messages from a node are
//! ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::NodeSettings;
use crate::error::{SyncError, SyncResult};

/// Upload progress callback: `(bytes sent, bytes total)`.
pub type ProgressFn<'a> = &'a (dyn Fn(u64, u64) + Send + Sync);

/// A frame received from a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFrame {
    pub ip: String,
    pub data: Vec<u8>,
}

// =============================================================================
// Transport Trait
// =============================================================================

/// Moves encoded frames between this application and its nodes.
///
/// Received frames are not returned from any method; implementations push
/// them into the `mpsc` channel handed out when they were created.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens a connection to `ip`. Opening an open connection is a no-op.
    async fn open(&self, ip: &str) -> SyncResult<()>;

    async fn close(&self, ip: &str) -> SyncResult<()>;

    async fn send(&self, ip: &str, frame: Vec<u8>) -> SyncResult<()>;

    /// Sends a large frame, reporting progress along the way.
    async fn send_with_progress(
        &self,
        ip: &str,
        frame: Vec<u8>,
        progress: ProgressFn<'_>,
    ) -> SyncResult<()> {
        let total = frame.len() as u64;
        progress(0, total);
        self.send(ip, frame).await?;
        progress(total, total);
        Ok(())
    }

    async fn is_open(&self, ip: &str) -> bool;
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub port: u16,
    pub path: String,
    pub connect_timeout: Duration,
    /// Attempts after the first one fails.
    pub connect_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::from(&NodeSettings::default())
    }
}

impl From<&NodeSettings> for TransportConfig {
    fn from(node: &NodeSettings) -> Self {
        TransportConfig {
            port: node.port,
            path: node.path.clone(),
            connect_timeout: Duration::from_secs(node.connect_timeout_secs),
            connect_retries: node.connect_retries,
            initial_backoff: Duration::from_millis(node.initial_backoff_ms),
            max_backoff: Duration::from_millis(node.max_backoff_ms),
        }
    }
}

impl TransportConfig {
    /// WebSocket URL of the node at `ip`.
    pub fn url_for(&self, ip: &str) -> SyncResult<url::Url> {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        let url = url::Url::parse(&format!("ws://{}:{}{}", ip, self.port, path))?;
        Ok(url)
    }
}

// =============================================================================
// WebSocket Transport
// =============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Type alias for the WebSocket write half.
type WsSink = SplitSink<WsStream, WsMessage>;

struct Outgoing {
    message: WsMessage,
    ack: Option<oneshot::Sender<SyncResult<()>>>,
}

struct Connection {
    generation: u64,
    outgoing: mpsc::Sender<Outgoing>,
    reader: JoinHandle<()>,
}

type Connections = Arc<RwLock<HashMap<String, Connection>>>;

/// WebSocket client transport holding one connection per node ip.
///
/// ## Usage
/// ```rust,ignore
/// let (transport, incoming_rx) = WsTransport::new(TransportConfig::default());
/// transport.open("10.0.0.5").await?;
/// transport.send("10.0.0.5", frame).await?;
/// ```
pub struct WsTransport {
    config: TransportConfig,
    connections: Connections,
    incoming_tx: mpsc::Sender<IncomingFrame>,
    generation: AtomicU64,
}

impl WsTransport {
    /// Creates the transport and the receiver incoming frames arrive on.
    pub fn new(config: TransportConfig) -> (Self, mpsc::Receiver<IncomingFrame>) {
        let (incoming_tx, incoming_rx) = mpsc::channel(100);
        let transport = WsTransport {
            config,
            connections: Arc::new(RwLock::new(HashMap::new())),
            incoming_tx,
            generation: AtomicU64::new(0),
        };
        (transport, incoming_rx)
    }

    /// Connects with timeout, retrying with exponential backoff.
    async fn connect_with_retry(&self, ip: &str) -> SyncResult<WsStream> {
        let url = self.config.url_for(ip)?;
        let mut backoff = self.create_backoff();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(ip, url = %url, attempt, "Connecting to node");

            let error = match timeout(self.config.connect_timeout, connect_async(url.as_str())).await {
                Ok(Ok((stream, response))) => {
                    debug!(ip, status = ?response.status(), "WebSocket handshake complete");
                    return Ok(stream);
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timeout after {}s", self.config.connect_timeout.as_secs()),
            };

            if attempt > self.config.connect_retries {
                return Err(SyncError::ConnectionFailed {
                    ip: ip.to_string(),
                    message: error,
                });
            }

            match backoff.next_backoff() {
                Some(delay) => {
                    debug!(ip, ?delay, error = %error, "Waiting before reconnect");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(SyncError::ConnectionFailed {
                        ip: ip.to_string(),
                        message: error,
                    })
                }
            }
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    async fn outgoing(&self, ip: &str) -> SyncResult<mpsc::Sender<Outgoing>> {
        self.connections
            .read()
            .await
            .get(ip)
            .map(|c| c.outgoing.clone())
            .ok_or_else(|| SyncError::NotConnected(ip.to_string()))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, ip: &str) -> SyncResult<()> {
        if self.is_open(ip).await {
            return Ok(());
        }

        let stream = self.connect_with_retry(ip).await?;
        let (sink, stream) = stream.split();
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<Outgoing>(32);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(write_loop(ip.to_string(), sink, outgoing_rx));
        let reader = tokio::spawn(read_loop(
            ip.to_string(),
            generation,
            stream,
            outgoing_tx.clone(),
            self.incoming_tx.clone(),
            self.connections.clone(),
        ));

        let previous = self.connections.write().await.insert(
            ip.to_string(),
            Connection {
                generation,
                outgoing: outgoing_tx,
                reader,
            },
        );
        if let Some(previous) = previous {
            previous.reader.abort();
        }

        info!(ip, "Connected to node");
        Ok(())
    }

    async fn close(&self, ip: &str) -> SyncResult<()> {
        let Some(connection) = self.connections.write().await.remove(ip) else {
            return Ok(());
        };
        let _ = connection
            .outgoing
            .send(Outgoing {
                message: WsMessage::Close(None),
                ack: None,
            })
            .await;
        connection.reader.abort();
        info!(ip, "Disconnected from node");
        Ok(())
    }

    async fn send(&self, ip: &str, frame: Vec<u8>) -> SyncResult<()> {
        let outgoing = self.outgoing(ip).await?;
        let (ack_tx, ack_rx) = oneshot::channel();
        outgoing
            .send(Outgoing {
                message: WsMessage::Binary(frame.into()),
                ack: Some(ack_tx),
            })
            .await
            .map_err(|_| SyncError::NotConnected(ip.to_string()))?;
        ack_rx
            .await
            .map_err(|_| SyncError::ChannelError("writer task stopped".into()))?
    }

    async fn is_open(&self, ip: &str) -> bool {
        self.connections
            .read()
            .await
            .get(ip)
            .is_some_and(|c| !c.outgoing.is_closed())
    }
}

async fn write_loop(ip: String, mut sink: WsSink, mut outgoing_rx: mpsc::Receiver<Outgoing>) {
    while let Some(Outgoing { message, ack }) = outgoing_rx.recv().await {
        let closing = matches!(message, WsMessage::Close(_));
        let result = sink.send(message).await.map_err(SyncError::from);
        if let Err(e) = &result {
            warn!(ip = %ip, error = %e, "Failed to write to node");
        }
        if let Some(ack) = ack {
            let _ = ack.send(result);
        }
        if closing {
            break;
        }
    }
    debug!(ip = %ip, "Writer stopped");
}

async fn read_loop(
    ip: String,
    generation: u64,
    mut stream: SplitStream<WsStream>,
    outgoing: mpsc::Sender<Outgoing>,
    incoming: mpsc::Sender<IncomingFrame>,
    connections: Connections,
) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(WsMessage::Binary(data)) => {
                let frame = IncomingFrame {
                    ip: ip.clone(),
                    data: data.to_vec(),
                };
                if incoming.send(frame).await.is_err() {
                    warn!(ip = %ip, "Incoming frame receiver dropped");
                    break;
                }
            }
            Ok(WsMessage::Ping(data)) => {
                let pong = Outgoing {
                    message: WsMessage::Pong(data),
                    ack: None,
                };
                if outgoing.send(pong).await.is_err() {
                    break;
                }
            }
            Ok(WsMessage::Text(_)) => {
                warn!(ip = %ip, "Ignoring text message from node");
            }
            Ok(WsMessage::Close(frame)) => {
                info!(ip = %ip, ?frame, "Node closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(ip = %ip, error = %e, "WebSocket error");
                break;
            }
        }
    }

    let mut connections = connections.write().await;
    if connections.get(&ip).is_some_and(|c| c.generation == generation) {
        connections.remove(&ip);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
