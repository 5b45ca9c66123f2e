//! Connection management.
//!
//! One WebSocket session at a time to a fixed endpoint. Any closure, failed
//! handshake or send error schedules a single reconnect after a fixed delay;
//! this repeats forever with no backoff and nothing is fatal.
//!
//! The session sits behind [`Connector`] / [`Transport`] so tests can script
//! the peer.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use isle_shared::protocol::{encode_client, ClientMsg};
use tokio::net::TcpStream;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// An open message channel carrying one JSON text per message.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, text: String) -> anyhow::Result<()>;

    /// Next inbound message. `None` once the peer has closed.
    async fn recv(&mut self) -> Option<anyhow::Result<String>>;

    async fn close(&mut self) -> anyhow::Result<()>;
}

/// Opens transports to one endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> anyhow::Result<Box<dyn Transport>>;

    fn endpoint(&self) -> &str;
}

pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> anyhow::Result<Box<dyn Transport>> {
        let (stream, _response) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("websocket connect {}", self.url))?;
        Ok(Box::new(WsTransport { stream }))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> anyhow::Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .context("websocket send")
    }

    async fn recv(&mut self) -> Option<anyhow::Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(bytes)) => {
                    return Some(String::from_utf8(bytes).context("binary frame is not UTF-8"))
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Close frame");
                    return None;
                }
                // Ping/pong replies are handled by tungstenite.
                Ok(_) => continue,
                Err(e) => return Some(Err(anyhow::Error::new(e).context("websocket receive"))),
            }
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.stream.close(None).await.context("websocket close")
    }
}

/// Fixed-delay reconnect schedule. At most one attempt is pending at a time.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    pending: Option<Instant>,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules an attempt at `now + delay`. Returns false if one is already
    /// pending; the earlier deadline stands.
    pub fn schedule(&mut self, now: Instant) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some(now + self.delay);
        true
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    ReconnectPending,
}

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnEvent {
    Frame(String),
    /// The session ended; a reconnect has been scheduled.
    Closed,
    /// The reconnect delay elapsed; call [`ConnectionManager::connect`].
    ReconnectDue,
}

pub struct ConnectionManager<C> {
    connector: C,
    transport: Option<Box<dyn Transport>>,
    policy: ReconnectPolicy,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, reconnect_delay: Duration) -> Self {
        Self {
            connector,
            transport: None,
            policy: ReconnectPolicy::new(reconnect_delay),
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.transport.is_some() {
            ConnectionState::Connected
        } else if self.policy.deadline().is_some() {
            ConnectionState::ReconnectPending
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.policy.deadline()
    }

    /// Opens a session and sends `join` as its first message. On failure a
    /// reconnect is scheduled and false is returned.
    pub async fn connect(&mut self, join: &ClientMsg) -> bool {
        self.policy.clear();
        if let Some(mut old) = self.transport.take() {
            if let Err(e) = old.close().await {
                debug!(error = %format!("{e:#}"), "Closing previous session failed");
            }
        }

        info!(endpoint = %self.connector.endpoint(), "Connecting");
        match self.connector.connect().await {
            Ok(transport) => {
                self.transport = Some(transport);
                info!(endpoint = %self.connector.endpoint(), "Connected");
                self.send(join).await
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Connect failed");
                self.schedule_reconnect();
                false
            }
        }
    }

    /// Sends one message. Dropped if there is no session; a failed send ends
    /// the session.
    pub async fn send(&mut self, msg: &ClientMsg) -> bool {
        let Some(transport) = self.transport.as_mut() else {
            debug!(kind = msg.kind(), "Not connected, dropping message");
            return false;
        };
        let text = match encode_client(msg) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Dropping unencodable message");
                return false;
            }
        };
        let result = transport.send(text).await;
        match result {
            Ok(()) => {
                debug!(kind = msg.kind(), "Sent");
                true
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Send failed");
                self.lose_session();
                false
            }
        }
    }

    /// Waits for the next inbound frame, closure, or reconnect deadline.
    ///
    /// Cancel-safe: nothing changes until a result is ready.
    pub async fn next_event(&mut self) -> ConnEvent {
        if let Some(transport) = self.transport.as_mut() {
            let received = transport.recv().await;
            return match received {
                Some(Ok(text)) => ConnEvent::Frame(text),
                Some(Err(e)) => {
                    warn!(error = %format!("{e:#}"), "Transport error");
                    self.lose_session();
                    ConnEvent::Closed
                }
                None => {
                    info!("Server closed the connection");
                    self.lose_session();
                    ConnEvent::Closed
                }
            };
        }

        match self.policy.deadline() {
            Some(at) => {
                sleep_until(at).await;
                ConnEvent::ReconnectDue
            }
            None => std::future::pending().await,
        }
    }

    /// Closes the session for good; no reconnect follows.
    pub async fn close(&mut self) {
        self.policy.clear();
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!(error = %format!("{e:#}"), "Close failed");
            }
        }
    }

    fn lose_session(&mut self) {
        self.transport = None;
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.policy.schedule(Instant::now()) {
            info!(delay_ms = self.policy.delay().as_millis() as u64, "Reconnect scheduled");
        } else {
            debug!("Reconnect already pending");
        }
    }
}
