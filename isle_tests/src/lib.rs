//! Scripted WebSocket peer for integration tests.
//!
//! Plays the server side of the protocol by hand: tests accept a session,
//! read what the client sent, and push whatever frames the scenario needs.

use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use isle_shared::config::ClientConfig;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::debug;

/// How long a test waits for the client before failing.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ScriptedServer {
    listener: TcpListener,
}

/// Binds a scripted server on an ephemeral port and returns a client config
/// pointing at it, with a short reconnect delay.
pub async fn bind_ephemeral(reconnect_delay_ms: u64) -> anyhow::Result<(ScriptedServer, ClientConfig)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind scripted server")?;
    let addr = listener.local_addr().context("local_addr")?;
    let cfg = ClientConfig {
        server_url: format!("ws://{addr}/ws"),
        reconnect_delay_ms,
        ..ClientConfig::default()
    };
    Ok((ScriptedServer { listener }, cfg))
}

impl ScriptedServer {
    /// Accepts the next client and completes the WebSocket handshake.
    pub async fn accept_one(&self) -> anyhow::Result<ServerSession> {
        let (stream, peer) = tokio::time::timeout(IO_TIMEOUT, self.listener.accept())
            .await
            .context("timed out waiting for a client")?
            .context("accept")?;
        debug!(%peer, "Scripted server accepted");
        let ws = accept_async(stream).await.context("websocket handshake")?;
        Ok(ServerSession { ws })
    }
}

pub struct ServerSession {
    ws: WebSocketStream<TcpStream>,
}

impl ServerSession {
    /// Next JSON message from the client.
    pub async fn recv_json(&mut self) -> anyhow::Result<Value> {
        loop {
            let msg = tokio::time::timeout(IO_TIMEOUT, self.ws.next())
                .await
                .context("timed out waiting for a client message")?
                .context("client closed the connection")?
                .context("websocket receive")?;
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).with_context(|| format!("parse {text}"));
            }
        }
    }

    pub async fn send_json(&mut self, value: &Value) -> anyhow::Result<()> {
        self.send_raw(value.to_string()).await
    }

    pub async fn send_raw(&mut self, text: impl Into<String>) -> anyhow::Result<()> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .context("websocket send")
    }

    /// Closes the session with a close frame.
    pub async fn close(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await.context("websocket close")
    }
}

/// A `gameState` frame shaped like the real server's: an all-grass map with
/// a column of water on the left edge, and player records without balance.
pub fn game_state_frame(width: usize, height: usize, players: &[(&str, i32, i32)]) -> Value {
    let rows: Vec<Vec<Value>> = (0..height)
        .map(|y| {
            (0..width)
                .map(|x| json!({"x": x, "y": y, "type": if x == 0 { 0 } else { 2 }, "visibility": "unexplored"}))
                .collect()
        })
        .collect();
    let players: Vec<Value> = players
        .iter()
        .map(|(id, x, y)| json!({"id": id, "x": x, "y": y, "direction": "down", "inventory": null}))
        .collect();
    json!({
        "type": "gameState",
        "data": {"gameMap": rows, "players": players, "inventory": null}
    })
}
