//! Full socket-based integration tests for client ↔ server communication.

use std::time::Duration;

use isle_client::connection::{ConnectionManager, WsConnector};
use isle_client::{ClientEvent, GameClient, Runtime};
use isle_shared::config::ClientConfig;
use isle_shared::protocol::PlayerId;
use isle_tests::{bind_ephemeral, game_state_frame, IO_TIMEOUT};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

struct Harness {
    commands: mpsc::Sender<String>,
    events: mpsc::Receiver<ClientEvent>,
    handle: JoinHandle<GameClient>,
}

impl Harness {
    fn spawn(id: &str, cfg: &ClientConfig) -> Self {
        let client = GameClient::new(PlayerId::new(id), cfg);
        let conn = ConnectionManager::new(WsConnector::new(&cfg.server_url), cfg.reconnect_delay());
        let runtime = Runtime::new(client, conn, cfg);
        let (commands, cmd_rx) = mpsc::channel(8);
        let (ev_tx, events) = mpsc::channel(256);
        let handle = tokio::spawn(runtime.run(cmd_rx, ev_tx));
        Self {
            commands,
            events,
            handle,
        }
    }

    async fn wait_for(&mut self, pred: impl Fn(&ClientEvent) -> bool) -> anyhow::Result<ClientEvent> {
        tokio::time::timeout(IO_TIMEOUT, async {
            loop {
                match self.events.recv().await {
                    Some(event) if pred(&event) => return Ok(event),
                    Some(_) => continue,
                    None => anyhow::bail!("client stopped"),
                }
            }
        })
        .await?
    }

    async fn quit(self) -> anyhow::Result<GameClient> {
        self.commands.send("quit".to_string()).await?;
        Ok(self.handle.await?)
    }
}

/// Join, full state, a move, and the server's authoritative answer.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn join_state_and_move_roundtrip() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = bind_ephemeral(5000).await?;
    let mut harness = Harness::spawn("player-1", &cfg);

    let mut session = server.accept_one().await?;
    let join = session.recv_json().await?;
    assert_eq!(join["type"], "join");
    assert_eq!(join["player"]["id"], "player-1");
    assert_eq!(join["player"]["direction"], "down");

    session
        .send_json(&game_state_frame(12, 12, &[("player-1", 5, 5), ("player-2", 0, 0)]))
        .await?;
    harness
        .wait_for(|e| *e == ClientEvent::MapReplaced { width: 12, height: 12 })
        .await?;

    harness.commands.send("move right".to_string()).await?;
    let mv = session.recv_json().await?;
    assert_eq!(mv, json!({"type": "move", "player": {"id": "player-1"}, "data": "right"}));

    session
        .send_json(&json!({"type": "playerUpdate", "player":
            {"id": "player-1", "x": 6, "y": 5, "direction": "right", "balance": 30}}))
        .await?;
    harness
        .wait_for(|e| *e == ClientEvent::BalanceChanged { balance: 30 })
        .await?;

    session
        .send_json(&json!({"type": "playerLeft", "data": "player-2"}))
        .await?;
    harness
        .wait_for(|e| *e == ClientEvent::PlayersChanged { count: 1 })
        .await?;

    let client = harness.quit().await?;
    let me = client.world().local_player();
    assert_eq!((me.x, me.y), (6, 5));
    assert_eq!(client.world().player_count(), 1);
    Ok(())
}

/// Garbage and unknown kinds are dropped; the session carries on.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bad_frames_are_dropped() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = bind_ephemeral(5000).await?;
    let mut harness = Harness::spawn("player-1", &cfg);

    let mut session = server.accept_one().await?;
    session.recv_json().await?;
    session.send_raw("not json at all").await?;
    session.send_raw(r#"{"type":"teleport","data":{"x":1}}"#).await?;
    session.send_raw(r#"{"type":"error","data":"Invalid move"}"#).await?;
    harness
        .wait_for(|e| *e == ClientEvent::Notice("Invalid move".to_string()))
        .await?;

    let client = harness.quit().await?;
    assert!(client.is_connected());
    assert_eq!(client.world().dimensions(), (0, 0));
    Ok(())
}

/// Server closes; the client rejoins after the reconnect delay with its last
/// known position.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnects_after_server_close() -> anyhow::Result<()> {
    init_tracing();
    let (server, cfg) = bind_ephemeral(200).await?;
    let mut harness = Harness::spawn("player-1", &cfg);

    let mut session = server.accept_one().await?;
    session.recv_json().await?;
    session
        .send_json(&game_state_frame(8, 8, &[("player-1", 3, 4)]))
        .await?;
    harness
        .wait_for(|e| matches!(e, ClientEvent::MapReplaced { .. }))
        .await?;

    let closed_at = tokio::time::Instant::now();
    session.close().await?;
    harness.wait_for(|e| *e == ClientEvent::Disconnected).await?;

    let mut second = server.accept_one().await?;
    let join = second.recv_json().await?;
    assert!(closed_at.elapsed() >= Duration::from_millis(200));
    assert_eq!(join["type"], "join");
    assert_eq!(join["player"]["x"], 3);
    assert_eq!(join["player"]["y"], 4);
    harness.wait_for(|e| *e == ClientEvent::Connected).await?;

    harness.quit().await?;
    Ok(())
}
