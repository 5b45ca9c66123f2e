//! Client runtime.
//!
//! Drives one [`GameClient`] and its connection from a single task. Each turn
//! of the loop waits for whichever comes first:
//! - an inbound frame, a closure, or the reconnect deadline
//! - the next render frame
//! - the end of the catch countdown, while one is running
//! - a console command
//!
//! then flushes the client's outbox and forwards its events.

use std::time::Duration;

use isle_shared::config::ClientConfig;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    client::GameClient,
    connection::{ConnEvent, ConnectionManager, Connector},
    event::ClientEvent,
};

pub struct Runtime<C> {
    client: GameClient,
    conn: ConnectionManager<C>,
    frame_interval: Duration,
}

impl<C: Connector> Runtime<C> {
    pub fn new(client: GameClient, conn: ConnectionManager<C>, cfg: &ClientConfig) -> Self {
        Self {
            client,
            conn,
            frame_interval: cfg.frame_interval(),
        }
    }

    /// Runs until `quit` arrives or the command channel closes, then hands
    /// the client back.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<String>,
        events: mpsc::Sender<ClientEvent>,
    ) -> GameClient {
        self.open().await;
        self.flush(&events).await;

        let mut frames = interval(self.frame_interval);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame = Instant::now();

        loop {
            let catch_deadline = self.client.catch_deadline();
            tokio::select! {
                event = self.conn.next_event() => match event {
                    ConnEvent::Frame(text) => {
                        self.client.handle_frame(&text, Instant::now());
                    }
                    ConnEvent::Closed => self.client.on_disconnected(),
                    ConnEvent::ReconnectDue => self.open().await,
                },
                now = frames.tick() => {
                    let dt_ms = now.saturating_duration_since(last_frame).as_secs_f32() * 1000.0;
                    last_frame = now;
                    self.client.frame(dt_ms, now);
                }
                _ = sleep_until(catch_deadline.unwrap_or_else(Instant::now)), if catch_deadline.is_some() => {
                    self.client.expire_catch_window(Instant::now());
                }
                line = commands.recv() => match line.as_deref().map(str::trim) {
                    None | Some("quit") | Some("exit") => break,
                    Some(line) => {
                        for out in self.client.exec_console(line) {
                            emit(&events, ClientEvent::Output(out));
                        }
                    }
                },
            }
            self.flush(&events).await;
        }

        self.conn.close().await;
        info!("Client stopped");
        self.client
    }

    async fn open(&mut self) {
        let join = self.client.join_message();
        if self.conn.connect(&join).await {
            self.client.on_connected();
        }
    }

    async fn flush(&mut self, events: &mpsc::Sender<ClientEvent>) {
        for msg in self.client.take_outbox() {
            if !self.conn.send(&msg).await {
                debug!(kind = msg.kind(), "Message not delivered");
            }
        }
        if self.client.is_connected() && !self.conn.is_connected() {
            self.client.on_disconnected();
        }
        for event in self.client.drain_events() {
            emit(events, event);
        }
    }
}

fn emit(events: &mpsc::Sender<ClientEvent>, event: ClientEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => warn!(?event, "Event channel full, dropping event"),
        Err(TrySendError::Closed(_)) => {}
    }
}
