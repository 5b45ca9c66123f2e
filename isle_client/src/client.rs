//! Client implementation.
//!
//! `GameClient` is the engine without I/O. It owns:
//! - The world model (map, players, inventory, balance)
//! - The fishing state machine
//! - The market transactor
//! - The render interpolator
//! - An outbox of messages for the connection to send
//! - A queue of state-change events for the presentation layer
//!
//! Everything runs on the caller's task; the runtime feeds it frames, ticks
//! and commands, then drains the outbox and events.

use std::collections::VecDeque;

use isle_shared::{
    config::ClientConfig,
    protocol::{decode_server, ClientMsg, Direction, InventoryItem, PlayerId, ServerMsg},
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    event::ClientEvent,
    fishing::{FishingMachine, FishingOutcome, FishingPhase, FishingState},
    input::{map_key, Intent},
    interp::RenderInterpolator,
    market::Market,
    world::{Changes, World},
};

/// High-level game client.
pub struct GameClient {
    world: World,
    fishing: FishingMachine,
    market: Market,
    interp: RenderInterpolator,
    connected: bool,
    outbox: VecDeque<ClientMsg>,
    events: Vec<ClientEvent>,
}

impl GameClient {
    pub fn new(local_id: PlayerId, cfg: &ClientConfig) -> Self {
        Self {
            world: World::new(local_id.clone(), cfg.sight_range),
            fishing: FishingMachine::new(local_id.clone(), cfg.catch_window()),
            market: Market::new(local_id),
            interp: RenderInterpolator::default(),
            connected: false,
            outbox: VecDeque::new(),
            events: Vec::new(),
        }
    }

    pub fn local_id(&self) -> &PlayerId {
        self.world.local_id()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn fishing(&self) -> &FishingMachine {
        &self.fishing
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// First message on every (re)connect: identity plus last known position.
    pub fn join_message(&self) -> ClientMsg {
        let me = self.world.local_player();
        ClientMsg::join(&me.id, me.x, me.y, me.direction)
    }

    pub fn on_connected(&mut self) {
        info!(id = %self.local_id(), "Session open");
        self.connected = true;
        self.events.push(ClientEvent::Connected);
    }

    /// Drops session-bound state. The world is kept so the next `join`
    /// carries the last known position.
    pub fn on_disconnected(&mut self) {
        if !self.connected {
            return;
        }
        info!("Session closed");
        self.connected = false;
        let from = self.fishing.state();
        self.fishing.reset();
        self.fishing_transition(from);
        self.market.clear_pending();
        self.outbox.clear();
        self.events.push(ClientEvent::Disconnected);
    }

    /// Decodes and applies one inbound frame. Bad frames are logged and
    /// dropped without touching state.
    pub fn handle_frame(&mut self, text: &str, now: Instant) -> bool {
        match decode_server(text) {
            Ok(msg) => {
                self.dispatch(msg, now);
                true
            }
            Err(e) => {
                warn!(error = %e, "Dropping inbound frame");
                false
            }
        }
    }

    /// Applies one decoded server message.
    pub fn dispatch(&mut self, msg: ServerMsg, now: Instant) {
        debug!(kind = msg.kind(), "Server message");
        match msg {
            ServerMsg::GameState { data, player } => {
                let (width, height) = (data.game_map.width(), data.game_map.height());
                let mut changes =
                    self.world
                        .apply_full_state(data.players, data.game_map, data.inventory);
                if let Some(me) = player.filter(|p| &p.id == self.world.local_id()) {
                    changes |= self.world.upsert_player(&me);
                }
                info!(width, height, players = self.world.player_count(), "Game state loaded");
                self.emit_changes(changes);
            }
            ServerMsg::PlayerUpdate { player } | ServerMsg::NewPlayer { player } => {
                let changes = self.world.upsert_player(&player);
                self.emit_changes(changes);
            }
            ServerMsg::PlayerLeft { data } => {
                let changes = self.world.remove_player(&data);
                if !changes.is_empty() {
                    info!(id = %data, "Player left");
                }
                self.emit_changes(changes);
            }
            ServerMsg::FishingEvent { data } => {
                let from = self.fishing.state();
                if self.fishing.on_event(&data, now) {
                    self.fishing_transition(from);
                }
            }
            ServerMsg::InventoryUpdate { data } => {
                let changes = self.world.set_inventory(data);
                self.emit_changes(changes);
            }
            ServerMsg::SellEvent { data } | ServerMsg::BuyEvent { data } => {
                if let Some(settled) = self.market.on_event(&data, &mut self.world) {
                    self.emit_changes(settled.changes);
                    self.events.push(ClientEvent::TradeSettled {
                        kind: settled.kind,
                        item: settled.item,
                    });
                }
            }
            ServerMsg::Error { data } => {
                info!(message = %data, "Server rejected a request");
                self.events.push(ClientEvent::Notice(data));
            }
        }
    }

    fn emit_changes(&mut self, changes: Changes) {
        if changes.contains(Changes::MAP) {
            let (width, height) = self.world.dimensions();
            self.events.push(ClientEvent::MapReplaced { width, height });
        }
        if changes.contains(Changes::PLAYERS) {
            self.events.push(ClientEvent::PlayersChanged {
                count: self.world.player_count(),
            });
        }
        if changes.contains(Changes::INVENTORY) {
            self.events.push(ClientEvent::InventoryChanged);
        }
        if changes.contains(Changes::BALANCE) {
            self.events.push(ClientEvent::BalanceChanged {
                balance: self.world.local_player().balance,
            });
        }
    }

    fn fishing_transition(&mut self, from: FishingState) {
        let to = self.fishing.state();
        if from == to {
            return;
        }
        let fish = match self.fishing.phase() {
            FishingPhase::Resolved(FishingOutcome::Caught(fish)) => Some(fish.clone()),
            _ => None,
        };
        self.events.push(ClientEvent::Fishing { from, to, fish });
    }

    fn notice(&mut self, text: impl Into<String>) {
        self.events.push(ClientEvent::Notice(text.into()));
    }

    /// Requests a one-tile move. Ignored while fishing.
    pub fn submit_move(&mut self, direction: Direction) -> bool {
        if self.fishing.is_fishing() {
            debug!(%direction, "Move ignored while fishing");
            return false;
        }
        self.outbox
            .push_back(ClientMsg::move_to(self.world.local_id(), direction));
        true
    }

    pub fn submit_fish(&mut self) -> bool {
        let from = self.fishing.state();
        match self.fishing.start(self.world.local_player()) {
            Ok(msg) => {
                self.outbox.push_back(msg);
                self.fishing_transition(from);
                true
            }
            Err(e) => {
                self.notice(e.to_string());
                false
            }
        }
    }

    /// Catch key. Outside an open window, or after the first press, it does
    /// nothing.
    pub fn submit_catch_attempt(&mut self) -> bool {
        match self.fishing.attempt_catch() {
            Ok(msg) => {
                self.outbox.push_back(msg);
                true
            }
            Err(e) => {
                debug!(reason = %e, "Catch key ignored");
                false
            }
        }
    }

    /// Sells the whole stack named `name`.
    pub fn submit_sell(&mut self, name: &str) -> bool {
        match self.market.request_sell(self.world.local_player(), name) {
            Ok(msg) => {
                self.outbox.push_back(msg);
                true
            }
            Err(e) => {
                self.notice(e.to_string());
                false
            }
        }
    }

    pub fn submit_buy(&mut self, item: InventoryItem) -> bool {
        match self.market.request_buy(self.world.local_player(), item) {
            Ok(msg) => {
                self.outbox.push_back(msg);
                true
            }
            Err(e) => {
                self.notice(e.to_string());
                false
            }
        }
    }

    pub fn cancel_fishing(&mut self) -> bool {
        let from = self.fishing.state();
        let cancelled = self.fishing.cancel();
        self.fishing_transition(from);
        cancelled
    }

    /// Closes the fishing result panel.
    pub fn acknowledge_fishing(&mut self) -> bool {
        let from = self.fishing.state();
        let closed = self.fishing.acknowledge();
        self.fishing_transition(from);
        closed
    }

    /// Routes one key press through the input map.
    pub fn press_key(&mut self, key: char) -> bool {
        match map_key(key, self.fishing.panel_open()) {
            Some(Intent::Move(direction)) => self.submit_move(direction),
            Some(Intent::Fish) => self.submit_fish(),
            Some(Intent::CatchAttempt) => self.submit_catch_attempt(),
            None => false,
        }
    }

    /// One frame: smooth render positions and run the catch countdown.
    pub fn frame(&mut self, dt_ms: f32, now: Instant) {
        self.interp.tick(&mut self.world, dt_ms);
        self.expire_catch_window(now);
    }

    /// Fails the fishing session if its countdown ran out, queuing `catchFail`.
    pub fn expire_catch_window(&mut self, now: Instant) -> bool {
        let from = self.fishing.state();
        let Some(msg) = self.fishing.poll_timeout(now) else {
            return false;
        };
        self.outbox.push_back(msg);
        self.fishing_transition(from);
        true
    }

    /// When the running catch countdown ends, if any.
    pub fn catch_deadline(&self) -> Option<Instant> {
        self.fishing.deadline()
    }

    pub fn take_outbox(&mut self) -> Vec<ClientMsg> {
        self.outbox.drain(..).collect()
    }

    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        std::mem::take(&mut self.events)
    }

    /// Executes a console command and returns lines to print.
    pub fn exec_console(&mut self, line: &str) -> Vec<String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        match tokens[0] {
            key @ ("w" | "a" | "s" | "d") => {
                // The single-letter form is a key press.
                let key = key.chars().next().unwrap_or_default();
                if !self.press_key(key) {
                    return vec!["Can't move right now".to_string()];
                }
                Vec::new()
            }
            "move" => {
                let Some(direction) = tokens.get(1).and_then(|d| d.parse::<Direction>().ok())
                else {
                    return vec!["Usage: move <up|down|left|right>".to_string()];
                };
                if !self.submit_move(direction) {
                    return vec!["Can't move while fishing".to_string()];
                }
                Vec::new()
            }
            "fish" => {
                self.submit_fish();
                Vec::new()
            }
            "catch" => {
                if !self.submit_catch_attempt() {
                    return vec!["Nothing on the line".to_string()];
                }
                Vec::new()
            }
            "cancel" => {
                if !self.cancel_fishing() {
                    return vec!["Not waiting for a bite".to_string()];
                }
                vec!["Reeled in".to_string()]
            }
            "ack" => {
                self.acknowledge_fishing();
                Vec::new()
            }
            "sell" => {
                if tokens.len() < 2 {
                    return vec!["Usage: sell <name>".to_string()];
                }
                self.submit_sell(&tokens[1..].join(" "));
                Vec::new()
            }
            "buy" => {
                let (Some(price), true) = (
                    tokens.last().and_then(|p| p.parse::<i64>().ok()),
                    tokens.len() >= 3,
                ) else {
                    return vec!["Usage: buy <name> <price>".to_string()];
                };
                let item = InventoryItem {
                    kind: "Item".to_string(),
                    name: tokens[1..tokens.len() - 1].join(" "),
                    quantity: 1,
                    value: price,
                    img: String::new(),
                };
                self.submit_buy(item);
                Vec::new()
            }
            "inventory" => {
                let me = self.world.local_player();
                if me.inventory.is_empty() {
                    return vec!["Inventory is empty".to_string()];
                }
                me.inventory
                    .iter()
                    .map(|i| {
                        format!(
                            "{} x{} ({}, ${} each, ${} total)",
                            i.name,
                            i.quantity,
                            i.kind,
                            i.value,
                            i.total_value()
                        )
                    })
                    .collect()
            }
            "status" => {
                let me = self.world.local_player();
                let (width, height) = self.world.dimensions();
                let mut out = Vec::new();
                out.push(format!("Connected: {}", self.connected));
                out.push(format!("Player: {}", me.id));
                out.push(format!(
                    "Position: ({}, {}) facing {}{}",
                    me.x,
                    me.y,
                    me.direction,
                    if me.facing_water { ", water ahead" } else { "" }
                ));
                out.push(format!("Balance: {}", me.balance));
                out.push(format!("Map: {width}x{height}"));
                out.push(format!("Players: {}", self.world.player_count()));
                out.push(format!("Fishing: {}", self.fishing.state()));
                out.push(format!("Pending trades: {}", self.market.pending().len()));
                out
            }
            "help" => vec![
                "w|a|s|d, move <dir>, fish, catch, cancel, ack".to_string(),
                "sell <name>, buy <name> <price>, inventory, status, quit".to_string(),
            ],
            other => vec![format!("Unknown command: {other}")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isle_shared::map::Visibility;
    use serde_json::json;
    use std::time::Duration;

    fn client() -> GameClient {
        let mut c = GameClient::new(PlayerId::new("me"), &ClientConfig::default());
        c.on_connected();
        c.drain_events();
        c
    }

    fn game_state(me_x: i32, facing_water: bool) -> String {
        let row: Vec<_> = (0..12)
            .map(|x| json!({"type": if x == 0 { 0 } else { 2 }, "visibility": "unexplored"}))
            .collect();
        let rows: Vec<_> = (0..12).map(|_| row.clone()).collect();
        json!({
            "type": "gameState",
            "data": {
                "gameMap": rows,
                "players": [
                    {"id": "me", "x": me_x, "y": 5, "direction": "left"},
                    {"id": "other", "x": 2, "y": 2, "direction": "down"}
                ],
                "inventory": [{"type":"Fish","name":"Trout","quantity":2,"value":15,"img":"t.png"}]
            },
            "player": {"id": "me", "x": me_x, "y": 5, "direction": "left",
                       "facingWater": facing_water, "balance": 15, "inventory": null}
        })
        .to_string()
    }

    fn fishing_event(event: &str) -> String {
        json!({"type": "fishingEvent", "data": {"event": event, "playerId": "me",
            "fish": {"type":"Fish","name":"Koi","rarity":20,"value":80,"img":"k.png"}}})
        .to_string()
    }

    #[test]
    fn game_state_populates_the_world() {
        let mut c = client();
        assert!(c.handle_frame(&game_state(5, false), Instant::now()));

        let me = c.world().local_player();
        assert_eq!((me.x, me.y), (5, 5));
        assert_eq!(me.balance, 15);
        assert_eq!(me.inventory.len(), 1);
        assert_eq!(c.world().player_count(), 2);
        assert_eq!(c.world().tile_at(5, 5).unwrap().visibility, Visibility::Visible);
        assert_eq!(c.world().tile_at(11, 11).unwrap().visibility, Visibility::Unseen);

        let events = c.drain_events();
        assert!(events.contains(&ClientEvent::MapReplaced {
            width: 12,
            height: 12
        }));
        assert!(events.contains(&ClientEvent::PlayersChanged { count: 2 }));
        assert!(events.contains(&ClientEvent::BalanceChanged { balance: 15 }));
    }

    #[test]
    fn bad_frames_change_nothing() {
        let mut c = client();
        c.handle_frame(&game_state(5, false), Instant::now());
        c.drain_events();

        assert!(!c.handle_frame("{oops", Instant::now()));
        assert!(!c.handle_frame(r#"{"type":"teleport","data":{}}"#, Instant::now()));
        assert!(c.drain_events().is_empty());
        assert_eq!(c.world().player_count(), 2);
    }

    #[test]
    fn join_carries_last_known_position() {
        let mut c = client();
        c.handle_frame(&game_state(3, false), Instant::now());
        assert_eq!(
            c.join_message(),
            ClientMsg::join(&PlayerId::new("me"), 3, 5, Direction::Left)
        );
    }

    #[test]
    fn player_left_and_new_player() {
        let mut c = client();
        let now = Instant::now();
        c.handle_frame(&game_state(5, false), now);
        c.handle_frame(r#"{"type":"playerLeft","data":"other"}"#, now);
        assert_eq!(c.world().player_count(), 1);
        c.handle_frame(r#"{"type":"newPlayer","player":{"id":"new","x":1,"y":1}}"#, now);
        c.handle_frame(r#"{"type":"newPlayer","player":{"id":"new","x":1,"y":1}}"#, now);
        assert_eq!(c.world().player_count(), 2);
    }

    #[test]
    fn full_fishing_round_with_local_timeout() {
        let mut c = client();
        let t0 = Instant::now();
        c.handle_frame(&game_state(1, true), t0);
        c.drain_events();

        assert!(c.submit_fish());
        assert_eq!(
            c.take_outbox(),
            vec![ClientMsg::fish(&PlayerId::new("me"), Direction::Left)]
        );
        // Movement is blocked for the whole session.
        assert!(!c.submit_move(Direction::Right));
        assert!(c.take_outbox().is_empty());

        c.handle_frame(&fishing_event("start"), t0);
        assert_eq!(c.catch_deadline(), Some(t0 + Duration::from_millis(3000)));

        c.frame(16.0, t0 + Duration::from_millis(2999));
        assert!(c.take_outbox().is_empty());
        c.frame(16.0, t0 + Duration::from_millis(3000));
        assert_eq!(c.take_outbox(), vec![ClientMsg::catch_fail(&PlayerId::new("me"))]);
        assert_eq!(c.fishing().state(), FishingState::Failed);
        assert_eq!(c.catch_deadline(), None);

        let events = c.drain_events();
        assert!(events.contains(&ClientEvent::Fishing {
            from: FishingState::CatchWindowOpen,
            to: FishingState::Failed,
            fish: None,
        }));

        // The server's session is still running: no move, no new cast.
        assert!(!c.submit_move(Direction::Right));
        assert!(!c.submit_fish());
        assert!(c.take_outbox().is_empty());

        // Its own fail arrives and releases the player.
        c.handle_frame(&fishing_event("fail"), t0 + Duration::from_millis(3050));
        assert!(c.submit_move(Direction::Right));
        assert!(c.submit_fish());
        assert_eq!(c.fishing().state(), FishingState::AwaitingBite);
    }

    #[test]
    fn catch_key_then_server_catch() {
        let mut c = client();
        let t0 = Instant::now();
        c.handle_frame(&game_state(1, true), t0);
        c.submit_fish();
        c.handle_frame(&fishing_event("start"), t0);
        c.take_outbox();

        assert!(c.press_key(' '));
        assert!(!c.press_key(' '));
        assert_eq!(
            c.take_outbox(),
            vec![ClientMsg::catch_attempt(&PlayerId::new("me"))]
        );

        c.drain_events();
        c.handle_frame(&fishing_event("catch"), t0);
        let events = c.drain_events();
        let Some(ClientEvent::Fishing { to, fish, .. }) = events.first() else {
            panic!("expected a fishing event, got {events:?}");
        };
        assert_eq!(*to, FishingState::Caught);
        assert_eq!(fish.as_ref().map(|f| f.name.as_str()), Some("Koi"));

        // Panel stays up until acknowledged.
        assert!(!c.press_key('w'));
        assert!(c.acknowledge_fishing());
        assert!(c.press_key('w'));
    }

    #[test]
    fn fishing_away_from_water_is_a_notice() {
        let mut c = client();
        c.handle_frame(&game_state(5, false), Instant::now());
        c.drain_events();
        assert!(!c.submit_fish());
        assert!(c.take_outbox().is_empty());
        assert!(matches!(c.drain_events().as_slice(), [ClientEvent::Notice(_)]));
    }

    #[test]
    fn buy_over_balance_sends_nothing() {
        let mut c = client();
        c.handle_frame(&game_state(5, false), Instant::now());
        c.drain_events();

        let out = c.exec_console("buy Golden Rod 20");
        assert!(out.is_empty());
        assert!(c.take_outbox().is_empty());
        assert_eq!(c.world().local_player().balance, 15);
        assert!(matches!(c.drain_events().as_slice(), [ClientEvent::Notice(_)]));
    }

    #[test]
    fn sell_settles_on_server_events() {
        let mut c = client();
        let now = Instant::now();
        c.handle_frame(&game_state(5, false), now);
        c.exec_console("sell Trout");
        assert_eq!(c.take_outbox().len(), 1);
        assert_eq!(c.market().pending().len(), 1);

        c.handle_frame(r#"{"type":"inventoryUpdate","data":null}"#, now);
        c.handle_frame(
            r#"{"type":"playerUpdate","player":{"id":"me","x":5,"y":5,"direction":"left","balance":45}}"#,
            now,
        );
        c.handle_frame(
            r#"{"type":"sellEvent","data":{"event":"itemSold","playerId":"me",
                "item":{"type":"Fish","name":"Trout","quantity":2,"value":15,"img":"t.png"}}}"#,
            now,
        );
        assert!(c.market().pending().is_empty());
        assert_eq!(c.world().local_player().balance, 45);
        assert!(c.world().local_player().inventory.is_empty());
    }

    #[test]
    fn rejected_sell_can_be_sent_again() {
        let mut c = client();
        let now = Instant::now();
        c.handle_frame(&game_state(5, false), now);
        assert!(c.submit_sell("Trout"));
        c.take_outbox();

        c.handle_frame(r#"{"type":"error","data":"insufficient quantity to sell"}"#, now);
        assert!(c.submit_sell("Trout"));
        assert_eq!(c.take_outbox().len(), 1);

        let rod = InventoryItem {
            kind: "Rod".into(),
            name: "Rod".into(),
            quantity: 1,
            value: 10,
            img: String::new(),
        };
        assert!(c.submit_buy(rod.clone()));
        assert!(c.submit_buy(rod));
        assert_eq!(c.take_outbox().len(), 2);
    }

    #[test]
    fn server_error_becomes_a_notice() {
        let mut c = client();
        c.handle_frame(r#"{"type":"error","data":"Invalid move"}"#, Instant::now());
        assert_eq!(
            c.drain_events(),
            vec![ClientEvent::Notice("Invalid move".to_string())]
        );
    }

    #[test]
    fn disconnect_drops_session_state() {
        let mut c = client();
        let t0 = Instant::now();
        c.handle_frame(&game_state(1, true), t0);
        c.submit_fish();
        c.handle_frame(&fishing_event("start"), t0);
        c.drain_events();

        c.on_disconnected();
        assert_eq!(c.fishing().state(), FishingState::Idle);
        assert_eq!(c.catch_deadline(), None);
        assert!(c.take_outbox().is_empty());
        assert_eq!(c.drain_events().last(), Some(&ClientEvent::Disconnected));
        // Position survives for the next join.
        assert_eq!(c.world().local_player().x, 1);
    }

    #[test]
    fn console_move_and_status() {
        let mut c = client();
        assert!(c.exec_console("move left").is_empty());
        assert!(c.exec_console("d").is_empty());
        assert_eq!(c.take_outbox().len(), 2);
        assert_eq!(c.exec_console("move sideways").len(), 1);

        let status = c.exec_console("status");
        assert!(status.iter().any(|l| l == "Fishing: idle"));
        assert_eq!(c.exec_console(""), Vec::<String>::new());
    }
}
