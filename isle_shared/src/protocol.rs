//! Wire protocol.
//!
//! Every message is one UTF-8 JSON object carried by one WebSocket frame.
//! Both directions use a `type` discriminator:
//! - Outbound: `{ type, player: { id, .. }, data? }`
//! - Inbound: `{ type, data?, player? }`
//!
//! There are no acknowledgements and no sequence numbers. Messages are
//! fire-and-forget and applied in delivery order.

use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};

use crate::map::TileMap;

/// Stable player identity, generated once per profile and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        PlayerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Facing direction on the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Grid offset of one step in this direction. `y` grows downwards.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| format!("unknown direction {s:?}"))
    }
}

/// An inventory stack.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryItem {
    /// Item category, e.g. `"Fish"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub quantity: u32,
    /// Unit price.
    pub value: i64,
    /// Asset reference.
    pub img: String,
}

impl InventoryItem {
    pub fn is_fish(&self) -> bool {
        self.kind == "Fish"
    }

    /// Value of the whole stack.
    pub fn total_value(&self) -> i64 {
        self.value.saturating_mul(i64::from(self.quantity))
    }
}

/// Descriptor of a caught fish.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fish {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    /// Catch weight; lower is rarer.
    pub rarity: i32,
    pub value: i64,
    pub img: String,
}

/// Display bucket for [`Fish::rarity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RarityTier {
    Common,
    Uncommon,
    Rare,
    UltraRare,
}

impl RarityTier {
    pub fn from_rarity(rarity: i32) -> Self {
        if rarity >= 60 {
            RarityTier::Common
        } else if rarity >= 30 {
            RarityTier::Uncommon
        } else if rarity >= 15 {
            RarityTier::Rare
        } else {
            RarityTier::UltraRare
        }
    }
}

impl fmt::Display for RarityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RarityTier::Common => "Common",
            RarityTier::Uncommon => "Uncommon",
            RarityTier::Rare => "Rare",
            RarityTier::UltraRare => "Ultra-Rare",
        })
    }
}

impl Fish {
    pub fn tier(&self) -> RarityTier {
        RarityTier::from_rarity(self.rarity)
    }
}

/// Authoritative player record as the server sends it.
///
/// Missing fields take their zero value: an update always overwrites every
/// field, so an omitted field resets rather than keeps the previous value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerData {
    pub id: PlayerId,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default, deserialize_with = "lenient_direction")]
    pub direction: Direction,
    #[serde(default)]
    pub facing_water: bool,
    #[serde(default)]
    pub balance: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub inventory: Vec<InventoryItem>,
}

impl PlayerData {
    pub fn new(id: PlayerId, x: i32, y: i32) -> Self {
        Self {
            id,
            x,
            y,
            direction: Direction::default(),
            facing_water: false,
            balance: 0,
            inventory: Vec::new(),
        }
    }
}

/// Payload of a `gameState` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateData {
    #[serde(rename = "gameMap")]
    pub game_map: TileMap,
    #[serde(default, deserialize_with = "null_as_default")]
    pub players: Vec<PlayerData>,
    /// Inventory of the receiving player, if the server hydrated it.
    #[serde(default)]
    pub inventory: Option<Vec<InventoryItem>>,
}

/// Sub-events of `fishingEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum FishingEvent {
    /// A fish bit; the catch window opens.
    Start {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },
    Catch {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
        fish: Fish,
    },
    Fail {
        #[serde(rename = "playerId")]
        player_id: PlayerId,
    },
}

impl FishingEvent {
    pub fn player_id(&self) -> &PlayerId {
        match self {
            FishingEvent::Start { player_id }
            | FishingEvent::Catch { player_id, .. }
            | FishingEvent::Fail { player_id } => player_id,
        }
    }
}

/// Which side of the market an event settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarketEventKind {
    ItemSold,
    ItemBought,
}

/// Payload of `sellEvent` / `buyEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketEvent {
    #[serde(rename = "event")]
    pub kind: MarketEventKind,
    #[serde(rename = "playerId")]
    pub player_id: PlayerId,
    pub item: InventoryItem,
    /// Authoritative balance after settlement, when the server includes it.
    #[serde(default)]
    pub balance: Option<i64>,
    /// Authoritative inventory after settlement, when the server includes it.
    #[serde(default)]
    pub inventory: Option<Vec<InventoryItem>>,
}

/// Server -> client messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMsg {
    /// Full player list and map; `player` is the receiver's own full record.
    GameState {
        data: GameStateData,
        #[serde(default)]
        player: Option<PlayerData>,
    },
    PlayerUpdate {
        player: PlayerData,
    },
    NewPlayer {
        player: PlayerData,
    },
    /// `data` is the departing player's id.
    PlayerLeft {
        data: PlayerId,
    },
    FishingEvent {
        data: FishingEvent,
    },
    InventoryUpdate {
        #[serde(default, deserialize_with = "null_as_default")]
        data: Vec<InventoryItem>,
    },
    SellEvent {
        data: MarketEvent,
    },
    BuyEvent {
        data: MarketEvent,
    },
    /// Server-side rejection such as an invalid move.
    Error {
        #[serde(default)]
        data: String,
    },
}

/// Discriminator values accepted inbound.
pub const SERVER_KINDS: [&str; 9] = [
    "gameState",
    "playerUpdate",
    "newPlayer",
    "playerLeft",
    "fishingEvent",
    "inventoryUpdate",
    "sellEvent",
    "buyEvent",
    "error",
];

impl ServerMsg {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMsg::GameState { .. } => "gameState",
            ServerMsg::PlayerUpdate { .. } => "playerUpdate",
            ServerMsg::NewPlayer { .. } => "newPlayer",
            ServerMsg::PlayerLeft { .. } => "playerLeft",
            ServerMsg::FishingEvent { .. } => "fishingEvent",
            ServerMsg::InventoryUpdate { .. } => "inventoryUpdate",
            ServerMsg::SellEvent { .. } => "sellEvent",
            ServerMsg::BuyEvent { .. } => "buyEvent",
            ServerMsg::Error { .. } => "error",
        }
    }
}

/// `player` field of outbound messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub id: PlayerId,
}

/// `player` field of the `join` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPlayer {
    pub id: PlayerId,
    pub x: i32,
    pub y: i32,
    pub direction: Direction,
}

/// `data` of an `action` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "actionType", rename_all = "camelCase")]
pub enum Action {
    Fish { direction: Direction },
    SellItem { item: InventoryItem },
    BuyItem { item: InventoryItem },
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMsg {
    /// Sent first on every (re)connect.
    Join { player: JoinPlayer },
    Move { player: PlayerRef, data: Direction },
    Action { player: PlayerRef, data: Action },
    CatchAttempt { player: PlayerRef },
    /// The local catch countdown ran out.
    CatchFail { player: PlayerRef },
}

impl ClientMsg {
    pub fn join(id: &PlayerId, x: i32, y: i32, direction: Direction) -> Self {
        ClientMsg::Join {
            player: JoinPlayer {
                id: id.clone(),
                x,
                y,
                direction,
            },
        }
    }

    pub fn move_to(id: &PlayerId, direction: Direction) -> Self {
        ClientMsg::Move {
            player: PlayerRef { id: id.clone() },
            data: direction,
        }
    }

    pub fn fish(id: &PlayerId, direction: Direction) -> Self {
        ClientMsg::Action {
            player: PlayerRef { id: id.clone() },
            data: Action::Fish { direction },
        }
    }

    pub fn sell(id: &PlayerId, item: InventoryItem) -> Self {
        ClientMsg::Action {
            player: PlayerRef { id: id.clone() },
            data: Action::SellItem { item },
        }
    }

    pub fn buy(id: &PlayerId, item: InventoryItem) -> Self {
        ClientMsg::Action {
            player: PlayerRef { id: id.clone() },
            data: Action::BuyItem { item },
        }
    }

    pub fn catch_attempt(id: &PlayerId) -> Self {
        ClientMsg::CatchAttempt {
            player: PlayerRef { id: id.clone() },
        }
    }

    pub fn catch_fail(id: &PlayerId) -> Self {
        ClientMsg::CatchFail {
            player: PlayerRef { id: id.clone() },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMsg::Join { .. } => "join",
            ClientMsg::Move { .. } => "move",
            ClientMsg::Action { .. } => "action",
            ClientMsg::CatchAttempt { .. } => "catchAttempt",
            ClientMsg::CatchFail { .. } => "catchFail",
        }
    }
}

/// Why an inbound frame was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not JSON, no string `type`, or a payload that does not fit its kind.
    Malformed(String),
    /// Well-formed envelope with a discriminator this client does not know.
    UnknownKind(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Malformed(reason) => write!(f, "malformed message: {reason}"),
            ProtocolError::UnknownKind(kind) => write!(f, "unknown message type {kind:?}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// Parses and validates one inbound frame.
pub fn decode_server(text: &str) -> Result<ServerMsg, ProtocolError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing string `type`".to_string()))?
        .to_string();
    if !SERVER_KINDS.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownKind(kind));
    }
    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(format!("{kind}: {e}")))
}

/// Serializes one outbound message.
pub fn encode_client(msg: &ClientMsg) -> anyhow::Result<String> {
    serde_json::to_string(msg).with_context(|| format!("serialize {} message", msg.kind()))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// The server echoes back whatever direction string the client joined with,
// including an empty one for fresh records.
fn lenient_direction<'de, D>(deserializer: D) -> Result<Direction, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|s| s.parse().ok())
        .unwrap_or_default())
}
