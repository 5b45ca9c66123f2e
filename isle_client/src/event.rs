//! State-change notifications for the presentation layer.

use isle_shared::protocol::{Fish, InventoryItem};

use crate::fishing::FishingState;
use crate::market::TradeKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    /// A `gameState` replaced the map.
    MapReplaced { width: usize, height: usize },
    PlayersChanged { count: usize },
    InventoryChanged,
    BalanceChanged { balance: i64 },
    Fishing {
        from: FishingState,
        to: FishingState,
        /// Set when the session ended in a catch.
        fish: Option<Fish>,
    },
    TradeSettled { kind: TradeKind, item: InventoryItem },
    /// Something to show the player: a local rejection or a server error.
    Notice(String),
    /// A line of console command output.
    Output(String),
}
