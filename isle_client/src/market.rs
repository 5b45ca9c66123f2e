//! Market transactions.
//!
//! Buy and sell requests are fire-and-forget: nothing local changes until the
//! server answers with `itemSold` / `itemBought` for this player. Balance and
//! inventory normally arrive through the `playerUpdate` / `inventoryUpdate`
//! the server sends next to the market event, so settlement only copies
//! authoritative values out of the event and never does arithmetic itself.

use std::fmt;

use isle_shared::protocol::{ClientMsg, InventoryItem, MarketEvent, MarketEventKind, PlayerId};
use tracing::{debug, info};

use crate::world::{Changes, Player, World};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeKind {
    Sell,
    Buy,
}

impl From<MarketEventKind> for TradeKind {
    fn from(kind: MarketEventKind) -> Self {
        match kind {
            MarketEventKind::ItemSold => TradeKind::Sell,
            MarketEventKind::ItemBought => TradeKind::Buy,
        }
    }
}

impl fmt::Display for TradeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradeKind::Sell => "sell",
            TradeKind::Buy => "buy",
        })
    }
}

/// A request waiting for its server event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub kind: TradeKind,
    pub item: InventoryItem,
}

/// Locally rejected market requests. Nothing is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    InsufficientFunds { balance: i64, price: i64 },
    NotInInventory(String),
    EmptyStack(String),
}

impl fmt::Display for MarketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketError::InsufficientFunds { balance, price } => {
                write!(f, "not enough money: have {balance}, need {price}")
            }
            MarketError::NotInInventory(name) => write!(f, "no {name} in inventory"),
            MarketError::EmptyStack(name) => write!(f, "no {name} left to sell"),
        }
    }
}

impl std::error::Error for MarketError {}

/// Outcome of a server market event for the local player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub kind: TradeKind,
    pub item: InventoryItem,
    pub changes: Changes,
}

#[derive(Debug, Clone)]
pub struct Market {
    local_id: PlayerId,
    pending: Vec<PendingTransaction>,
}

impl Market {
    pub fn new(local_id: PlayerId) -> Self {
        Self {
            local_id,
            pending: Vec::new(),
        }
    }

    pub fn pending(&self) -> &[PendingTransaction] {
        &self.pending
    }

    /// Items offered on the sell tab.
    pub fn sellable(inventory: &[InventoryItem]) -> impl Iterator<Item = &InventoryItem> {
        inventory.iter().filter(|i| i.is_fish() && i.quantity > 0)
    }

    /// Sells the whole stack named `name`.
    pub fn request_sell(&mut self, player: &Player, name: &str) -> Result<ClientMsg, MarketError> {
        let item = player
            .item(name)
            .ok_or_else(|| MarketError::NotInInventory(name.to_string()))?;
        if item.quantity == 0 {
            return Err(MarketError::EmptyStack(name.to_string()));
        }
        self.track(TradeKind::Sell, item.clone());
        debug!(item = %item.name, quantity = item.quantity, "Sell requested");
        Ok(ClientMsg::sell(&self.local_id, item.clone()))
    }

    /// Buys `item` at its listed value. Rejected locally when the balance
    /// cannot cover it; the server checks again.
    pub fn request_buy(
        &mut self,
        player: &Player,
        item: InventoryItem,
    ) -> Result<ClientMsg, MarketError> {
        if player.balance < item.value {
            return Err(MarketError::InsufficientFunds {
                balance: player.balance,
                price: item.value,
            });
        }
        self.track(TradeKind::Buy, item.clone());
        debug!(item = %item.name, price = item.value, "Buy requested");
        Ok(ClientMsg::buy(&self.local_id, item))
    }

    /// Bookkeeping only. The server may answer with a bare `error` or not at
    /// all, so an unanswered entry never blocks a later request.
    fn track(&mut self, kind: TradeKind, item: InventoryItem) {
        self.pending.push(PendingTransaction { kind, item });
    }

    /// Settles a market event. Events for other players are ignored.
    pub fn on_event(&mut self, event: &MarketEvent, world: &mut World) -> Option<Settlement> {
        if event.player_id != self.local_id {
            return None;
        }
        let kind = TradeKind::from(event.kind);
        match self
            .pending
            .iter()
            .position(|p| p.kind == kind && p.item.name == event.item.name)
        {
            Some(index) => {
                self.pending.remove(index);
            }
            None => debug!(%kind, item = %event.item.name, "Market event without a pending request"),
        }

        let mut changes = Changes::empty();
        if let Some(balance) = event.balance {
            changes |= world.set_balance(balance);
        }
        if let Some(inventory) = &event.inventory {
            changes |= world.set_inventory(inventory.clone());
        }
        changes |= world.prune_inventory();

        info!(%kind, item = %event.item.name, quantity = event.item.quantity, "Trade settled");
        Some(Settlement {
            kind,
            item: event.item.clone(),
            changes,
        })
    }

    /// Forgets pending requests; their answers are lost with the connection.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isle_shared::protocol::PlayerData;

    fn me() -> PlayerId {
        PlayerId::new("me")
    }

    fn item(kind: &str, name: &str, quantity: u32, value: i64) -> InventoryItem {
        InventoryItem {
            kind: kind.into(),
            name: name.into(),
            quantity,
            value,
            img: String::new(),
        }
    }

    fn player(balance: i64, inventory: Vec<InventoryItem>) -> Player {
        let mut data = PlayerData::new(me(), 0, 0);
        data.balance = balance;
        data.inventory = inventory;
        Player::from_data(data)
    }

    fn sold(name: &str) -> MarketEvent {
        MarketEvent {
            kind: MarketEventKind::ItemSold,
            player_id: me(),
            item: item("Fish", name, 2, 15),
            balance: None,
            inventory: None,
        }
    }

    #[test]
    fn buy_over_balance_is_rejected_without_a_message() {
        let mut market = Market::new(me());
        let p = player(15, Vec::new());
        let err = market.request_buy(&p, item("Bait", "Worms", 1, 20)).unwrap_err();
        assert_eq!(
            err,
            MarketError::InsufficientFunds {
                balance: 15,
                price: 20
            }
        );
        assert!(market.pending().is_empty());
        assert_eq!(p.balance, 15);
    }

    #[test]
    fn buy_within_balance_is_sent_and_tracked() {
        let mut market = Market::new(me());
        let p = player(20, Vec::new());
        let msg = market.request_buy(&p, item("Bait", "Worms", 1, 20)).unwrap();
        assert_eq!(msg, ClientMsg::buy(&me(), item("Bait", "Worms", 1, 20)));
        assert_eq!(market.pending().len(), 1);
        assert_eq!(market.pending()[0].kind, TradeKind::Buy);
    }

    #[test]
    fn sell_requires_the_item() {
        let mut market = Market::new(me());
        let p = player(0, vec![item("Fish", "Trout", 2, 15)]);
        assert_eq!(
            market.request_sell(&p, "Carp"),
            Err(MarketError::NotInInventory("Carp".into()))
        );
        let msg = market.request_sell(&p, "Trout").unwrap();
        assert_eq!(msg, ClientMsg::sell(&me(), item("Fish", "Trout", 2, 15)));
    }

    #[test]
    fn unanswered_request_does_not_block_a_repeat() {
        let mut market = Market::new(me());
        let mut world = World::new(me(), 5);
        let p = player(0, vec![item("Fish", "Trout", 2, 15)]);
        market.request_sell(&p, "Trout").unwrap();
        let again = market.request_sell(&p, "Trout").unwrap();
        assert_eq!(again, ClientMsg::sell(&me(), item("Fish", "Trout", 2, 15)));
        assert_eq!(market.pending().len(), 2);

        // Each answer settles one request.
        assert!(market.on_event(&sold("Trout"), &mut world).is_some());
        assert_eq!(market.pending().len(), 1);

        let rich = player(100, Vec::new());
        market.request_buy(&rich, item("Rod", "Rod", 1, 40)).unwrap();
        assert!(market.request_buy(&rich, item("Rod", "Rod", 1, 40)).is_ok());
    }

    #[test]
    fn buy_settlement_keeps_only_held_items() {
        let mut market = Market::new(me());
        let mut world = World::new(me(), 5);
        world.set_inventory(vec![item("Fish", "Trout", 1, 15)]);
        world.set_balance(50);
        let rich = player(50, Vec::new());
        market.request_buy(&rich, item("Bait", "Worms", 1, 20)).unwrap();

        let event = MarketEvent {
            kind: MarketEventKind::ItemBought,
            player_id: me(),
            item: item("Bait", "Worms", 1, 20),
            balance: Some(30),
            inventory: Some(vec![
                item("Fish", "Trout", 1, 15),
                item("Fish", "Carp", 0, 5),
                item("Bait", "Worms", 1, 20),
            ]),
        };
        let s = market.on_event(&event, &mut world).unwrap();
        assert_eq!(s.kind, TradeKind::Buy);
        assert!(market.pending().is_empty());
        assert_eq!(world.local_player().balance, 30);
        assert_eq!(
            world.local_player().inventory,
            vec![item("Fish", "Trout", 1, 15), item("Bait", "Worms", 1, 20)]
        );
        assert!(world.local_player().inventory.iter().all(|i| i.quantity > 0));
    }

    #[test]
    fn events_for_other_players_are_ignored() {
        let mut market = Market::new(me());
        let mut world = World::new(me(), 5);
        let p = player(0, vec![item("Fish", "Trout", 2, 15)]);
        market.request_sell(&p, "Trout").unwrap();

        let mut event = sold("Trout");
        event.player_id = PlayerId::new("other");
        assert_eq!(market.on_event(&event, &mut world), None);
        assert_eq!(market.pending().len(), 1);
    }

    #[test]
    fn settlement_applies_authoritative_values_only() {
        let mut market = Market::new(me());
        let mut world = World::new(me(), 5);
        world.set_inventory(vec![item("Fish", "Trout", 2, 15), item("Fish", "Carp", 1, 5)]);
        world.set_balance(10);

        // No values carried: nothing is guessed.
        let s = market.on_event(&sold("Trout"), &mut world).unwrap();
        assert_eq!(s.kind, TradeKind::Sell);
        assert_eq!(s.changes, Changes::empty());
        assert_eq!(world.local_player().balance, 10);
        assert_eq!(world.local_player().inventory.len(), 2);

        let mut event = sold("Trout");
        event.balance = Some(40);
        event.inventory = Some(vec![item("Fish", "Trout", 0, 15), item("Fish", "Carp", 1, 5)]);
        let s = market.on_event(&event, &mut world).unwrap();
        assert_eq!(s.changes, Changes::BALANCE | Changes::INVENTORY);
        assert_eq!(world.local_player().balance, 40);
        assert_eq!(world.local_player().inventory, vec![item("Fish", "Carp", 1, 5)]);
        assert!(world.local_player().inventory.iter().all(|i| i.quantity > 0));
    }

    #[test]
    fn sellable_lists_only_fish() {
        let inv = vec![
            item("Fish", "Trout", 2, 15),
            item("Bait", "Worms", 5, 1),
            item("Fish", "Koi", 1, 80),
        ];
        let names: Vec<_> = Market::sellable(&inv).map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["Trout", "Koi"]);
    }

    #[test]
    fn clear_pending_forgets_requests() {
        let mut market = Market::new(me());
        let p = player(100, Vec::new());
        market.request_buy(&p, item("Bait", "Worms", 1, 20)).unwrap();
        market.clear_pending();
        assert!(market.pending().is_empty());
    }
}
