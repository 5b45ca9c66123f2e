//! World model.
//!
//! Owns the tile map and the player set for one session. The local player is
//! stored apart from remote players so it can never go missing: every
//! `gameState` re-anchors it by id instead of keeping a stale copy around.
//!
//! Authoritative fields are only ever written from server data. The render
//! position is written by the interpolator and read by nothing else.

use bitflags::bitflags;
use isle_shared::{
    map::{Tile, TileMap},
    protocol::{Direction, InventoryItem, PlayerData, PlayerId},
};
use tracing::{debug, warn};

use crate::visibility;

bitflags! {
    /// Parts of the world touched by one operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Changes: u8 {
        const MAP = 1 << 0;
        const PLAYERS = 1 << 1;
        const INVENTORY = 1 << 2;
        const BALANCE = 1 << 3;
        /// The local player's grid position changed.
        const LOCAL_MOVED = 1 << 4;
    }
}

/// A player as seen by this client.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub x: i32,
    pub y: i32,
    pub direction: Direction,
    pub facing_water: bool,
    pub balance: i64,
    pub inventory: Vec<InventoryItem>,
    /// Drawing position; never used for game logic.
    pub render_x: f32,
    pub render_y: f32,
}

impl Player {
    pub fn new(id: PlayerId) -> Self {
        Self::from_data(PlayerData::new(id, 0, 0))
    }

    /// Builds a player from a server record; render position starts on the grid.
    pub fn from_data(data: PlayerData) -> Self {
        let mut inventory = data.inventory;
        prune_empty(&mut inventory);
        Self {
            id: data.id,
            x: data.x,
            y: data.y,
            direction: data.direction,
            facing_water: data.facing_water,
            balance: data.balance,
            inventory,
            render_x: data.x as f32,
            render_y: data.y as f32,
        }
    }

    /// Overwrites the authoritative fields. Inventory is replaced only through
    /// [`World::set_inventory`].
    fn overwrite(&mut self, data: &PlayerData) -> Changes {
        let mut changes = Changes::PLAYERS;
        if (self.x, self.y) != (data.x, data.y) {
            changes |= Changes::LOCAL_MOVED;
        }
        if self.balance != data.balance {
            changes |= Changes::BALANCE;
        }
        self.x = data.x;
        self.y = data.y;
        self.direction = data.direction;
        self.facing_water = data.facing_water;
        self.balance = data.balance;
        changes
    }

    /// Tile directly in front of the player.
    pub fn facing_tile(&self) -> (i32, i32) {
        let (dx, dy) = self.direction.offset();
        (self.x + dx, self.y + dy)
    }

    /// Inventory stack with the given name.
    pub fn item(&self, name: &str) -> Option<&InventoryItem> {
        self.inventory.iter().find(|i| i.name == name)
    }
}

fn prune_empty(inventory: &mut Vec<InventoryItem>) -> bool {
    let before = inventory.len();
    inventory.retain(|i| i.quantity > 0);
    inventory.len() != before
}

/// Session state: map, players, local identity.
#[derive(Debug, Clone)]
pub struct World {
    local: Player,
    remote: Vec<Player>,
    map: TileMap,
    sight_range: u32,
}

impl World {
    pub fn new(local_id: PlayerId, sight_range: u32) -> Self {
        Self {
            local: Player::new(local_id),
            remote: Vec::new(),
            map: TileMap::default(),
            sight_range,
        }
    }

    pub fn local_id(&self) -> &PlayerId {
        &self.local.id
    }

    pub fn local_player(&self) -> &Player {
        &self.local
    }

    pub fn sight_range(&self) -> u32 {
        self.sight_range
    }

    pub fn map(&self) -> &TileMap {
        &self.map
    }

    pub fn tile_at(&self, x: i32, y: i32) -> Option<&Tile> {
        self.map.get(x, y)
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.map.width(), self.map.height())
    }

    /// All players, local first, then remote players in arrival order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        std::iter::once(&self.local).chain(self.remote.iter())
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        std::iter::once(&mut self.local).chain(self.remote.iter_mut())
    }

    pub fn player_count(&self) -> usize {
        1 + self.remote.len()
    }

    pub fn player(&self, id: &PlayerId) -> Option<&Player> {
        self.players().find(|p| &p.id == id)
    }

    /// Replaces map and player set from a full `gameState`.
    ///
    /// The local player is re-anchored to the record carrying the local id.
    /// If the list lacks it, the previous local record is kept and inventory
    /// is not hydrated.
    pub fn apply_full_state(
        &mut self,
        players: Vec<PlayerData>,
        map: TileMap,
        inventory: Option<Vec<InventoryItem>>,
    ) -> Changes {
        let mut changes = Changes::MAP | Changes::PLAYERS;
        let previous_balance = self.local.balance;
        let previous_pos = (self.local.x, self.local.y);

        let mut found_local = false;
        let mut remote = Vec::with_capacity(players.len());
        for data in players {
            if data.id == self.local.id {
                if found_local {
                    warn!(id = %data.id, "Duplicate local player in game state");
                    continue;
                }
                found_local = true;
                self.local = Player::from_data(data);
            } else if remote.iter().any(|p: &Player| p.id == data.id) {
                warn!(id = %data.id, "Duplicate player in game state");
            } else {
                remote.push(Player::from_data(data));
            }
        }
        self.remote = remote;
        self.map = map;

        if found_local {
            if let Some(items) = inventory {
                changes |= self.set_inventory(items);
            }
        } else {
            debug!(id = %self.local.id, "Local player missing from game state, keeping last record");
        }

        if self.local.balance != previous_balance {
            changes |= Changes::BALANCE;
        }
        if (self.local.x, self.local.y) != previous_pos {
            changes |= Changes::LOCAL_MOVED;
        }
        self.refresh_visibility();
        changes
    }

    /// Overwrites an existing player's authoritative fields, or appends a new one.
    pub fn upsert_player(&mut self, data: &PlayerData) -> Changes {
        if data.id == self.local.id {
            let changes = self.local.overwrite(data);
            if changes.contains(Changes::LOCAL_MOVED) {
                self.refresh_visibility();
            }
            return changes;
        }

        match self.remote.iter_mut().find(|p| p.id == data.id) {
            Some(player) => player.overwrite(data) - Changes::LOCAL_MOVED - Changes::BALANCE,
            None => {
                debug!(id = %data.id, "New player");
                self.remote.push(Player::from_data(data.clone()));
                Changes::PLAYERS
            }
        }
    }

    /// Removes a remote player. Unknown ids are a no-op.
    pub fn remove_player(&mut self, id: &PlayerId) -> Changes {
        if id == &self.local.id {
            warn!(%id, "Ignoring removal of the local player");
            return Changes::empty();
        }
        let before = self.remote.len();
        self.remote.retain(|p| &p.id != id);
        if self.remote.len() == before {
            Changes::empty()
        } else {
            Changes::PLAYERS
        }
    }

    /// Replaces the local inventory, dropping empty stacks.
    pub fn set_inventory(&mut self, mut items: Vec<InventoryItem>) -> Changes {
        prune_empty(&mut items);
        if items == self.local.inventory {
            return Changes::empty();
        }
        self.local.inventory = items;
        Changes::INVENTORY
    }

    /// Sets the local balance from an authoritative value.
    pub fn set_balance(&mut self, balance: i64) -> Changes {
        if self.local.balance == balance {
            return Changes::empty();
        }
        self.local.balance = balance;
        Changes::BALANCE
    }

    /// Drops empty stacks from the local inventory.
    pub fn prune_inventory(&mut self) -> Changes {
        if prune_empty(&mut self.local.inventory) {
            Changes::INVENTORY
        } else {
            Changes::empty()
        }
    }

    /// Recomputes fog of war around the local player.
    pub fn refresh_visibility(&mut self) {
        visibility::recompute(&mut self.map, self.local.x, self.local.y, self.sight_range);
    }
}
