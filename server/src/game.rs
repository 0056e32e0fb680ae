//! Authoritative world state: players and coins.
//!
//! Both collections are sharded concurrent maps. Every mutation of a record
//! happens while holding that record's shard lock, so `snapshot` never sees
//! a player or coin with a mix of old and new fields, and updates to
//! different players do not serialize behind one global lock.

use crate::utils::coin_id;
use dashmap::DashMap;
use log::{debug, info};
use rand::Rng;
use shared::{
    truncate_chars, Coin, PlayerView, WorldBounds, DEFAULT_BUBBLE_RADIUS, MAX_BUBBLE_RADIUS,
    MAX_NAME_CHARS, MIN_BUBBLE_RADIUS, PICKUP_RADIUS,
};

/// Margin kept between seeded coins and the world edges.
const COIN_MARGIN: f64 = 40.0;
/// Coins never spawn closer than this to the top of the world.
const COIN_TOP: f64 = 80.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub bubble_radius: f64,
}

impl Player {
    pub fn new(id: impl Into<String>, bounds: &WorldBounds) -> Self {
        let (x, y) = bounds.center();
        Self {
            id: id.into(),
            name: String::new(),
            x,
            y,
            bubble_radius: DEFAULT_BUBBLE_RADIUS,
        }
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            name: self.name.clone(),
            x: self.x,
            y: self.y,
            bubble_radius: self.bubble_radius,
        }
    }
}

/// Fields a client may change on its own player. `None` leaves the
/// current value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerPatch {
    pub name: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub bubble_radius: Option<f64>,
}

impl PlayerPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.x.is_none() && self.y.is_none() && self.bubble_radius.is_none()
    }
}

/// Read-consistent copy of the world used for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub players: Vec<PlayerView>,
    pub coins: Vec<Coin>,
}

pub struct GameState {
    bounds: WorldBounds,
    players: DashMap<String, Player>,
    coins: DashMap<String, Coin>,
    /// Seed order, used to serialize coins deterministically
    coin_order: Vec<String>,
}

impl GameState {
    /// Creates a world with `coin_count` coins at random positions.
    pub fn new(bounds: WorldBounds, coin_count: usize) -> Self {
        let coins = seed_coins(&bounds, coin_count, &mut rand::thread_rng());
        Self::with_coins(bounds, coins)
    }

    pub fn with_coins(bounds: WorldBounds, coins: Vec<Coin>) -> Self {
        let coin_order = coins.iter().map(|coin| coin.id.clone()).collect();
        let coins = coins
            .into_iter()
            .map(|coin| (coin.id.clone(), coin))
            .collect();

        Self {
            bounds,
            players: DashMap::new(),
            coins,
            coin_order,
        }
    }

    pub fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    pub fn create_player(&self, id: &str) -> Player {
        let player = Player::new(id, &self.bounds);
        self.players.insert(id.to_string(), player.clone());

        info!("Added player {} at ({}, {})", id, player.x, player.y);
        player
    }

    pub fn remove_player(&self, id: &str) -> Option<Player> {
        let removed = self.players.remove(id).map(|(_, player)| player);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    pub fn player(&self, id: &str) -> Option<Player> {
        self.players.get(id).map(|player| player.clone())
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Applies the valid fields of `patch` to a player.
    ///
    /// Coordinates are clamped to the world, the bubble radius to
    /// `[MIN_BUBBLE_RADIUS, MAX_BUBBLE_RADIUS]` and the name to
    /// `MAX_NAME_CHARS` characters. Non-finite numbers are ignored.
    /// Returns false if the player does not exist.
    pub fn update_player(&self, id: &str, patch: PlayerPatch) -> bool {
        let mut player = match self.players.get_mut(id) {
            Some(player) => player,
            None => return false,
        };

        if let Some(x) = patch.x.filter(|x| x.is_finite()) {
            player.x = self.bounds.clamp_x(x);
        }
        if let Some(y) = patch.y.filter(|y| y.is_finite()) {
            player.y = self.bounds.clamp_y(y);
        }
        if let Some(radius) = patch.bubble_radius.filter(|r| r.is_finite()) {
            player.bubble_radius = radius.clamp(MIN_BUBBLE_RADIUS, MAX_BUBBLE_RADIUS);
        }
        if let Some(name) = patch.name {
            player.name = truncate_chars(&name, MAX_NAME_CHARS);
        }

        true
    }

    /// Marks a coin as taken if the player currently stands close enough.
    ///
    /// Uses the player's last accepted server-side position. The coin's
    /// entry lock is held across the check and the write, so concurrent
    /// attempts on one coin succeed at most once.
    pub fn try_collect(&self, coin_id: &str, player_id: &str) -> bool {
        let (px, py) = match self.players.get(player_id) {
            Some(player) => (player.x, player.y),
            None => return false,
        };

        let mut coin = match self.coins.get_mut(coin_id) {
            Some(coin) => coin,
            None => return false,
        };

        if coin.taken {
            return false;
        }

        let distance_squared = coin.distance_squared_to(px, py);
        if distance_squared < PICKUP_RADIUS * PICKUP_RADIUS {
            coin.taken = true;
            info!("Player {} collected coin {}", player_id, coin_id);
            true
        } else {
            debug!(
                "Player {} too far from coin {} (d2 = {:.1})",
                player_id, coin_id, distance_squared
            );
            false
        }
    }

    pub fn coins(&self) -> Vec<Coin> {
        self.coin_order
            .iter()
            .filter_map(|id| self.coins.get(id).map(|coin| coin.clone()))
            .collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut players: Vec<PlayerView> = self
            .players
            .iter()
            .map(|entry| entry.value().view())
            .collect();
        // p2 before p10
        players.sort_by(|a, b| a.id.len().cmp(&b.id.len()).then_with(|| a.id.cmp(&b.id)));

        Snapshot {
            players,
            coins: self.coins(),
        }
    }
}

/// Places `count` coins above the ground line, away from the edges.
pub fn seed_coins<R: Rng>(bounds: &WorldBounds, count: usize, rng: &mut R) -> Vec<Coin> {
    let max_x = (bounds.w - COIN_MARGIN).max(COIN_MARGIN);
    let max_y = (bounds.ground_y - COIN_MARGIN).max(COIN_TOP);

    (0..count)
        .map(|index| {
            let x = rng.gen_range(COIN_MARGIN..=max_x);
            let y = rng.gen_range(COIN_TOP..=max_y);
            Coin::new(coin_id(index), x, y)
        })
        .collect()
}
