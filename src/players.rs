//! Player registry and wallets.
//!
//! Every WebSocket connection owns exactly one player, so a [`PlayerId`]
//! also addresses that player's connection. Players outlive their
//! connection so that a bet placed before a disconnect is still settled;
//! the engine drops disconnected players when the next round starts.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PlayerConfig;
use crate::error::{BetRejection, CommandError};

const COLORS: [&str; 8] = [
    "Crimson", "Azure", "Emerald", "Amber", "Ivory", "Onyx", "Cobalt", "Scarlet",
];
const ANIMALS: [&str; 8] = [
    "Falcon", "Tiger", "Wolf", "Viper", "Panther", "Eagle", "Shark", "Dragon",
];

/// Opaque player identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(Uuid);

impl PlayerId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// A participant and their balance.
#[derive(Debug, Clone)]
pub struct Player {
    /// Identifier, also the connection address
    pub id: PlayerId,
    /// Display name
    pub name: String,
    /// Spendable balance
    pub balance: f64,
    /// Whether the owning connection is open
    pub connected: bool,
    /// Last connect or disconnect
    pub last_seen: DateTime<Utc>,
    joined: u64,
}

/// Public view of a player, as sent in `player_list`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSummary {
    /// Player id
    pub id: PlayerId,
    /// Display name
    pub name: String,
    /// Current balance
    pub balance: f64,
}

/// Balance operations the bet ledger needs. Implementations must be usable
/// synchronously from the engine task.
pub trait Wallet: Send + Sync {
    /// Current balance, `None` for an unknown player.
    fn balance(&self, player: PlayerId) -> Option<f64>;

    /// Debits `amount` if the balance covers it, atomically. Returns the new
    /// balance.
    ///
    /// # Errors
    ///
    /// `UnknownPlayer` for an unknown id, or an `InsufficientBalance` bet
    /// rejection. The balance is untouched on error.
    fn try_debit(&self, player: PlayerId, amount: f64) -> Result<f64, CommandError>;

    /// Adds `amount` and returns the new balance, `None` for an unknown
    /// player.
    fn credit(&self, player: PlayerId, amount: f64) -> Option<f64>;

    /// Display name, `None` for an unknown player.
    fn display_name(&self, player: PlayerId) -> Option<String>;
}

/// Concurrent player table.
#[derive(Debug)]
pub struct PlayerRegistry {
    players: DashMap<PlayerId, Player>,
    starting_balance: f64,
    max_name_len: usize,
    joined: AtomicU64,
}

impl PlayerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            players: DashMap::new(),
            starting_balance: config.starting_balance,
            max_name_len: config.max_name_len.max(1),
            joined: AtomicU64::new(0),
        }
    }

    /// Registers a connected player with a generated name and the starting
    /// balance.
    pub fn register(&self) -> PlayerSummary {
        let player = Player {
            id: PlayerId::new(),
            name: random_name(&mut rand::rng()),
            balance: self.starting_balance,
            connected: true,
            last_seen: Utc::now(),
            joined: self.joined.fetch_add(1, Ordering::Relaxed),
        };
        let summary = summarize(&player);
        self.players.insert(player.id, player);
        summary
    }

    /// Renames a player. The name is trimmed and truncated to the configured
    /// length. Returns the stored name.
    ///
    /// # Errors
    ///
    /// `InvalidName` if the trimmed name is empty, `UnknownPlayer` for an
    /// unknown id.
    pub fn rename(&self, id: PlayerId, name: &str) -> Result<String, CommandError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(CommandError::InvalidName);
        }
        let name: String = trimmed.chars().take(self.max_name_len).collect();
        let mut player = self.players.get_mut(&id).ok_or(CommandError::UnknownPlayer)?;
        player.name.clone_from(&name);
        Ok(name)
    }

    /// Marks the owning connection open or closed.
    pub fn set_connected(&self, id: PlayerId, connected: bool) {
        if let Some(mut player) = self.players.get_mut(&id) {
            player.connected = connected;
            player.last_seen = Utc::now();
        }
    }

    /// Returns a copy of one player.
    #[must_use]
    pub fn get(&self, id: PlayerId) -> Option<Player> {
        self.players.get(&id).map(|p| p.clone())
    }

    /// All players in join order.
    #[must_use]
    pub fn list(&self) -> Vec<PlayerSummary> {
        let mut players: Vec<(u64, PlayerSummary)> = self
            .players
            .iter()
            .map(|entry| (entry.joined, summarize(entry.value())))
            .collect();
        players.sort_by_key(|(joined, _)| *joined);
        players.into_iter().map(|(_, summary)| summary).collect()
    }

    /// Removes every player whose connection is closed. Returns how many
    /// were removed.
    ///
    /// Only call this while no bet is open, or a disconnected bettor would
    /// miss their payout.
    pub fn prune_disconnected(&self) -> usize {
        let before = self.players.len();
        self.players.retain(|_, player| player.connected);
        before.saturating_sub(self.players.len())
    }

    /// Number of players with an open connection.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }
}

impl Wallet for PlayerRegistry {
    fn balance(&self, player: PlayerId) -> Option<f64> {
        self.players.get(&player).map(|p| p.balance)
    }

    fn try_debit(&self, player: PlayerId, amount: f64) -> Result<f64, CommandError> {
        let mut entry = self
            .players
            .get_mut(&player)
            .ok_or(CommandError::UnknownPlayer)?;
        if entry.balance < amount {
            return Err(BetRejection::InsufficientBalance {
                balance: entry.balance,
                amount,
            }
            .into());
        }
        entry.balance -= amount;
        Ok(entry.balance)
    }

    fn credit(&self, player: PlayerId, amount: f64) -> Option<f64> {
        self.players.get_mut(&player).map(|mut p| {
            p.balance += amount;
            p.balance
        })
    }

    fn display_name(&self, player: PlayerId) -> Option<String> {
        self.players.get(&player).map(|p| p.name.clone())
    }
}

fn summarize(player: &Player) -> PlayerSummary {
    PlayerSummary {
        id: player.id,
        name: player.name.clone(),
        balance: player.balance,
    }
}

/// Generates a `<Color><Animal>-<NNN>` display name.
pub fn random_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let color = COLORS.choose(rng).copied().unwrap_or(COLORS[0]);
    let animal = ANIMALS.choose(rng).copied().unwrap_or(ANIMALS[0]);
    let number: u16 = rng.random_range(100..=999);
    format!("{color}{animal}-{number}")
}
