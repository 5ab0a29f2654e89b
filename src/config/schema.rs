//! Configuration schema.
//!
//! Every section and field has a default, so an empty document (or no file
//! at all) yields the stock three-sided game on port 8087.

use std::path::PathBuf;
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Root
// ============================================================================

/// Complete game server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameConfig {
    /// Listener settings
    pub server: ServerSection,
    /// Round timing
    pub round: RoundConfig,
    /// Battle resolution
    pub battle: BattleConfig,
    /// Competing sides, in display order
    pub sides: Vec<SideConfig>,
    /// Player defaults
    pub players: PlayerConfig,
    /// Audit ledger
    pub ledger: LedgerConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            round: RoundConfig::default(),
            battle: BattleConfig::default(),
            sides: default_sides(),
            players: PlayerConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl GameConfig {
    /// Side names in configured order.
    #[must_use]
    pub fn side_names(&self) -> Vec<String> {
        self.sides.iter().map(|s| s.name.clone()).collect()
    }
}

fn default_sides() -> Vec<SideConfig> {
    [("gold", 2), ("silver", 4), ("bronze", 5)]
        .into_iter()
        .map(|(name, slots)| SideConfig {
            name: name.to_string(),
            health: DEFAULT_HEALTH,
            slots,
        })
        .collect()
}

// ============================================================================
// Sections
// ============================================================================

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// `host:port` to listen on
    pub bind: String,
    /// Interval between WebSocket pings
    #[serde(with = "duration_str")]
    pub heartbeat: Duration,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8087".to_string(),
            heartbeat: Duration::from_secs(30),
        }
    }
}

/// Round timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoundConfig {
    /// Length of the betting window in whole seconds
    pub betting_seconds: u32,
    /// Pause between betting closing and the battle starting
    #[serde(with = "duration_str")]
    pub start_delay: Duration,
    /// Seconds to wait after a result before starting the next round
    /// automatically; `None` waits for an explicit start
    pub cooldown: Option<u32>,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            betting_seconds: 3,
            start_delay: Duration::from_secs(1),
            cooldown: None,
        }
    }
}

/// How a battle is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Sides trade weighted random hits until one is left standing
    #[default]
    Attrition,
    /// A shuffled slot sequence is revealed up to a target index
    SlotReveal,
}

/// Battle resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BattleConfig {
    /// Resolution strategy
    pub strategy: StrategyKind,
    /// Delay between attrition ticks
    #[serde(with = "duration_str")]
    pub tick_interval: Duration,
    /// Inclusive damage range per hit
    pub damage: DamageRange,
    /// Time over which each slot reveal case is spread
    #[serde(with = "duration_str")]
    pub reveal_window: Duration,
    /// Slot reveal cases played back to back in one round. Empty means a
    /// single case built from each side's `slots`.
    pub cases: Vec<RevealCase>,
    /// Fixed RNG seed for reproducible rounds
    pub seed: Option<u64>,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Attrition,
            tick_interval: Duration::from_secs(1),
            damage: DamageRange::default(),
            reveal_window: Duration::from_secs(3),
            cases: Vec::new(),
            seed: None,
        }
    }
}

/// Sequence entry for a filler slot. It belongs to no side, so a case whose
/// target lands on one has no winner.
pub const FILLER_SLOT: &str = "empty";

/// One slot reveal case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RevealCase {
    /// Label announced with the case
    pub key: String,
    /// Slots per side; sides left out get none
    #[serde(default)]
    pub slots: IndexMap<String, u32>,
    /// Filler slots that belong to no side
    #[serde(default)]
    pub filler: u32,
}

impl RevealCase {
    /// Total sequence length.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.slots.values().map(|n| u64::from(*n)).sum::<u64>() + u64::from(self.filler)
    }

    /// `true` when the case deals no slot at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Inclusive damage bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DamageRange {
    /// Smallest hit
    pub min: u32,
    /// Largest hit
    pub max: u32,
}

impl Default for DamageRange {
    fn default() -> Self {
        Self { min: 8, max: 20 }
    }
}

/// Health every side starts a round with unless configured otherwise.
pub const DEFAULT_HEALTH: u32 = 100;

/// One competing side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SideConfig {
    /// Lower-case identifier used in bets
    pub name: String,
    /// Starting health (attrition)
    #[serde(default = "default_health")]
    pub health: u32,
    /// Entries in the reveal sequence (slot reveal)
    #[serde(default)]
    pub slots: u32,
}

const fn default_health() -> u32 {
    DEFAULT_HEALTH
}

/// Player defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayerConfig {
    /// Balance granted to each new player
    pub starting_balance: f64,
    /// Display names are truncated to this many characters
    pub max_name_len: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            starting_balance: 1000.0,
            max_name_len: 24,
        }
    }
}

/// Audit ledger settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Journal round events at all
    pub enabled: bool,
    /// Newline-delimited block file
    pub path: PathBuf,
    /// Batcher period
    #[serde(with = "duration_str")]
    pub block_interval: Duration,
    /// Upper bound on transactions per block
    pub max_tx_per_block: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./data/blocks.jsonl"),
            block_interval: Duration::from_secs(3),
            max_tx_per_block: 500,
        }
    }
}

// ============================================================================
// Duration encoding
// ============================================================================

/// `Duration` as a human string such as `"1s"` or `"250ms"`.
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(D::Error::custom)
    }
}
