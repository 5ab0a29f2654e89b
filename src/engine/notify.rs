//! Outbound notifications.
//!
//! Every message is serialized as `{"event": <name>, "data": {...}}`.
//! Timestamps are epoch milliseconds.

use indexmap::IndexMap;
use serde::Serialize;

use super::battle::{BattleOpening, CaseOutcome, RevealPlan, Standings, TickDetail};
use super::bets::{BetsSnapshot, Settlement};
use super::round::{Phase, RoundId};
use crate::config::StrategyKind;
use crate::error::CommandError;
use crate::players::{PlayerId, PlayerSummary};

/// Full view of the current round, sent on connect and after `identify`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameState {
    /// Current round id
    pub round_id: RoundId,
    /// Current phase
    pub phase: Phase,
    /// Battle strategy in use
    pub strategy: StrategyKind,
    /// When the round was started
    pub created_at: i64,
    /// Scheduled end of betting
    pub ends_at: Option<i64>,
    /// Whole seconds of betting left
    pub countdown: u32,
    /// Amount wagered per side
    pub totals: IndexMap<String, f64>,
    /// Per-side standings (health or slots)
    pub health: Standings,
    /// Winner of the settled round, if any
    pub winner: Option<String>,
}

/// `battle_start` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BattleStarted {
    /// Round the battle belongs to
    pub round_id: RoundId,
    /// Battle start time
    pub started_at: i64,
    /// Starting standings and, for slot reveal, the sequence
    #[serde(flatten)]
    pub opening: BattleOpening,
}

/// `battle_tick` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BattleTicked {
    /// Round the tick belongs to
    pub round_id: RoundId,
    /// What happened
    #[serde(flatten)]
    pub detail: TickDetail,
}

/// `case_start` payload, for every slot reveal case after the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseStarted {
    /// Round the case belongs to
    pub round_id: RoundId,
    /// When the case was dealt
    pub started_at: i64,
    /// The new sequence and target
    #[serde(flatten)]
    pub plan: RevealPlan,
}

/// `case_result` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseResolved {
    /// Round the case belongs to
    pub round_id: RoundId,
    /// When the case was decided
    pub ended_at: i64,
    /// Winner and the revealed sequence
    #[serde(flatten)]
    pub outcome: CaseOutcome,
}

/// `final_round_result` payload, sent after `round_result` by slot reveal
/// rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinalRoundResult {
    /// Settled round
    pub round_id: RoundId,
    /// Every case in play order
    pub case_results: Vec<CaseOutcome>,
    /// Winner of the last case
    pub final_winner: Option<String>,
    /// Settlement time
    pub finished_at: i64,
}

/// `round_result` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundResult {
    /// Settled round
    pub round_id: RoundId,
    /// Winning side, `None` if no side survived
    pub winner: Option<String>,
    /// Amount wagered per side
    pub totals: IndexMap<String, f64>,
    /// Per-player payout
    pub settlement: Settlement,
    /// Settlement time
    pub ended_at: i64,
}

/// A message pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Notification {
    /// Current round snapshot
    GameState(GameState),
    /// All known players
    PlayerList {
        /// Players in join order
        players: Vec<PlayerSummary>,
    },
    /// A new round was started
    RoundCreated {
        /// New round id
        round_id: RoundId,
        /// Round start time
        start_time: i64,
    },
    /// Betting is open
    BettingOpen {
        /// Round id
        round_id: RoundId,
        /// Length of the betting window in seconds
        countdown: u32,
    },
    /// Current wagers
    BetsUpdate(BetsSnapshot),
    /// One second of betting elapsed
    BettingTick {
        /// Seconds remaining
        seconds_left: u32,
        /// Length of the betting window
        seconds: u32,
    },
    /// Betting is closed
    BettingClosed {
        /// Round id
        round_id: RoundId,
    },
    /// Battle started
    BattleStart(BattleStarted),
    /// One battle step
    BattleTick(BattleTicked),
    /// The next slot reveal case was dealt
    CaseStart(CaseStarted),
    /// A slot reveal case was decided
    CaseResult(CaseResolved),
    /// Round settled
    RoundResult(RoundResult),
    /// Summary of every slot reveal case in the round
    FinalRoundResult(FinalRoundResult),
    /// Sent to the bettor only
    BetAccepted {
        /// Side bet on
        side: String,
        /// Amount debited
        amount: f64,
        /// Balance after the debit
        balance: f64,
    },
    /// A command was refused; sent to its sender only
    Error {
        /// Human-readable reason
        message: String,
        /// Stable machine-readable code
        code: &'static str,
    },
    /// One second of the post-round cooldown elapsed
    CooldownTick {
        /// Seconds until the next round starts
        seconds_left: u32,
        /// Length of the cooldown
        seconds: u32,
    },
}

impl Notification {
    /// Builds the `error` notification for a refused command.
    #[must_use]
    pub fn error(err: &CommandError) -> Self {
        Self::Error {
            message: err.to_string(),
            code: err.code(),
        }
    }

    /// Wire name of this notification.
    #[must_use]
    pub const fn event(&self) -> &'static str {
        match self {
            Self::GameState(_) => "game_state",
            Self::PlayerList { .. } => "player_list",
            Self::RoundCreated { .. } => "round_created",
            Self::BettingOpen { .. } => "betting_open",
            Self::BetsUpdate(_) => "bets_update",
            Self::BettingTick { .. } => "betting_tick",
            Self::BettingClosed { .. } => "betting_closed",
            Self::BattleStart(_) => "battle_start",
            Self::BattleTick(_) => "battle_tick",
            Self::CaseStart(_) => "case_start",
            Self::CaseResult(_) => "case_result",
            Self::RoundResult(_) => "round_result",
            Self::FinalRoundResult(_) => "final_round_result",
            Self::BetAccepted { .. } => "bet_accepted",
            Self::Error { .. } => "error",
            Self::CooldownTick { .. } => "cooldown_tick",
        }
    }
}

/// Delivers notifications to connected participants. Must not block.
pub trait Notifier: Send + Sync {
    /// Sends to every open connection.
    fn broadcast(&self, notification: &Notification);

    /// Sends to one player's connection. Unknown or closed connections are
    /// ignored.
    fn send_to(&self, player: PlayerId, notification: &Notification);
}
