//! Round identity and phase state.
//!
//! The round is a singleton aggregate owned by the phase controller and
//! overwritten in place when a new round starts. Each start bumps a
//! generation counter that every timer message carries, so a timer armed for
//! a superseded round is recognised and dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque round identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(Uuid);

impl RoundId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoundId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// Round lifecycle stage.
///
/// Phases only move forward along
/// `Idle → Betting → Starting → InProgress → Ended`, and `Ended → Betting`
/// when the next round starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No round has been started yet
    #[default]
    Idle,
    /// Accepting bets while the countdown runs
    Betting,
    /// Betting closed, waiting for the start delay
    Starting,
    /// Battle is being resolved
    InProgress,
    /// Result settled; waiting for the next start
    Ended,
}

impl Phase {
    /// Wire and log name of the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Betting => "betting",
            Self::Starting => "starting",
            Self::InProgress => "in_progress",
            Self::Ended => "ended",
        }
    }

    /// The only phase this one may advance to.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Idle | Self::Ended => Self::Betting,
            Self::Betting => Self::Starting,
            Self::Starting => Self::InProgress,
            Self::InProgress => Self::Ended,
        }
    }

    /// `true` while a round is running and a new start must be refused.
    #[must_use]
    pub const fn is_mid_round(self) -> bool {
        matches!(self, Self::Betting | Self::Starting | Self::InProgress)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The current round.
#[derive(Debug, Clone)]
pub struct Round {
    /// Round id, replaced on every start
    pub id: RoundId,
    /// Incremented on every start; stamps timer messages
    pub generation: u64,
    /// Current phase
    pub phase: Phase,
    /// When the round was started
    pub created_at: DateTime<Utc>,
    /// Whole seconds of betting left
    pub countdown: u32,
    /// Length of the betting window
    pub countdown_total: u32,
    /// Scheduled end of the betting window
    pub ends_at: Option<DateTime<Utc>>,
    /// When the battle started
    pub started_at: Option<DateTime<Utc>>,
    /// When the result was settled
    pub ended_at: Option<DateTime<Utc>>,
    /// Winning side of the last settled round
    pub winner: Option<String>,
}

impl Round {
    /// Initial idle state; generation 0 is never armed.
    #[must_use]
    pub fn idle(now: DateTime<Utc>) -> Self {
        Self {
            id: RoundId::new(),
            generation: 0,
            phase: Phase::Idle,
            created_at: now,
            countdown: 0,
            countdown_total: 0,
            ends_at: None,
            started_at: None,
            ended_at: None,
            winner: None,
        }
    }

    /// Overwrites this round with a fresh one entering `Betting`.
    ///
    /// Returns the phase the previous round was left in.
    pub fn restart(&mut self, betting_seconds: u32, now: DateTime<Utc>) -> Phase {
        let previous = self.phase;
        *self = Self {
            id: RoundId::new(),
            generation: self.generation + 1,
            phase: Phase::Betting,
            created_at: now,
            countdown: betting_seconds,
            countdown_total: betting_seconds,
            ends_at: Some(now + chrono::Duration::seconds(i64::from(betting_seconds))),
            started_at: None,
            ended_at: None,
            winner: None,
        };
        previous
    }

    /// Span tagging log lines with this round's id and generation.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("round", round_id = %self.id, generation = self.generation)
    }

    /// Moves to `to` if it is the successor of the current phase.
    ///
    /// Returns the phase left, or `None` (state unchanged) for any other
    /// target.
    pub fn advance(&mut self, to: Phase) -> Option<Phase> {
        if self.phase.next() != to || to == Phase::Betting {
            return None;
        }
        let from = self.phase;
        self.phase = to;
        Some(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        let mut round = Round::idle(Utc::now());
        round.restart(3, Utc::now());
        assert_eq!(round.advance(Phase::Starting), Some(Phase::Betting));
        assert_eq!(round.advance(Phase::InProgress), Some(Phase::Starting));
        assert_eq!(round.advance(Phase::Ended), Some(Phase::InProgress));
        assert_eq!(round.phase, Phase::Ended);
    }

    #[test]
    fn test_advance_refuses_skips_and_regressions() {
        let mut round = Round::idle(Utc::now());
        round.restart(3, Utc::now());
        assert_eq!(round.advance(Phase::InProgress), None);
        assert_eq!(round.advance(Phase::Ended), None);
        assert_eq!(round.advance(Phase::Idle), None);
        assert_eq!(round.advance(Phase::Betting), None);
        assert_eq!(round.phase, Phase::Betting);
    }

    #[test]
    fn test_restart_bumps_generation_and_id() {
        let mut round = Round::idle(Utc::now());
        let first_id = round.id;
        assert_eq!(round.restart(5, Utc::now()), Phase::Idle);
        assert_eq!(round.generation, 1);
        assert_ne!(round.id, first_id);
        assert_eq!(round.countdown, 5);
        assert_eq!(round.countdown_total, 5);
        assert!(round.ends_at.is_some());

        round.advance(Phase::Starting);
        let second_id = round.id;
        assert_eq!(round.restart(5, Utc::now()), Phase::Starting);
        assert_eq!(round.generation, 2);
        assert_ne!(round.id, second_id);
    }

    #[test]
    fn test_mid_round_phases() {
        assert!(!Phase::Idle.is_mid_round());
        assert!(Phase::Betting.is_mid_round());
        assert!(Phase::Starting.is_mid_round());
        assert!(Phase::InProgress.is_mid_round());
        assert!(!Phase::Ended.is_mid_round());
    }

    #[test]
    fn test_phase_wire_names() {
        assert_eq!(
            serde_json::to_string(&Phase::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(Phase::InProgress.to_string(), "in_progress");
    }
}
