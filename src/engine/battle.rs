//! Battle resolution strategies.
//!
//! A strategy owns the per-round battle state. The controller calls
//! [`BattleStrategy::begin`] once when the battle starts and then
//! [`BattleStrategy::tick`] on the strategy's cadence until the tick reports
//! a finished battle. Each tick mutates state and decides termination before
//! returning, so the caller only ever publishes settled state.

use std::ops::RangeInclusive;
use std::time::Duration;

use indexmap::IndexMap;
use rand::{Rng, RngCore};
use rand::seq::SliceRandom;
use serde::Serialize;

use super::selector;
use crate::config::{BattleConfig, FILLER_SLOT, GameConfig, RevealCase, SideConfig, StrategyKind};

/// Reveal ticks are never closer together than this.
const MIN_REVEAL_TICK: Duration = Duration::from_millis(10);

/// Entries left unrevealed after the target index.
const REVEAL_TAIL: usize = 4;

/// Side name to a per-side count (health or slots).
pub type Standings = IndexMap<String, u32>;

/// What a strategy publishes when the battle starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BattleOpening {
    /// Per-side starting standings (health, or slot counts for slot reveal)
    pub initial_health: Standings,
    /// Shuffled sequence and target, slot reveal only
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub reveal: Option<RevealPlan>,
}

/// The slot sequence being revealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevealPlan {
    /// Shuffled side names, one per slot
    pub sequence: Vec<String>,
    /// Index whose entry wins
    pub target_index: usize,
    /// Label of the case being revealed
    pub case_key: String,
    /// Position of the case in the round
    pub case_index: usize,
    /// Cases in the round
    pub total_cases: usize,
}

/// How one slot reveal case ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaseOutcome {
    /// Side at the target index, `None` for a filler slot
    pub winner: Option<String>,
    /// The revealed case
    #[serde(flatten)]
    pub plan: RevealPlan,
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TickDetail {
    /// One side hit another
    Strike {
        /// Side dealing damage
        attacker: String,
        /// Side taking damage
        defender: String,
        /// Damage dealt
        damage: u32,
        /// Health of every side after the hit
        health: Standings,
    },
    /// One more slot was revealed
    Reveal {
        /// Position revealed so far
        index: usize,
        /// Sequence length
        total: usize,
        /// Winning position
        target_index: usize,
        /// Full sequence
        sequence: Vec<String>,
        /// Label of the case being revealed
        case_key: String,
        /// Position of the case in the round
        case_index: usize,
        /// Cases in the round
        total_cases: usize,
    },
}

/// Result of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Keep ticking
    Continue(TickDetail),
    /// One case of a multi-case battle was decided and the next one dealt.
    /// The cadence may have changed.
    CaseDecided {
        /// Tick that decided the case, if any
        detail: Option<TickDetail>,
        /// The decided case
        outcome: CaseOutcome,
        /// The case now being revealed
        next: RevealPlan,
    },
    /// The battle is over. `detail` is `None` when the battle was already
    /// decided before this tick; `winner` is `None` when no side survived.
    Finished {
        /// Tick that ended the battle, if any
        detail: Option<TickDetail>,
        /// Winning side
        winner: Option<String>,
        /// The final case, for multi-case battles
        outcome: Option<CaseOutcome>,
    },
}

/// A battle resolution strategy.
pub trait BattleStrategy: Send {
    /// Strategy this instance implements.
    fn kind(&self) -> StrategyKind;

    /// Resets per-round state and returns what to announce.
    fn begin(&mut self, rng: &mut dyn RngCore) -> BattleOpening;

    /// Advances the battle by one step.
    fn tick(&mut self, rng: &mut dyn RngCore) -> TickOutcome;

    /// Current per-side standings.
    fn standings(&self) -> Standings;

    /// Capacity weight of each side used to price payouts.
    fn settlement_weights(&self) -> IndexMap<String, f64>;

    /// Delay between ticks.
    fn cadence(&self) -> Duration;

    /// Every case decided so far this round, oldest first. Empty for
    /// strategies without cases.
    fn case_outcomes(&self) -> &[CaseOutcome] {
        &[]
    }
}

/// Builds the strategy selected in `config`.
#[must_use]
pub fn build_battle(config: &GameConfig) -> Box<dyn BattleStrategy> {
    match config.battle.strategy {
        StrategyKind::Attrition => Box::new(AttritionBattle::new(&config.sides, &config.battle)),
        StrategyKind::SlotReveal => Box::new(SlotRevealBattle::new(&config.sides, &config.battle)),
    }
}

// ============================================================================
// Attrition
// ============================================================================

/// Sides trade weighted random hits until at most one has health left.
///
/// Attacker and defender are drawn with probability proportional to current
/// health, so stronger sides hit more often and are also hit more often.
#[derive(Debug, Clone)]
pub struct AttritionBattle {
    initial: Standings,
    health: Standings,
    damage: RangeInclusive<u32>,
    cadence: Duration,
}

impl AttritionBattle {
    /// Creates a battle over `sides`.
    #[must_use]
    pub fn new(sides: &[SideConfig], config: &BattleConfig) -> Self {
        let initial: Standings = sides.iter().map(|s| (s.name.clone(), s.health)).collect();
        let (min, max) = (config.damage.min, config.damage.max.max(config.damage.min));
        Self {
            health: initial.clone(),
            initial,
            damage: min..=max,
            cadence: config.tick_interval,
        }
    }

    fn alive(&self) -> Vec<(String, f64)> {
        self.health
            .iter()
            .filter(|(_, hp)| **hp > 0)
            .map(|(name, hp)| (name.clone(), f64::from(*hp)))
            .collect()
    }

    fn verdict(&self) -> Option<Option<String>> {
        let alive = self.alive();
        (alive.len() <= 1).then(|| alive.into_iter().next().map(|(name, _)| name))
    }

    /// Applies one hit and evaluates termination.
    ///
    /// Health is floored at zero. Unknown side names leave health unchanged.
    pub fn strike(&mut self, attacker: &str, defender: &str, damage: u32) -> TickOutcome {
        if let Some(hp) = self.health.get_mut(defender) {
            *hp = hp.saturating_sub(damage);
        }
        let detail = TickDetail::Strike {
            attacker: attacker.to_string(),
            defender: defender.to_string(),
            damage,
            health: self.health.clone(),
        };
        match self.verdict() {
            Some(winner) => TickOutcome::Finished {
                detail: Some(detail),
                winner,
                outcome: None,
            },
            None => TickOutcome::Continue(detail),
        }
    }
}

impl BattleStrategy for AttritionBattle {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Attrition
    }

    fn begin(&mut self, _rng: &mut dyn RngCore) -> BattleOpening {
        self.health.clone_from(&self.initial);
        BattleOpening {
            initial_health: self.initial.clone(),
            reveal: None,
        }
    }

    fn tick(&mut self, rng: &mut dyn RngCore) -> TickOutcome {
        if let Some(winner) = self.verdict() {
            return TickOutcome::Finished {
                detail: None,
                winner,
                outcome: None,
            };
        }

        let alive = self.alive();
        let Some(attacker) = selector::pick(&alive, rng).cloned() else {
            return TickOutcome::Finished {
                detail: None,
                winner: None,
                outcome: None,
            };
        };
        let targets: Vec<(String, f64)> = alive
            .into_iter()
            .filter(|(name, _)| *name != attacker)
            .collect();
        let Some(defender) = selector::pick(&targets, rng).cloned() else {
            return TickOutcome::Finished {
                detail: None,
                winner: Some(attacker),
                outcome: None,
            };
        };

        let damage = rng.random_range(self.damage.clone());
        self.strike(&attacker, &defender, damage)
    }

    fn standings(&self) -> Standings {
        self.health.clone()
    }

    fn settlement_weights(&self) -> IndexMap<String, f64> {
        self.initial
            .iter()
            .map(|(name, hp)| (name.clone(), f64::from(*hp)))
            .collect()
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }
}

// ============================================================================
// Slot reveal
// ============================================================================

/// One case with its slot counts resolved against the configured sides.
#[derive(Debug, Clone)]
struct Case {
    key: String,
    slots: Standings,
    filler: u32,
}

impl Case {
    fn len(&self) -> usize {
        self.slots.values().map(|n| *n as usize).sum::<usize>() + self.filler as usize
    }
}

/// Plays one or more cases back to back. In each case every side owns a
/// number of entries in a shuffled sequence, and positions are revealed one
/// per tick up to a target index whose entry decides the case. The last
/// case decides the round and prices the payout.
#[derive(Debug, Clone)]
pub struct SlotRevealBattle {
    cases: Vec<Case>,
    window: Duration,
    current: usize,
    sequence: Vec<String>,
    target_index: usize,
    position: Option<usize>,
    outcomes: Vec<CaseOutcome>,
}

impl SlotRevealBattle {
    /// Creates a battle over `sides`. Without configured cases a single case
    /// is built from each side's `slots`. Each case's reveal is spread over
    /// `config.reveal_window`.
    #[must_use]
    pub fn new(sides: &[SideConfig], config: &BattleConfig) -> Self {
        let cases: Vec<Case> = if config.cases.is_empty() {
            vec![Case {
                key: "case1".to_string(),
                slots: sides.iter().map(|s| (s.name.clone(), s.slots)).collect(),
                filler: 0,
            }]
        } else {
            config.cases.iter().map(|c| resolve_case(c, sides)).collect()
        };
        let target_index = cases
            .first()
            .map_or(0, |c| c.len().saturating_sub(REVEAL_TAIL));
        Self {
            cases,
            window: config.reveal_window,
            current: 0,
            sequence: Vec::new(),
            target_index,
            position: None,
            outcomes: Vec::new(),
        }
    }

    fn case(&self) -> Option<&Case> {
        self.cases.get(self.current)
    }

    fn plan(&self) -> RevealPlan {
        RevealPlan {
            sequence: self.sequence.clone(),
            target_index: self.target_index,
            case_key: self.case().map(|c| c.key.clone()).unwrap_or_default(),
            case_index: self.current,
            total_cases: self.cases.len(),
        }
    }

    /// Shuffles the current case into a fresh sequence.
    fn deal(&mut self, rng: &mut dyn RngCore) -> RevealPlan {
        self.sequence = self.case().map_or_else(Vec::new, |case| {
            case.slots
                .iter()
                .flat_map(|(name, count)| std::iter::repeat_n(name.clone(), *count as usize))
                .chain(std::iter::repeat_n(FILLER_SLOT.to_string(), case.filler as usize))
                .collect()
        });
        self.sequence.shuffle(rng);
        self.target_index = self.sequence.len().saturating_sub(REVEAL_TAIL);
        self.position = None;
        self.plan()
    }

    fn decide(&mut self, detail: Option<TickDetail>, rng: &mut dyn RngCore) -> TickOutcome {
        let outcome = CaseOutcome {
            winner: self
                .sequence
                .get(self.target_index)
                .filter(|entry| *entry != FILLER_SLOT)
                .cloned(),
            plan: self.plan(),
        };
        self.outcomes.push(outcome.clone());

        if self.current + 1 < self.cases.len() {
            self.current += 1;
            let next = self.deal(rng);
            TickOutcome::CaseDecided {
                detail,
                outcome,
                next,
            }
        } else {
            TickOutcome::Finished {
                detail,
                winner: outcome.winner.clone(),
                outcome: Some(outcome),
            }
        }
    }
}

fn resolve_case(case: &RevealCase, sides: &[SideConfig]) -> Case {
    let slots = sides
        .iter()
        .map(|side| {
            let count = case
                .slots
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&side.name))
                .map_or(0, |(_, count)| *count);
            (side.name.clone(), count)
        })
        .collect();
    Case {
        key: case.key.clone(),
        slots,
        filler: case.filler,
    }
}

impl BattleStrategy for SlotRevealBattle {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SlotReveal
    }

    fn begin(&mut self, rng: &mut dyn RngCore) -> BattleOpening {
        self.current = 0;
        self.outcomes.clear();
        let plan = self.deal(rng);
        BattleOpening {
            initial_health: self.standings(),
            reveal: Some(plan),
        }
    }

    fn tick(&mut self, rng: &mut dyn RngCore) -> TickOutcome {
        if self.outcomes.len() >= self.cases.len() {
            return TickOutcome::Finished {
                detail: None,
                winner: self.outcomes.last().and_then(|o| o.winner.clone()),
                outcome: None,
            };
        }
        if self.sequence.is_empty() {
            return self.decide(None, rng);
        }

        let index = self
            .position
            .map_or(0, |p| (p + 1).min(self.target_index));
        self.position = Some(index);

        let plan = self.plan();
        let detail = TickDetail::Reveal {
            index,
            total: plan.sequence.len(),
            target_index: plan.target_index,
            sequence: plan.sequence,
            case_key: plan.case_key,
            case_index: plan.case_index,
            total_cases: plan.total_cases,
        };
        if index >= self.target_index {
            self.decide(Some(detail), rng)
        } else {
            TickOutcome::Continue(detail)
        }
    }

    fn standings(&self) -> Standings {
        self.case().map(|c| c.slots.clone()).unwrap_or_default()
    }

    fn settlement_weights(&self) -> IndexMap<String, f64> {
        let Some(case) = self.case() else {
            return IndexMap::new();
        };
        let mut weights: IndexMap<String, f64> = case
            .slots
            .iter()
            .map(|(name, n)| (name.clone(), f64::from(*n)))
            .collect();
        if case.filler > 0 {
            weights.insert(FILLER_SLOT.to_string(), f64::from(case.filler));
        }
        weights
    }

    fn cadence(&self) -> Duration {
        let ticks = u32::try_from(self.target_index + 1).unwrap_or(u32::MAX);
        (self.window / ticks).max(MIN_REVEAL_TICK)
    }

    fn case_outcomes(&self) -> &[CaseOutcome] {
        &self.outcomes
    }
}
