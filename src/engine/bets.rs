//! Per-round wagers and settlement.
//!
//! Invariant: outside of `settle`, the per-side totals always sum to the sum
//! of the stored bet amounts. Every rejection leaves both the ledger and the
//! wallet untouched.
//!
//! Payouts are priced from capacity weights (initial health or slot counts),
//! not from the wagered pool: a winning bet receives
//! `amount * total_weight / winner_weight`. Total payout is therefore not
//! bounded by the total wagered.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use super::round::{Phase, RoundId};
use crate::error::{BetRejection, CommandError};
use crate::players::{PlayerId, Wallet};

/// Maximum edit distance for a side-name suggestion.
const SUGGESTION_DISTANCE: usize = 2;

/// One stored wager.
#[derive(Debug, Clone, PartialEq)]
pub struct Bet {
    /// Bettor
    pub player: PlayerId,
    /// Chosen side (lower case)
    pub side: String,
    /// Amount debited
    pub amount: f64,
}

/// Returned for an accepted bet.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedBet {
    /// The stored bet
    pub bet: Bet,
    /// Bettor's balance after the debit
    pub balance: f64,
    /// Per-side totals after the bet
    pub totals: IndexMap<String, f64>,
}

/// One player's settlement result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SettlementEntry {
    /// Amount credited (zero for a losing bet)
    pub change: f64,
    /// Balance after crediting
    pub balance: f64,
}

/// Settlement of every stored bet, keyed by player.
pub type Settlement = IndexMap<PlayerId, SettlementEntry>;

/// A bet as shown to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetView {
    /// Bettor id
    pub player_id: PlayerId,
    /// Bettor display name
    pub name: String,
    /// Chosen side
    pub side: String,
    /// Amount wagered
    pub amount: f64,
}

/// Read-only view of the round's wagers (`bets_update` payload).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BetsSnapshot {
    /// Round the bets belong to
    pub round_id: RoundId,
    /// Amount wagered per side
    pub totals: IndexMap<String, f64>,
    /// Bets in placement order
    pub bets: Vec<BetView>,
}

/// Computes the payout multiplier for `winner` from capacity weights.
///
/// A non-positive winner weight divides by 1; a non-positive total yields a
/// multiplier of 1.
#[must_use]
pub fn payout_multiplier(weights: &IndexMap<String, f64>, winner: &str) -> f64 {
    let total: f64 = weights.values().copied().filter(|w| *w > 0.0).sum();
    if total <= 0.0 {
        return 1.0;
    }
    let winner_weight = weights.get(winner).copied().filter(|w| *w > 0.0).unwrap_or(1.0);
    total / winner_weight
}

/// Wagers for the current round.
#[derive(Debug, Clone)]
pub struct BetLedger {
    sides: Vec<String>,
    bets: IndexMap<PlayerId, Bet>,
    totals: IndexMap<String, f64>,
}

impl BetLedger {
    /// Creates an empty ledger over `sides`. Side names are matched lower
    /// case.
    #[must_use]
    pub fn new(sides: &[String]) -> Self {
        let sides: Vec<String> = sides.iter().map(|s| s.to_lowercase()).collect();
        let totals = sides.iter().map(|s| (s.clone(), 0.0)).collect();
        Self {
            sides,
            bets: IndexMap::new(),
            totals,
        }
    }

    /// Clears all bets and zeroes every total.
    pub fn reset(&mut self) {
        self.bets.clear();
        for total in self.totals.values_mut() {
            *total = 0.0;
        }
    }

    /// Validates and records a bet, debiting the wallet.
    ///
    /// Checks run in order: phase, side, amount, repeat bet, balance. A
    /// player may hold one bet per round; a second one is refused and the
    /// first stands.
    ///
    /// # Errors
    ///
    /// Returns the first failed check as a [`CommandError`]; nothing is
    /// changed on error.
    pub fn place_bet(
        &mut self,
        phase: Phase,
        wallet: &dyn Wallet,
        player: PlayerId,
        side: &str,
        amount: f64,
    ) -> Result<AcceptedBet, CommandError> {
        if phase != Phase::Betting {
            return Err(BetRejection::BettingClosed.into());
        }

        let side = side.trim().to_lowercase();
        if !self.totals.contains_key(&side) {
            let suggestion = self.suggest_side(&side);
            return Err(BetRejection::InvalidSide { side, suggestion }.into());
        }

        if !amount.is_finite() || amount <= 0.0 {
            return Err(BetRejection::InvalidAmount.into());
        }

        if self.bets.contains_key(&player) {
            return Err(BetRejection::DuplicateBet.into());
        }

        let balance = wallet.try_debit(player, amount)?;

        let bet = Bet {
            player,
            side: side.clone(),
            amount,
        };
        self.bets.insert(player, bet.clone());
        if let Some(total) = self.totals.get_mut(&side) {
            *total += amount;
        }

        Ok(AcceptedBet {
            bet,
            balance,
            totals: self.totals.clone(),
        })
    }

    fn suggest_side(&self, input: &str) -> Option<String> {
        self.sides
            .iter()
            .map(|s| (s, strsim::damerau_levenshtein(input, s)))
            .filter(|(_, dist)| *dist <= SUGGESTION_DISTANCE)
            .min_by_key(|(_, dist)| *dist)
            .map(|(name, _)| name.clone())
    }

    /// Pays out every stored bet against `winner`.
    ///
    /// Every bet yields exactly one entry. Losing bets, and all bets when
    /// there is no winner, get `change == 0`.
    pub fn settle(
        &self,
        winner: Option<&str>,
        weights: &IndexMap<String, f64>,
        wallet: &dyn Wallet,
    ) -> Settlement {
        let multiplier = winner.map_or(0.0, |w| payout_multiplier(weights, w));

        self.bets
            .values()
            .map(|bet| {
                let won = winner.is_some_and(|w| w == bet.side);
                let entry = if won {
                    let payout = bet.amount * multiplier;
                    wallet.credit(bet.player, payout).map_or_else(
                        || {
                            warn!(player = %bet.player, "winning bettor no longer known");
                            SettlementEntry {
                                change: 0.0,
                                balance: 0.0,
                            }
                        },
                        |balance| SettlementEntry {
                            change: payout,
                            balance,
                        },
                    )
                } else {
                    SettlementEntry {
                        change: 0.0,
                        balance: wallet.balance(bet.player).unwrap_or_default(),
                    }
                };
                (bet.player, entry)
            })
            .collect()
    }

    /// Amount wagered per side.
    #[must_use]
    pub const fn totals(&self) -> &IndexMap<String, f64> {
        &self.totals
    }

    /// Stored bets in placement order.
    pub fn bets(&self) -> impl Iterator<Item = &Bet> {
        self.bets.values()
    }

    /// Read-only snapshot for `bets_update`. Bets of players the wallet no
    /// longer knows are omitted from the list but still counted in totals.
    #[must_use]
    pub fn snapshot(&self, round_id: RoundId, wallet: &dyn Wallet) -> BetsSnapshot {
        BetsSnapshot {
            round_id,
            totals: self.totals.clone(),
            bets: self
                .bets
                .values()
                .filter_map(|bet| {
                    wallet.display_name(bet.player).map(|name| BetView {
                        player_id: bet.player,
                        name,
                        side: bet.side.clone(),
                        amount: bet.amount,
                    })
                })
                .collect(),
        }
    }
}
