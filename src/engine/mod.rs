//! Round engine.
//!
//! - [`round`]: round identity and phase order
//! - [`selector`]: weighted random choice
//! - [`battle`]: battle strategies
//! - [`bets`]: wagers and settlement
//! - [`notify`]: outbound notifications
//! - [`timers`]: generation-stamped round timers
//! - [`controller`]: the phase state machine
//! - [`runtime`]: the task that serializes everything onto the controller

pub mod battle;
pub mod bets;
pub mod controller;
pub mod notify;
pub mod round;
pub mod runtime;
pub mod selector;
pub mod timers;

pub use battle::{
    AttritionBattle, BattleStrategy, CaseOutcome, RevealPlan, SlotRevealBattle, TickDetail,
    TickOutcome,
};
pub use bets::{BetLedger, BetsSnapshot, Settlement, SettlementEntry};
pub use controller::{EngineParts, PhaseController};
pub use notify::{GameState, Notification, Notifier};
pub use round::{Phase, Round, RoundId};
pub use runtime::{EngineCommand, EngineHandle, EngineSnapshot, spawn};
pub use timers::{Schedule, TaskTimers, TimerControl, TimerKind};
