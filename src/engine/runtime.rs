//! Engine task.
//!
//! One task owns the [`PhaseController`] and consumes a single queue that
//! carries both participant commands and timer messages, so every round
//! mutation happens in arrival order on one logical thread.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::bets::BetsSnapshot;
use super::controller::{EngineParts, PhaseController};
use super::notify::{GameState, Notification, Notifier};
use super::timers::{TaskTimers, TimerControl, TimerKind};
use crate::error::CommandError;
use crate::observability::metrics;
use crate::players::PlayerId;

/// A request for the engine.
#[derive(Debug)]
pub enum EngineCommand {
    /// Start a new round. `origin` receives the error if it is refused.
    StartRound {
        /// Requesting player, `None` for internal callers
        origin: Option<PlayerId>,
    },
    /// Place a bet on behalf of `origin`.
    PlaceBet {
        /// Bettor
        origin: PlayerId,
        /// Side name as sent
        side: String,
        /// Amount as sent; may be NaN
        amount: f64,
    },
    /// Reply with the current round and wagers.
    Snapshot {
        /// Reply channel
        reply: oneshot::Sender<EngineSnapshot>,
    },
}

/// Round and wagers at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSnapshot {
    /// `game_state` payload
    pub state: GameState,
    /// `bets_update` payload
    pub bets: BetsSnapshot,
}

/// Everything the engine task consumes.
#[derive(Debug)]
pub enum EngineMessage {
    /// From a participant or the server
    Command(EngineCommand),
    /// From a round timer
    Timer {
        /// Generation of the round that armed the timer
        generation: u64,
        /// Which timer fired
        kind: TimerKind,
    },
}

/// Cloneable front for the engine task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl EngineHandle {
    /// Queues a command. Returns `false` if the engine has stopped.
    pub fn send(&self, command: EngineCommand) -> bool {
        self.tx.send(EngineMessage::Command(command)).is_ok()
    }

    /// Requests a new round.
    pub fn start_round(&self, origin: Option<PlayerId>) -> bool {
        self.send(EngineCommand::StartRound { origin })
    }

    /// Requests a bet.
    pub fn place_bet(&self, origin: PlayerId, side: impl Into<String>, amount: f64) -> bool {
        self.send(EngineCommand::PlaceBet {
            origin,
            side: side.into(),
            amount,
        })
    }

    /// Current round and wagers, `None` if the engine has stopped.
    pub async fn snapshot(&self) -> Option<EngineSnapshot> {
        let (reply, rx) = oneshot::channel();
        if !self.send(EngineCommand::Snapshot { reply }) {
            return None;
        }
        rx.await.ok()
    }
}

/// Spawns the engine task. It runs until `cancel` fires, then disarms every
/// timer and exits.
#[must_use]
pub fn spawn(parts: EngineParts, cancel: CancellationToken) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let timers = TaskTimers::new(tx.clone(), cancel.child_token());
    let notifier = parts.notifier.clone();
    let controller = PhaseController::new(parts, timers);
    let task = tokio::spawn(run(controller, notifier, rx, cancel));
    (EngineHandle { tx }, task)
}

async fn run<T: TimerControl>(
    mut controller: PhaseController<T>,
    notifier: Arc<dyn Notifier>,
    mut rx: mpsc::UnboundedReceiver<EngineMessage>,
    cancel: CancellationToken,
) {
    info!("round engine started");
    loop {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => message,
        };
        let Some(message) = message else {
            break;
        };
        let span = controller.round().span();
        span.in_scope(|| match message {
            EngineMessage::Timer { generation, kind } => controller.on_timer(generation, kind),
            EngineMessage::Command(command) => {
                handle_command(&mut controller, notifier.as_ref(), command);
            }
        });
    }
    controller.shutdown();
    info!(phase = %controller.phase(), "round engine stopped");
}

fn handle_command<T: TimerControl>(
    controller: &mut PhaseController<T>,
    notifier: &dyn Notifier,
    command: EngineCommand,
) {
    let (origin, result) = match command {
        EngineCommand::StartRound { origin } => (origin, controller.start_round()),
        EngineCommand::PlaceBet {
            origin,
            side,
            amount,
        } => (Some(origin), controller.place_bet(origin, &side, amount)),
        EngineCommand::Snapshot { reply } => {
            let _ = reply.send(EngineSnapshot {
                state: controller.snapshot(),
                bets: controller.bets_snapshot(),
            });
            return;
        }
    };

    if let Err(e) = result {
        reject(notifier, origin, &e);
    }
}

fn reject(notifier: &dyn Notifier, origin: Option<PlayerId>, err: &CommandError) {
    metrics::record_command_rejected(err);
    debug!(code = err.code(), origin = ?origin, "command rejected");
    if let Some(player) = origin {
        notifier.send_to(player, &Notification::error(err));
    }
}
