//! Round timers.
//!
//! A timer never touches round state. When it fires it posts a message,
//! stamped with the generation of the round that armed it, into the engine
//! queue; the controller decides whether the message still applies.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::runtime::EngineMessage;

/// What a timer drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// One-second betting countdown
    Countdown,
    /// Delay between betting closing and the battle starting
    StartDelay,
    /// Battle step cadence
    BattleTick,
    /// One-second post-round cooldown
    Cooldown,
}

/// When a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Once after the delay
    Once(Duration),
    /// Every period, first firing one period from now
    Every(Duration),
}

/// Arms and cancels round timers. At most one timer per kind is live.
pub trait TimerControl: Send {
    /// Arms a timer, cancelling any live timer of the same kind.
    fn arm(&mut self, generation: u64, kind: TimerKind, schedule: Schedule);

    /// Cancels the live timer of `kind`, if any.
    fn disarm(&mut self, kind: TimerKind);

    /// Cancels every live timer.
    fn disarm_all(&mut self);
}

/// Timers backed by tokio tasks.
#[derive(Debug)]
pub struct TaskTimers {
    tx: mpsc::UnboundedSender<EngineMessage>,
    root: CancellationToken,
    live: HashMap<TimerKind, CancellationToken>,
}

impl TaskTimers {
    /// Creates timers posting into `tx`. Cancelling `root` stops all of
    /// them.
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<EngineMessage>, root: CancellationToken) -> Self {
        Self {
            tx,
            root,
            live: HashMap::new(),
        }
    }
}

impl TimerControl for TaskTimers {
    fn arm(&mut self, generation: u64, kind: TimerKind, schedule: Schedule) {
        let token = self.root.child_token();
        if let Some(previous) = self.live.insert(kind, token.clone()) {
            previous.cancel();
        }
        let tx = self.tx.clone();
        let fire = move || tx.send(EngineMessage::Timer { generation, kind }).is_ok();

        tokio::spawn(async move {
            match schedule {
                Schedule::Once(delay) => {
                    tokio::select! {
                        biased;
                        () = token.cancelled() => {}
                        () = tokio::time::sleep(delay) => {
                            fire();
                        }
                    }
                }
                Schedule::Every(period) => {
                    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        tokio::select! {
                            biased;
                            () = token.cancelled() => break,
                            _ = interval.tick() => {
                                if !fire() {
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            trace!(?kind, generation, "timer finished");
        });
    }

    fn disarm(&mut self, kind: TimerKind) {
        if let Some(token) = self.live.remove(&kind) {
            token.cancel();
        }
    }

    fn disarm_all(&mut self) {
        for (_, token) in self.live.drain() {
            token.cancel();
        }
    }
}

impl Drop for TaskTimers {
    fn drop(&mut self) {
        self.disarm_all();
    }
}
