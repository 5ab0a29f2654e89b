//! Prometheus metrics.
//!
//! Typed recording helpers over the `metrics` facade. Label values that can
//! be influenced by clients are checked against fixed lists so an unknown
//! value never creates a new series.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::{CommandError, SkirmishError};

/// Guard to prevent double-initialization of the metrics recorder.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const UNKNOWN_LABEL: &str = "__unknown__";

const KNOWN_PHASES: [&str; 5] = ["idle", "betting", "starting", "in_progress", "ended"];

const KNOWN_BET_REJECTIONS: [&str; 5] = [
    "betting_closed",
    "invalid_side",
    "invalid_amount",
    "insufficient_balance",
    "duplicate_bet",
];

const KNOWN_COMMAND_REJECTIONS: [&str; 5] = [
    "invalid_json",
    "unknown_event",
    "round_in_progress",
    "invalid_name",
    "unknown_player",
];

const KNOWN_COMMANDS: [&str; 3] = ["start_round", "place_bet", "identify"];

const KNOWN_TX_TYPES: [&str; 7] = [
    "bet_placed",
    "battle_start",
    "battle_tick",
    "case_start",
    "case_result",
    "round_result",
    "final_round_result",
];

fn sanitize(value: &str, known: &[&'static str]) -> &'static str {
    known
        .iter()
        .find(|k| **k == value)
        .copied()
        .unwrap_or(UNKNOWN_LABEL)
}

/// Maps a bet rejection code to a metrics label, `"__unknown__"` if
/// unrecognized.
#[must_use]
pub fn sanitize_reason_label(reason: &str) -> &'static str {
    sanitize(reason, &KNOWN_BET_REJECTIONS)
}

/// Maps a command name to a metrics label, `"__unknown__"` if unrecognized.
#[must_use]
pub fn sanitize_command_label(command: &str) -> &'static str {
    sanitize(command, &KNOWN_COMMANDS)
}

/// Initializes the global metrics recorder.
///
/// With `Some(port)` a Prometheus HTTP listener is started on
/// `127.0.0.1:<port>`; with `None` metrics are recorded without an endpoint.
///
/// # Errors
///
/// Returns `SkirmishError::Io` if the recorder or listener cannot be
/// installed.
pub fn init_metrics(port: Option<u16>) -> Result<(), SkirmishError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| SkirmishError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!("skirmish_rounds_started_total", "Rounds started");
    describe_counter!(
        "skirmish_phase_transitions_total",
        "Round phase transitions by target phase"
    );
    describe_gauge!("skirmish_current_phase", "Current round phase (1 = active)");
    describe_counter!("skirmish_bets_accepted_total", "Bets accepted");
    describe_counter!("skirmish_bets_rejected_total", "Rejected bets by reason");
    describe_counter!(
        "skirmish_commands_rejected_total",
        "Refused non-bet commands by reason"
    );
    describe_gauge!("skirmish_wagered_total", "Cumulative amount wagered");
    describe_gauge!("skirmish_payout_total", "Cumulative amount paid out");
    describe_counter!("skirmish_battle_ticks_total", "Battle ticks resolved");
    describe_counter!(
        "skirmish_ledger_transactions_total",
        "Transactions journaled by type"
    );
    describe_counter!("skirmish_ledger_blocks_total", "Blocks written");
    describe_counter!(
        "skirmish_ledger_write_failures_total",
        "Block appends that failed"
    );
    describe_gauge!("skirmish_connections_active", "Open client connections");
    describe_counter!("skirmish_commands_total", "Inbound commands by name");
}

/// Records an accepted `start_round`.
pub fn record_round_started() {
    counter!("skirmish_rounds_started_total").increment(1);
}

/// Records a phase transition and moves the current-phase gauge.
pub fn record_phase_transition(from: &str, to: &str) {
    let to = sanitize(to, &KNOWN_PHASES);
    counter!("skirmish_phase_transitions_total", "to" => to).increment(1);
    gauge!("skirmish_current_phase", "phase" => sanitize(from, &KNOWN_PHASES)).set(0.0);
    gauge!("skirmish_current_phase", "phase" => to).set(1.0);
}

/// Records an accepted bet.
pub fn record_bet_accepted(amount: f64) {
    counter!("skirmish_bets_accepted_total").increment(1);
    gauge!("skirmish_wagered_total").increment(amount);
}

/// Records a refused command. Bet rejections and other refusals go to
/// separate series.
pub fn record_command_rejected(err: &CommandError) {
    match err {
        CommandError::Bet(rejection) => {
            let reason = sanitize_reason_label(rejection.code());
            counter!("skirmish_bets_rejected_total", "reason" => reason).increment(1);
        }
        other => {
            let reason = sanitize(other.code(), &KNOWN_COMMAND_REJECTIONS);
            counter!("skirmish_commands_rejected_total", "reason" => reason).increment(1);
        }
    }
}

/// Records the total paid out by one settlement.
pub fn record_payout(amount: f64) {
    gauge!("skirmish_payout_total").increment(amount);
}

/// Records one resolved battle tick.
pub fn record_battle_tick() {
    counter!("skirmish_battle_ticks_total").increment(1);
}

/// Records one journaled transaction.
pub fn record_ledger_transaction(kind: &str) {
    counter!("skirmish_ledger_transactions_total", "type" => sanitize(kind, &KNOWN_TX_TYPES))
        .increment(1);
}

/// Records a block that reached disk.
pub fn record_block_written() {
    counter!("skirmish_ledger_blocks_total").increment(1);
}

/// Records a failed block append.
pub fn record_ledger_write_failure() {
    counter!("skirmish_ledger_write_failures_total").increment(1);
}

/// Sets the number of open connections.
#[allow(clippy::cast_precision_loss)]
pub fn set_connections_active(count: usize) {
    gauge!("skirmish_connections_active").set(count as f64);
}

/// Records an inbound command.
pub fn record_command(command: &str) {
    counter!("skirmish_commands_total", "command" => sanitize_command_label(command))
        .increment(1);
}
