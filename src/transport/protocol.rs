//! Inbound command frames.
//!
//! A frame is a JSON object `{"event": <name>, "data": {...}}`. Older
//! clients use `start_game`, `bet` and `join`; those names are accepted as
//! aliases.

use serde_json::Value;

use crate::error::CommandError;

/// A parsed participant command.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// Start a new round
    StartRound,
    /// Bet on a side
    PlaceBet {
        /// Side name, lower case; may be unknown
        side: String,
        /// Amount; NaN when the frame carried no usable number
        amount: f64,
    },
    /// Change display name
    Identify {
        /// Requested name, untrimmed
        name: String,
    },
}

impl ClientCommand {
    /// Canonical command name, used for metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartRound => "start_round",
            Self::PlaceBet { .. } => "place_bet",
            Self::Identify { .. } => "identify",
        }
    }
}

/// Parses one text frame.
///
/// Bet fields are not validated here beyond their types: the side is
/// lower-cased and the amount accepts a number or a numeric string, anything
/// else becomes NaN and is refused later as an invalid amount.
///
/// # Errors
///
/// `InvalidJson` if the frame is not JSON, `UnknownEvent` for an
/// unrecognised or missing event name, `InvalidName` for an `identify`
/// without a string name.
pub fn parse_command(text: &str) -> Result<ClientCommand, CommandError> {
    let frame: Value = serde_json::from_str(text).map_err(|_| CommandError::InvalidJson)?;
    let event = frame.get("event").and_then(Value::as_str).unwrap_or_default();
    let data = frame.get("data").unwrap_or(&Value::Null);

    match event {
        "start_round" | "start_game" => Ok(ClientCommand::StartRound),
        "place_bet" | "bet" => Ok(ClientCommand::PlaceBet {
            side: data
                .get("side")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_lowercase(),
            amount: data.get("amount").map_or(f64::NAN, parse_amount),
        }),
        "identify" | "join" => data
            .get("name")
            .and_then(Value::as_str)
            .map(|name| ClientCommand::Identify {
                name: name.to_string(),
            })
            .ok_or(CommandError::InvalidName),
        other => Err(CommandError::UnknownEvent(other.to_string())),
    }
}

fn parse_amount(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}
