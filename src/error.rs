//! Error types for `skirmish`
//!
//! Process-level errors map to exit codes; command errors are plain values
//! that the engine reports back to the connection that sent the command.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `skirmish` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Transport error (bind failed, listener died)
    pub const TRANSPORT_ERROR: i32 = 4;

    /// Audit ledger error (unreadable store, broken chain)
    pub const LEDGER_ERROR: i32 = 5;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `skirmish` operations.
#[derive(Debug, Error)]
pub enum SkirmishError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transport layer error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Audit ledger error
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SkirmishError {
    /// Returns the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Transport(_) => ExitCode::TRANSPORT_ERROR,
            Self::Ledger(_) => ExitCode::LEDGER_ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}: {}", summarize(.errors))]
    ValidationError {
        /// Path to the configuration file
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Configuration file exceeds the size limit
    #[error("config file {path} is {size} bytes (limit: {limit})")]
    FileTooLarge {
        /// Path to the configuration file
        path: PathBuf,
        /// Actual size in bytes
        size: usize,
        /// Configured limit in bytes
        limit: usize,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Location in the configuration where it was referenced
        location: String,
    },
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "sides[1].health")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Prevents the configuration from being used
    Error,
    /// Reported but does not block loading
    Warning,
}

// ============================================================================
// Transport Errors
// ============================================================================

/// WebSocket transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not bind the listener
    #[error("bind failed on {addr}: {source}")]
    Bind {
        /// Requested bind address
        addr: String,
        /// Underlying socket error
        source: std::io::Error,
    },

    /// I/O error while serving
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bind address could not be parsed
    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),
}

// ============================================================================
// Ledger Errors
// ============================================================================

/// Audit ledger storage and integrity errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Reading or creating the block store failed
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A block could not be encoded
    #[error("ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored line is not a valid block
    #[error("corrupt block at line {line}: {message}")]
    Corrupt {
        /// 1-based line number in the block file
        line: usize,
        /// Decoder message
        message: String,
    },

    /// The stored chain fails integrity verification
    #[error("chain verification failed: {0}")]
    Chain(#[from] crate::ledger::ChainViolation),
}

// ============================================================================
// Command Errors
// ============================================================================

/// Why a bet was refused. Never mutates engine or wallet state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BetRejection {
    /// The round is not in its betting window
    #[error("Betting is closed")]
    BettingClosed,

    /// The side is not one of the configured sides
    #[error("Invalid side{}", suggestion_suffix(.suggestion.as_deref()))]
    InvalidSide {
        /// Side as sent by the player
        side: String,
        /// Closest known side name, if any is close enough
        suggestion: Option<String>,
    },

    /// Amount is not a finite positive number
    #[error("Invalid amount")]
    InvalidAmount,

    /// Amount exceeds the player's balance
    #[error("Insufficient balance")]
    InsufficientBalance {
        /// Balance at the time of the bet
        balance: f64,
        /// Requested amount
        amount: f64,
    },

    /// The player already holds a bet in this round
    #[error("Bet already placed this round")]
    DuplicateBet,
}

fn suggestion_suffix(suggestion: Option<&str>) -> String {
    suggestion.map_or_else(String::new, |s| format!(" (did you mean '{s}'?)"))
}

impl BetRejection {
    /// Stable machine-readable code for this rejection.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BettingClosed => "betting_closed",
            Self::InvalidSide { .. } => "invalid_side",
            Self::InvalidAmount => "invalid_amount",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::DuplicateBet => "duplicate_bet",
        }
    }
}

/// Errors reported back to the participant that sent a command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// Frame was not valid JSON
    #[error("Invalid JSON")]
    InvalidJson,

    /// Frame named an event the server does not accept
    #[error("Unknown event")]
    UnknownEvent(String),

    /// `start_round` arrived while a round is running
    #[error("A round is already in progress")]
    RoundInProgress,

    /// `identify` carried an empty or non-string name
    #[error("Invalid name")]
    InvalidName,

    /// The originating connection has no player record
    #[error("Unknown player")]
    UnknownPlayer,

    /// Bet was rejected
    #[error(transparent)]
    Bet(#[from] BetRejection),
}

impl CommandError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::UnknownEvent(_) => "unknown_event",
            Self::RoundInProgress => "round_in_progress",
            Self::InvalidName => "invalid_name",
            Self::UnknownPlayer => "unknown_player",
            Self::Bet(rejection) => rejection.code(),
        }
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `skirmish` operations.
pub type Result<T> = std::result::Result<T, SkirmishError>;

// ============================================================================
// Tests
// ============================================================================
