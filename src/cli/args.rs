//! CLI argument definitions.
//!
//! All Clap derive structs for `skirmish` command-line parsing.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::observability::LogFormat;

// ============================================================================
// Root CLI
// ============================================================================

/// Real-time wagering rounds with an audited result trail.
#[derive(Parser, Debug)]
#[command(name = "skirmish", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "SKIRMISH_COLOR")]
    pub color: ColorChoice,

    /// Log line format.
    #[arg(long, default_value = "human", global = true, env = "SKIRMISH_LOG_FORMAT")]
    pub log_format: LogFormat,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run or check the game server.
    Server(ServerCommand),

    /// Inspect the audit ledger.
    Ledger(LedgerCommand),

    /// Display version information.
    Version(VersionArgs),
}

// ============================================================================
// Server Command
// ============================================================================

/// Server management commands.
#[derive(Args, Debug)]
pub struct ServerCommand {
    /// Server subcommand.
    #[command(subcommand)]
    pub subcommand: ServerSubcommand,
}

/// Server subcommands.
#[derive(Subcommand, Debug)]
pub enum ServerSubcommand {
    /// Start the game server.
    Run(ServerRunArgs),

    /// Validate configuration files without starting the server.
    Validate(ServerValidateArgs),
}

/// Arguments for `server run`.
#[derive(Args, Debug)]
pub struct ServerRunArgs {
    /// Path to YAML configuration file (defaults apply when omitted).
    #[arg(short, long, env = "SKIRMISH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen on `host:port` instead of the configured address.
    #[arg(long, env = "SKIRMISH_BIND")]
    pub bind: Option<String>,

    /// Write ledger blocks to this file.
    #[arg(long, env = "SKIRMISH_LEDGER_PATH", conflicts_with = "no_ledger")]
    pub ledger_path: Option<PathBuf>,

    /// Disable the audit ledger.
    #[arg(long)]
    pub no_ledger: bool,

    /// Seed the battle RNG for reproducible rounds.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Serve Prometheus metrics on this port.
    #[arg(long, env = "SKIRMISH_METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

/// Arguments for `server validate`.
#[derive(Args, Debug)]
pub struct ServerValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Enable strict validation (warnings become errors).
    #[arg(long)]
    pub strict: bool,
}

// ============================================================================
// Ledger Command
// ============================================================================

/// Audit ledger commands.
#[derive(Args, Debug)]
pub struct LedgerCommand {
    /// Ledger subcommand.
    #[command(subcommand)]
    pub subcommand: LedgerSubcommand,
}

/// Ledger subcommands.
#[derive(Subcommand, Debug)]
pub enum LedgerSubcommand {
    /// Check the hash chain, Merkle roots and transaction hashes of a block
    /// file.
    Verify(LedgerVerifyArgs),
}

/// Arguments for `ledger verify`.
#[derive(Args, Debug)]
pub struct LedgerVerifyArgs {
    /// Block file (newline-delimited JSON).
    pub file: PathBuf,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// Version
// ============================================================================

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================
