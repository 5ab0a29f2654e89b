//! Logging initialization.
//!
//! Structured logging via `tracing` with human-readable and JSON output.
//! `-v` flags raise this crate's own level one step ahead of its
//! dependencies, so `-v` shows round transitions without HTTP and WebSocket
//! internals. `SKIRMISH_LOG_LEVEL` overrides both.
//!
//! Engine work runs inside a `round` span carrying `round_id` and
//! `generation`; JSON lines include it under `span`.

use std::io::IsTerminal;

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::cli::args::ColorChoice;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_LEVEL_ENV: &str = "SKIRMISH_LOG_LEVEL";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with optional ANSI colors.
    #[default]
    Human,
    /// Newline-delimited JSON for machine consumption.
    Json,
}

/// Maps a verbosity level to a tracing directive.
///
/// - 0 → everything at `warn`
/// - 1 → `skirmish` at `info`, dependencies at `warn`
/// - 2 → `skirmish` at `debug`, dependencies at `info`
/// - 3+ → `skirmish` at `trace`, dependencies at `debug`
#[must_use]
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "warn,skirmish=info",
        2 => "info,skirmish=debug",
        _ => "debug,skirmish=trace",
    }
}

fn build_subscriber<W>(
    format: LogFormat,
    filter: EnvFilter,
    show_target: bool,
    ansi: bool,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(show_target)
        .with_writer(writer);
    match format {
        LogFormat::Human => Box::new(builder.with_ansi(ansi).finish()),
        LogFormat::Json => Box::new(
            builder
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .finish(),
        ),
    }
}

/// Initializes the global tracing subscriber on stderr.
///
/// `SKIRMISH_LOG_LEVEL` takes precedence over `verbosity` when set. Later
/// calls are ignored.
pub fn init_logging(format: LogFormat, verbosity: u8, color: ColorChoice) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| EnvFilter::new(verbosity_to_directive(verbosity)));

    let use_ansi = match color {
        ColorChoice::Auto => {
            std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
        }
        ColorChoice::Always => true,
        ColorChoice::Never => false,
    };

    let subscriber = build_subscriber(format, filter, verbosity >= 2, use_ansi, std::io::stderr);
    let _ = tracing::subscriber::set_global_default(subscriber);
}
