//! Server command handlers.
//!
//! Implements `server run` and `server validate`.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::cli::args::{OutputFormat, ServerRunArgs, ServerValidateArgs};
use crate::config::{ConfigLoader, GameConfig, LoadResult};
use crate::error::{ConfigError, Severity, SkirmishError, ValidationIssue};
use crate::server::{Server, ServerOptions};

/// Start the game server and serve until `cancel` fires.
///
/// # Errors
///
/// Returns a config error if the file cannot be loaded, a ledger error if
/// the block file cannot be opened, or a transport error if the listener
/// cannot be bound.
pub async fn run(args: &ServerRunArgs, cancel: CancellationToken) -> Result<(), SkirmishError> {
    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let config = match args.config {
        Some(ref path) => {
            tracing::info!(config = %path.display(), "loading configuration");
            let load_result = ConfigLoader::default().load(path)?;
            log_warnings(&load_result);
            load_result.config
        }
        None => {
            tracing::info!("no configuration file given; using defaults");
            Arc::new(GameConfig::default())
        }
    };

    let config = apply_overrides(config, args);
    let server = Server::bind(ServerOptions::new(config, cancel)).await?;
    tracing::info!(addr = %server.local_addr(), "listening");
    server.run().await
}

/// Folds command-line overrides into the loaded configuration.
fn apply_overrides(config: Arc<GameConfig>, args: &ServerRunArgs) -> Arc<GameConfig> {
    if args.bind.is_none() && args.ledger_path.is_none() && !args.no_ledger && args.seed.is_none()
    {
        return config;
    }

    let mut config = Arc::unwrap_or_clone(config);
    if let Some(ref bind) = args.bind {
        config.server.bind.clone_from(bind);
    }
    if let Some(ref path) = args.ledger_path {
        config.ledger.enabled = true;
        config.ledger.path.clone_from(path);
    }
    if args.no_ledger {
        config.ledger.enabled = false;
    }
    if args.seed.is_some() {
        config.battle.seed = args.seed;
    }
    Arc::new(config)
}

fn log_warnings(load_result: &LoadResult) {
    for warning in &load_result.warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }
}

/// Outcome of validating one file.
#[derive(Debug, Serialize)]
struct FileReport {
    file: String,
    valid: bool,
    warnings: Vec<String>,
    error: Option<String>,
}

/// Validate configuration files without starting the server.
///
/// Every file is checked and reported; the first failure is returned.
///
/// # Errors
///
/// Returns the config error of the first invalid file. With `--strict`,
/// a file with warnings counts as invalid.
pub fn validate(args: &ServerValidateArgs) -> Result<(), SkirmishError> {
    let loader = ConfigLoader::default();
    let mut reports = Vec::with_capacity(args.files.len());
    let mut first_error: Option<ConfigError> = None;

    for path in &args.files {
        tracing::info!(file = %path.display(), "validating configuration");
        let (report, error) = check_file(&loader, path, args.strict);
        if report.valid {
            tracing::info!(file = %path.display(), "configuration valid");
        }
        reports.push(report);
        if first_error.is_none() {
            first_error = error;
        }
    }

    match args.format {
        OutputFormat::Human => print_human(&reports),
        OutputFormat::Json => {
            let valid = reports.iter().filter(|r| r.valid).count();
            let output = json!({
                "files": reports,
                "summary": {
                    "total": reports.len(),
                    "valid": valid,
                    "invalid": reports.len() - valid,
                },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    first_error.map_or(Ok(()), |e| Err(e.into()))
}

fn check_file(loader: &ConfigLoader, path: &Path, strict: bool) -> (FileReport, Option<ConfigError>) {
    let file = path.display().to_string();
    match loader.load(path) {
        Ok(load_result) => {
            let warnings: Vec<String> = load_result.warnings.iter().map(ToString::to_string).collect();
            if strict && !load_result.warnings.is_empty() {
                let error = ConfigError::ValidationError {
                    path: file.clone(),
                    errors: load_result
                        .warnings
                        .iter()
                        .map(|w| ValidationIssue {
                            path: w.location.clone().unwrap_or_default(),
                            message: w.message.clone(),
                            severity: Severity::Error,
                        })
                        .collect(),
                };
                let report = FileReport {
                    file,
                    valid: false,
                    warnings,
                    error: Some(error.to_string()),
                };
                return (report, Some(error));
            }
            log_warnings(&load_result);
            let report = FileReport {
                file,
                valid: true,
                warnings,
                error: None,
            };
            (report, None)
        }
        Err(error) => {
            let report = FileReport {
                file,
                valid: false,
                warnings: Vec::new(),
                error: Some(error.to_string()),
            };
            (report, Some(error))
        }
    }
}

fn print_human(reports: &[FileReport]) {
    for report in reports {
        if report.valid {
            println!("ok       {}", report.file);
        } else {
            println!("invalid  {}", report.file);
        }
        for warning in &report.warnings {
            println!("  warning: {warning}");
        }
        if let Some(ref error) = report.error {
            println!("  {error}");
        }
    }
}
