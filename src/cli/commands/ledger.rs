//! Ledger command handlers.
//!
//! Implements `ledger verify`.

use crate::cli::args::{LedgerVerifyArgs, OutputFormat};
use crate::error::{LedgerError, SkirmishError};
use crate::ledger::{BlockStore, verify_chain};

/// Verify a block file offline.
///
/// # Errors
///
/// Returns an I/O error if the file does not exist, and a ledger error if a
/// line cannot be parsed or the chain is broken.
pub fn verify(args: &LedgerVerifyArgs) -> Result<(), SkirmishError> {
    if !args.file.exists() {
        return Err(SkirmishError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("file not found: {}", args.file.display()),
        )));
    }

    let store = BlockStore::new(&args.file);
    let blocks = store.read_all()?;
    tracing::debug!(file = %args.file.display(), blocks = blocks.len(), "verifying chain");

    let summary = verify_chain(&blocks).map_err(LedgerError::from)?;

    match args.format {
        OutputFormat::Human => {
            println!(
                "chain ok: {} blocks, {} transactions, head #{} {}",
                summary.blocks, summary.transactions, summary.head_number, summary.head_hash
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}
