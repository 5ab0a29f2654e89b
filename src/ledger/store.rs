//! Durable block storage.
//!
//! The block file is newline-delimited JSON, one [`Block`] per line. All
//! appends go through a single writer task fed by an unbounded channel, so at
//! most one write is in flight and file order equals submission order.
//! A failed append is logged and dropped; later blocks are still written.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::block::Block;
use crate::error::LedgerError;
use crate::observability::metrics;

/// Destination for sealed blocks. `submit` must never block.
pub trait BlockSink: Send + Sync {
    /// Hands a sealed block to the sink.
    fn submit(&self, block: Block);
}

/// Block file on disk.
#[derive(Debug, Clone)]
pub struct BlockStore {
    path: PathBuf,
}

impl BlockStore {
    /// Creates a store for the given file path. Nothing is opened yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the block file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the parent directory of the block file if needed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be created.
    pub fn ensure_parent(&self) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    fn read_contents(&self) -> Result<Option<Vec<u8>>, LedgerError> {
        match std::fs::read(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Reads every block, failing on the first undecodable line.
    ///
    /// A missing file reads as an empty chain.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Corrupt`] with the 1-based line number of a
    /// line that is not a block, or an I/O error.
    pub fn read_all(&self) -> Result<Vec<Block>, LedgerError> {
        let Some(contents) = self.read_contents()? else {
            return Ok(Vec::new());
        };

        contents
            .split(|b| *b == b'\n')
            .enumerate()
            .filter(|(_, line)| !is_blank(line))
            .map(|(idx, line)| {
                serde_json::from_slice::<Block>(line).map_err(|e| LedgerError::Corrupt {
                    line: idx + 1,
                    message: e.to_string(),
                })
            })
            .collect()
    }

    /// Recovers the newest readable block without touching the file.
    ///
    /// Scans backwards past undecodable trailing lines (for example a write
    /// torn by a crash) and returns `None` when no line decodes.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file exists but cannot be read.
    pub fn recover_head(&self) -> Result<Option<Block>, LedgerError> {
        let Some(contents) = self.read_contents()? else {
            return Ok(None);
        };
        Ok(scan_tail(&contents).map(|tail| tail.head))
    }

    /// Recovers the newest readable block and makes the file safe to append
    /// to.
    ///
    /// Unreadable lines after the head are cut off, and a head line that
    /// lacks its newline gets one, so the next append starts on a fresh
    /// line. When no line decodes at all the contents are left in place and
    /// only a missing final newline is added.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, truncated or
    /// appended to.
    pub fn repair_tail(&self) -> Result<Option<Block>, LedgerError> {
        let Some(contents) = self.read_contents()? else {
            return Ok(None);
        };

        let Some(tail) = scan_tail(&contents) else {
            if !contents.is_empty() {
                warn!(path = %self.path.display(), "ledger file has no readable block");
                if !contents.ends_with(b"\n") {
                    self.append_raw(b"\n")?;
                }
            }
            return Ok(None);
        };

        if tail.end < contents.len() {
            let discarded = contents.len() - tail.end;
            warn!(
                skipped = tail.skipped,
                bytes = discarded,
                path = %self.path.display(),
                "truncating unreadable trailing ledger lines"
            );
            let file = std::fs::OpenOptions::new().write(true).open(&self.path)?;
            file.set_len(tail.end as u64)?;
            file.sync_all()?;
        }
        if !contents[..tail.end].ends_with(b"\n") {
            self.append_raw(b"\n")?;
        }
        Ok(Some(tail.head))
    }

    fn append_raw(&self, bytes: &[u8]) -> Result<(), LedgerError> {
        use std::io::Write;

        let mut file = std::fs::OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(())
    }

    /// Appends one block synchronously.
    ///
    /// Only used before the writer task exists (genesis) and in tools.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the append fails.
    pub fn append_blocking(&self, block: &Block) -> Result<(), LedgerError> {
        use std::io::Write;

        let line = serde_json::to_string(block)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    async fn append(&self, block: &Block) -> Result<(), LedgerError> {
        let mut line = serde_json::to_string(block)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Newest decodable line of a block file.
struct Tail {
    head: Block,
    /// Byte offset just past the head line
    end: usize,
    /// Undecodable lines after the head
    skipped: usize,
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn scan_tail(contents: &[u8]) -> Option<Tail> {
    let mut skipped = 0;
    let mut end = contents.len();
    // Lines are walked newest first; `end` is where the current line stops.
    while end > 0 {
        let body_end = if contents[end - 1] == b'\n' { end - 1 } else { end };
        let start = contents[..body_end]
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |i| i + 1);
        let line = &contents[start..body_end];
        if !is_blank(line) {
            match serde_json::from_slice::<Block>(line) {
                Ok(head) => return Some(Tail { head, end, skipped }),
                Err(e) => {
                    debug!(error = %e, "skipping unreadable ledger line");
                    skipped += 1;
                }
            }
        }
        end = start;
    }
    None
}

/// Sink that appends blocks to a [`BlockStore`] from a single writer task.
#[derive(Debug, Clone)]
pub struct FileSink {
    tx: mpsc::UnboundedSender<Block>,
}

impl FileSink {
    /// Spawns the writer task.
    ///
    /// When `cancel` fires the task writes whatever is still queued and
    /// exits.
    #[must_use]
    pub fn spawn(store: BlockStore, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Block>();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    block = rx.recv() => {
                        let Some(block) = block else { break };
                        write_block(&store, &block).await;
                    }
                    () = cancel.cancelled() => {
                        while let Ok(block) = rx.try_recv() {
                            write_block(&store, &block).await;
                        }
                        break;
                    }
                }
            }
            debug!("ledger writer stopped");
        });
        (Self { tx }, handle)
    }
}

async fn write_block(store: &BlockStore, block: &Block) {
    match store.append(block).await {
        Ok(()) => {
            debug!(number = block.header.number, txs = block.txs.len(), "block written");
            metrics::record_block_written();
        }
        Err(e) => {
            error!(
                number = block.header.number,
                error = %e,
                "failed to append block; not retrying"
            );
            metrics::record_ledger_write_failure();
        }
    }
}

impl BlockSink for FileSink {
    fn submit(&self, block: Block) {
        if self.tx.send(block).is_err() {
            warn!("ledger writer is gone; block dropped");
            metrics::record_ledger_write_failure();
        }
    }
}

/// Sink that keeps blocks in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    // std::sync::Mutex: held only for a push or a clone.
    blocks: Mutex<Vec<Block>>,
    retain: bool,
}

impl MemorySink {
    /// Sink that retains every block for inspection.
    #[must_use]
    pub fn retaining() -> Self {
        Self {
            blocks: Mutex::new(Vec::new()),
            retain: true,
        }
    }

    /// Sink that drops blocks (ledger disabled).
    #[must_use]
    pub fn discarding() -> Self {
        Self::default()
    }

    /// Returns a copy of the retained blocks.
    #[must_use]
    pub fn blocks(&self) -> Vec<Block> {
        self.blocks
            .lock()
            .map(|blocks| blocks.clone())
            .unwrap_or_default()
    }
}

impl BlockSink for MemorySink {
    fn submit(&self, block: Block) {
        if !self.retain {
            return;
        }
        if let Ok(mut blocks) = self.blocks.lock() {
            blocks.push(block);
        }
    }
}
