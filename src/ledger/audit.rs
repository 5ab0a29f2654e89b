//! Pending-transaction queue and block batcher.
//!
//! [`AuditLedger::record`] only pushes onto an in-memory queue. A background
//! batcher periodically seals the queue into blocks and hands them to a
//! [`BlockSink`]; the file sink appends them from its own writer task.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::block::{Block, ChainHead, Transaction};
use super::store::{BlockSink, BlockStore, FileSink, MemorySink};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::observability::metrics;

/// Upper bound (exclusive) for block nonces.
const NONCE_BOUND: u64 = 1_000_000;

struct Inner {
    enabled: bool,
    max_batch: usize,
    pending: Mutex<VecDeque<Transaction>>,
    // Held for the whole seal so sink order equals block number order.
    head: Mutex<ChainHead>,
    sink: Arc<dyn BlockSink>,
}

/// Append-only audit journal. Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct AuditLedger {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AuditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLedger")
            .field("enabled", &self.inner.enabled)
            .field("pending", &self.pending_len())
            .field("head", &self.head())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Poisoning only follows a panic while holding the lock; the data is
    // still structurally valid.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl AuditLedger {
    /// Creates a ledger continuing from `head`.
    ///
    /// `max_batch` is clamped to at least 1.
    #[must_use]
    pub fn new(head: ChainHead, sink: Arc<dyn BlockSink>, max_batch: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                enabled: true,
                max_batch: max_batch.max(1),
                pending: Mutex::new(VecDeque::new()),
                head: Mutex::new(head),
                sink,
            }),
        }
    }

    /// Ledger whose `record` is a no-op.
    #[must_use]
    pub fn disabled() -> Self {
        let genesis = Block::genesis(0);
        Self {
            inner: Arc::new(Inner {
                enabled: false,
                max_batch: 1,
                pending: Mutex::new(VecDeque::new()),
                head: Mutex::new(genesis.head()),
                sink: Arc::new(MemorySink::discarding()),
            }),
        }
    }

    /// Fresh in-memory chain. The genesis block is submitted to the returned
    /// sink, so the sink always holds a complete chain.
    #[must_use]
    pub fn in_memory(max_batch: usize) -> (Self, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::retaining());
        let genesis = Block::genesis(now_millis());
        let head = genesis.head();
        sink.submit(genesis);
        (Self::new(head, sink.clone(), max_batch), sink)
    }

    /// Opens the block file, recovers the chain head (writing genesis when
    /// there is no readable block) and spawns the writer and batcher tasks.
    ///
    /// A torn tail left by a crash is cut off before the writer starts, so
    /// new blocks always land on their own line.
    ///
    /// When the ledger is disabled in `config` nothing is opened and the
    /// returned ledger discards every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the block file cannot be read or genesis cannot be
    /// written.
    pub fn start(config: &LedgerConfig) -> Result<(Self, LedgerTasks), LedgerError> {
        if !config.enabled {
            info!("audit ledger disabled");
            return Ok((Self::disabled(), LedgerTasks::idle()));
        }

        let store = BlockStore::new(&config.path);
        store.ensure_parent()?;

        let head = if let Some(block) = store.repair_tail()? {
            info!(
                number = block.header.number,
                hash = %block.hash,
                path = %store.path().display(),
                "recovered ledger head"
            );
            block.head()
        } else {
            let genesis = Block::genesis(now_millis());
            store.append_blocking(&genesis)?;
            info!(hash = %genesis.hash, path = %store.path().display(), "wrote genesis block");
            genesis.head()
        };

        let writer_cancel = CancellationToken::new();
        let (sink, writer) = FileSink::spawn(store, writer_cancel.clone());
        let ledger = Self::new(head, Arc::new(sink), config.max_tx_per_block);

        let batcher_cancel = CancellationToken::new();
        let batcher = tokio::spawn(run_batcher(
            ledger.clone(),
            config.block_interval,
            batcher_cancel.clone(),
        ));

        Ok((
            ledger,
            LedgerTasks {
                batcher: Some(batcher),
                writer: Some(writer),
                batcher_cancel,
                writer_cancel,
            },
        ))
    }

    /// Journals one event. Never blocks on I/O.
    pub fn record<T: Serialize + ?Sized>(&self, kind: &str, payload: &T) {
        if !self.inner.enabled {
            return;
        }
        let data = match serde_json::to_value(payload) {
            Ok(data) => data,
            Err(e) => {
                warn!(kind, error = %e, "audit payload not serializable; dropped");
                return;
            }
        };
        let tx = Transaction::new(kind, now_millis(), data);
        lock(&self.inner.pending).push_back(tx);
        metrics::record_ledger_transaction(kind);
    }

    /// Number of transactions waiting to be sealed.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Current chain head.
    #[must_use]
    pub fn head(&self) -> ChainHead {
        lock(&self.inner.head).clone()
    }

    /// Seals up to `max_batch` pending transactions into one block and
    /// submits it. Returns `None` when nothing is pending.
    pub fn seal_block(&self) -> Option<Block> {
        let mut head = lock(&self.inner.head);
        let txs: Vec<Transaction> = {
            let mut pending = lock(&self.inner.pending);
            let take = pending.len().min(self.inner.max_batch);
            pending.drain(..take).collect()
        };
        if txs.is_empty() {
            return None;
        }

        let nonce = rand::random_range(0..NONCE_BOUND);
        let block = Block::seal(&head, txs, now_millis(), nonce);
        *head = block.head();
        debug!(number = block.header.number, txs = block.txs.len(), "sealed block");
        self.inner.sink.submit(block.clone());
        Some(block)
    }

    /// Seals blocks until the queue is empty. Returns the number sealed.
    pub fn seal_all(&self) -> usize {
        let mut sealed = 0;
        while self.seal_block().is_some() {
            sealed += 1;
        }
        sealed
    }
}

async fn run_batcher(ledger: AuditLedger, period: Duration, cancel: CancellationToken) {
    let period = period.max(Duration::from_millis(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                ledger.seal_all();
            }
        }
    }
    debug!("ledger batcher stopped");
}

/// Background tasks owned by a started ledger.
#[derive(Debug)]
pub struct LedgerTasks {
    batcher: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
    batcher_cancel: CancellationToken,
    writer_cancel: CancellationToken,
}

impl LedgerTasks {
    fn idle() -> Self {
        Self {
            batcher: None,
            writer: None,
            batcher_cancel: CancellationToken::new(),
            writer_cancel: CancellationToken::new(),
        }
    }

    /// Stops the batcher, seals everything still pending and waits for the
    /// writer to drain.
    pub async fn shutdown(self, ledger: &AuditLedger) {
        self.batcher_cancel.cancel();
        if let Some(batcher) = self.batcher {
            if let Err(e) = batcher.await {
                warn!(error = %e, "ledger batcher task failed");
            }
        }

        let sealed = ledger.seal_all();
        if sealed > 0 {
            debug!(sealed, "sealed remaining transactions on shutdown");
        }

        self.writer_cancel.cancel();
        if let Some(writer) = self.writer {
            if let Err(e) = writer.await {
                warn!(error = %e, "ledger writer task failed");
            }
        }
        info!(head = ledger.head().number, "audit ledger closed");
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::verify_chain;
    use serde_json::json;

    #[test]
    fn test_record_does_not_seal() {
        let (ledger, sink) = AuditLedger::in_memory(500);
        ledger.record("battle_tick", &json!({"damage": 10}));
        assert_eq!(ledger.pending_len(), 1);
        assert_eq!(sink.blocks().len(), 1);
    }

    #[test]
    fn test_empty_queue_seals_nothing() {
        let (ledger, sink) = AuditLedger::in_memory(500);
        assert!(ledger.seal_block().is_none());
        assert_eq!(ledger.seal_all(), 0);
        assert_eq!(sink.blocks().len(), 1);
        assert_eq!(ledger.head().number, 0);
    }

    #[test]
    fn test_seal_respects_batch_limit() {
        let (ledger, sink) = AuditLedger::in_memory(2);
        for i in 0..5 {
            ledger.record("battle_tick", &json!({"i": i}));
        }
        assert_eq!(ledger.seal_all(), 3);
        assert_eq!(ledger.pending_len(), 0);

        let blocks = sink.blocks();
        let sizes: Vec<usize> = blocks.iter().map(|b| b.txs.len()).collect();
        assert_eq!(sizes, vec![0, 2, 2, 1]);
        let order: Vec<i64> = blocks
            .iter()
            .flat_map(|b| b.txs.iter())
            .map(|tx| tx.data["i"].as_i64().unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);

        let summary = verify_chain(&blocks).unwrap();
        assert_eq!(summary.blocks, 4);
        assert_eq!(summary.transactions, 5);
        assert_eq!(summary.head_hash, ledger.head().hash);
    }

    #[test]
    fn test_nonce_below_bound() {
        let (ledger, _sink) = AuditLedger::in_memory(1);
        for _ in 0..20 {
            ledger.record("bet_placed", &json!({}));
        }
        while let Some(block) = ledger.seal_block() {
            assert!(block.header.nonce < NONCE_BOUND);
        }
    }

    #[test]
    fn test_disabled_ledger_ignores_records() {
        let ledger = AuditLedger::disabled();
        ledger.record("round_result", &json!({"winner": "gold"}));
        assert_eq!(ledger.pending_len(), 0);
        assert!(ledger.seal_block().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batcher_seals_on_period() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            enabled: true,
            path: dir.path().join("blocks.jsonl"),
            block_interval: Duration::from_secs(3),
            max_tx_per_block: 500,
        };
        let (ledger, tasks) = AuditLedger::start(&config).unwrap();
        ledger.record("battle_start", &json!({"round": 1}));

        tokio::time::sleep(Duration::from_millis(3_100)).await;
        assert_eq!(ledger.pending_len(), 0);
        assert_eq!(ledger.head().number, 1);

        ledger.record("round_result", &json!({"winner": "gold"}));
        tasks.shutdown(&ledger).await;

        let blocks = BlockStore::new(&config.path).read_all().unwrap();
        assert_eq!(blocks.len(), 3);
        verify_chain(&blocks).unwrap();
    }

    #[tokio::test]
    async fn test_restart_continues_chain() {
        let dir = tempfile::tempdir().unwrap();
        let config = LedgerConfig {
            enabled: true,
            path: dir.path().join("blocks.jsonl"),
            block_interval: Duration::from_secs(60),
            max_tx_per_block: 500,
        };

        let (first, tasks) = AuditLedger::start(&config).unwrap();
        first.record("battle_tick", &json!({"damage": 8}));
        tasks.shutdown(&first).await;
        let head = first.head();

        let (second, tasks) = AuditLedger::start(&config).unwrap();
        assert_eq!(second.head(), head);
        second.record("battle_tick", &json!({"damage": 9}));
        tasks.shutdown(&second).await;

        let blocks = BlockStore::new(&config.path).read_all().unwrap();
        assert_eq!(blocks.len(), 3);
        let numbers: Vec<u64> = blocks.iter().map(|b| b.header.number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        verify_chain(&blocks).unwrap();
    }
}
