//! Append-only audit ledger.
//!
//! Round events are journaled as hashed [`Transaction`]s into a pending
//! queue. A background batcher seals them into [`Block`]s whose headers link
//! to the previous block hash and commit to their transactions through a
//! Merkle root. Sealed blocks are appended, one JSON object per line, by a
//! single writer task so file order always matches block order.
//!
//! # Architecture
//!
//! - [`block`]: transaction/block types and SHA-256 hashing
//! - [`merkle`]: Merkle root over transaction hashes
//! - [`store`]: newline-delimited block file plus the single-writer sink
//! - [`audit`]: [`AuditLedger`] front (record, seal, batcher task)
//! - [`verify`]: offline chain integrity checks

pub mod audit;
pub mod block;
pub mod merkle;
pub mod store;
pub mod verify;

pub use audit::{AuditLedger, LedgerTasks};
pub use block::{Block, BlockHeader, ChainHead, Transaction, ZERO_HASH};
pub use merkle::merkle_root;
pub use store::{BlockSink, BlockStore, FileSink, MemorySink};
pub use verify::{ChainSummary, ChainViolation, verify_chain};
