//! Ledger record types and hashing.
//!
//! Hashes are `0x`-prefixed lowercase SHA-256 hex digests of the compact JSON
//! encoding of the hashed content. `serde_json` maps are key-sorted, so the
//! encoding of a payload is canonical regardless of how it was built.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::merkle::merkle_root;

/// All-zero digest used for the genesis parent and empty Merkle roots.
pub const ZERO_HASH: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Returns the `0x`-prefixed SHA-256 hex digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("0x{:x}", Sha256::digest(bytes))
}

/// Hashes the canonical JSON encoding of `value`.
fn hash_json<T: Serialize>(value: &T) -> String {
    // Encoding plain structs and `Value` trees cannot fail.
    sha256_hex(&serde_json::to_vec(value).unwrap_or_default())
}

/// One journaled round event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Event type tag, e.g. `battle_tick`
    #[serde(rename = "type")]
    pub kind: String,
    /// Epoch milliseconds when the event was recorded
    pub ts: i64,
    /// Event payload
    pub data: Value,
    /// Hash over `{type, ts, data}`
    pub tx_hash: String,
}

/// The hashed portion of a transaction, in wire field order.
#[derive(Serialize)]
struct TxContent<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    ts: i64,
    data: &'a Value,
}

impl Transaction {
    /// Creates a transaction and computes its content hash.
    #[must_use]
    pub fn new(kind: impl Into<String>, ts: i64, data: Value) -> Self {
        let kind = kind.into();
        let tx_hash = hash_json(&TxContent {
            kind: &kind,
            ts,
            data: &data,
        });
        Self {
            kind,
            ts,
            data,
            tx_hash,
        }
    }

    /// Recomputes the content hash from the stored fields.
    #[must_use]
    pub fn content_hash(&self) -> String {
        hash_json(&TxContent {
            kind: &self.kind,
            ts: self.ts,
            data: &self.data,
        })
    }

    /// Returns `true` when the stored hash matches the content.
    #[must_use]
    pub fn is_intact(&self) -> bool {
        self.content_hash() == self.tx_hash
    }
}

/// Block header; its hash is the block hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Sequence number, genesis is 0
    pub number: u64,
    /// Hash of the previous block
    pub parent_hash: String,
    /// Epoch milliseconds when the block was sealed
    pub timestamp: i64,
    /// Merkle root over the block's transaction hashes
    pub merkle_root: String,
    /// Arbitrary nonce (no proof-of-work is performed)
    pub nonce: u64,
}

impl BlockHeader {
    /// Hashes the header.
    #[must_use]
    pub fn hash(&self) -> String {
        hash_json(self)
    }
}

/// A sealed batch of transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Linking and summary header
    pub header: BlockHeader,
    /// Hash of `header`
    pub hash: String,
    /// Transactions in journal order
    pub txs: Vec<Transaction>,
}

impl Block {
    /// Builds the genesis block: number 0, zero parent, zero root, no txs.
    #[must_use]
    pub fn genesis(timestamp: i64) -> Self {
        let header = BlockHeader {
            number: 0,
            parent_hash: ZERO_HASH.to_string(),
            timestamp,
            merkle_root: ZERO_HASH.to_string(),
            nonce: 0,
        };
        Self {
            hash: header.hash(),
            header,
            txs: Vec::new(),
        }
    }

    /// Seals `txs` into the block following `head`.
    #[must_use]
    pub fn seal(head: &ChainHead, txs: Vec<Transaction>, timestamp: i64, nonce: u64) -> Self {
        let hashes: Vec<String> = txs.iter().map(|tx| tx.tx_hash.clone()).collect();
        let header = BlockHeader {
            number: head.number + 1,
            parent_hash: head.hash.clone(),
            timestamp,
            merkle_root: merkle_root(&hashes),
            nonce,
        };
        Self {
            hash: header.hash(),
            header,
            txs,
        }
    }

    /// Chain head pointing at this block.
    #[must_use]
    pub fn head(&self) -> ChainHead {
        ChainHead {
            number: self.header.number,
            hash: self.hash.clone(),
        }
    }
}

/// Sequence number and hash of the newest block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainHead {
    /// Block number
    pub number: u64,
    /// Block hash
    pub hash: String,
}
