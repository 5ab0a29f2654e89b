//! Offline chain integrity checks.

use serde::Serialize;
use thiserror::Error;

use super::block::{Block, ZERO_HASH};
use super::merkle::merkle_root;

/// First integrity failure found in a chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainViolation {
    /// No blocks at all
    #[error("chain is empty")]
    Empty,

    /// First block is not a well-formed genesis block
    #[error("first block is not a genesis block")]
    BadGenesis,

    /// Sequence numbers do not increase by exactly one
    #[error("block at position {position} has number {found}, expected {expected}")]
    Number {
        /// Zero-based position in the chain
        position: usize,
        /// Expected sequence number
        expected: u64,
        /// Stored sequence number
        found: u64,
    },

    /// Parent hash does not match the previous block's hash
    #[error("block {number} does not link to the previous block")]
    Parent {
        /// Offending block number
        number: u64,
    },

    /// Stored block hash does not match the header
    #[error("block {number} hash does not match its header")]
    HeaderHash {
        /// Offending block number
        number: u64,
    },

    /// Stored Merkle root does not match the transactions
    #[error("block {number} merkle root does not match its transactions")]
    MerkleRoot {
        /// Offending block number
        number: u64,
    },

    /// A transaction's content hash does not match its content
    #[error("transaction {index} in block {number} has a bad hash")]
    TxHash {
        /// Block number
        number: u64,
        /// Zero-based index within the block
        index: usize,
    },
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSummary {
    /// Number of blocks, genesis included
    pub blocks: usize,
    /// Number of transactions across all blocks
    pub transactions: usize,
    /// Number of the newest block
    pub head_number: u64,
    /// Hash of the newest block
    pub head_hash: String,
}

/// Verifies linkage and every recomputable hash of `blocks`.
///
/// # Errors
///
/// Returns the first [`ChainViolation`] in chain order.
pub fn verify_chain(blocks: &[Block]) -> Result<ChainSummary, ChainViolation> {
    let Some(genesis) = blocks.first() else {
        return Err(ChainViolation::Empty);
    };
    let header = &genesis.header;
    if header.number != 0
        || header.parent_hash != ZERO_HASH
        || header.merkle_root != ZERO_HASH
        || !genesis.txs.is_empty()
    {
        return Err(ChainViolation::BadGenesis);
    }
    check_hashes(genesis)?;

    let mut transactions = 0;
    for (position, pair) in blocks.windows(2).enumerate() {
        let (prev, block) = (&pair[0], &pair[1]);
        let number = block.header.number;
        let expected = prev.header.number.wrapping_add(1);
        if number != expected {
            return Err(ChainViolation::Number {
                position: position + 1,
                expected,
                found: number,
            });
        }
        if block.header.parent_hash != prev.hash {
            return Err(ChainViolation::Parent { number });
        }
        check_hashes(block)?;
        transactions += block.txs.len();
    }

    let head = &blocks[blocks.len() - 1];
    Ok(ChainSummary {
        blocks: blocks.len(),
        transactions,
        head_number: head.header.number,
        head_hash: head.hash.clone(),
    })
}

fn check_hashes(block: &Block) -> Result<(), ChainViolation> {
    let number = block.header.number;
    if block.header.hash() != block.hash {
        return Err(ChainViolation::HeaderHash { number });
    }
    if let Some(index) = block.txs.iter().position(|tx| !tx.is_intact()) {
        return Err(ChainViolation::TxHash { number, index });
    }
    if number > 0 {
        let hashes: Vec<String> = block.txs.iter().map(|tx| tx.tx_hash.clone()).collect();
        if merkle_root(&hashes) != block.header.merkle_root {
            return Err(ChainViolation::MerkleRoot { number });
        }
    }
    Ok(())
}
