#![no_main]

use libfuzzer_sys::fuzz_target;
use skirmish::ledger::{Block, verify_chain};

fuzz_target!(|data: &[u8]| {
    // Verification of arbitrary decoded blocks must never panic.
    if let Ok(block) = serde_json::from_slice::<Block>(data) {
        let _ = verify_chain(std::slice::from_ref(&block));
        let _ = verify_chain(&[Block::genesis(0), block]);
    }
});
