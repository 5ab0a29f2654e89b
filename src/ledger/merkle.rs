//! Merkle root over transaction hashes.

use super::block::{ZERO_HASH, sha256_hex};

/// Computes the Merkle root of `hashes`.
///
/// Layers are reduced pairwise, bottom-up; a node is the hash of its
/// children's hex strings concatenated. An odd trailing element is paired
/// with itself, and pairing runs at least once, so a single hash `A` yields
/// `H(A || A)`. An empty slice yields [`ZERO_HASH`].
#[must_use]
pub fn merkle_root(hashes: &[String]) -> String {
    if hashes.is_empty() {
        return ZERO_HASH.to_string();
    }

    let mut layer = pair_layer(hashes);
    while layer.len() > 1 {
        layer = pair_layer(&layer);
    }
    layer.swap_remove(0)
}

fn pair_layer(layer: &[String]) -> Vec<String> {
    layer
        .chunks(2)
        .map(|pair| {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            sha256_hex(format!("{left}{right}").as_bytes())
        })
        .collect()
}
