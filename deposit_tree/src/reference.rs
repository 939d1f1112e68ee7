// Dense Merkle tree rebuilt from scratch over the full leaf set.
// Only used to check the incremental tree against an independent computation.

use hashing::{chunk_u64, hash_256_256, mix_in_count, ZERO_HASHES};
use itertools::Itertools as _;
use types::primitives::{DepositIndex, H256};

pub fn root(leaves: &[H256], depth: usize) -> H256 {
    let top = layers(leaves, depth)
        .pop()
        .and_then(|layer| layer.first().copied())
        .unwrap_or(ZERO_HASHES[depth]);

    mix_in_count(top, count(leaves))
}

pub fn proof(leaves: &[H256], depth: usize, index: usize) -> Vec<H256> {
    let mut proof = layers(leaves, depth)
        .iter()
        .take(depth)
        .enumerate()
        .map(|(height, layer)| {
            layer
                .get((index >> height) ^ 1)
                .copied()
                .unwrap_or(ZERO_HASHES[height])
        })
        .collect_vec();

    proof.push(chunk_u64(count(leaves)));
    proof
}

pub fn count(leaves: &[H256]) -> DepositIndex {
    leaves
        .len()
        .try_into()
        .expect("number of leaves should fit in DepositIndex")
}

fn layers(leaves: &[H256], depth: usize) -> Vec<Vec<H256>> {
    let mut layers = vec![leaves.to_vec()];

    for height in 0..depth {
        let next = layers[height]
            .chunks(2)
            .map(|pair| {
                let right = pair.get(1).copied().unwrap_or(ZERO_HASHES[height]);
                hash_256_256(pair[0], right)
            })
            .collect();

        layers.push(next);
    }

    layers
}
