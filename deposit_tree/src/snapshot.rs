use hashing::{hash_256_256, mix_in_count, ZERO_HASHES};
use serde::{Deserialize, Serialize};
use types::primitives::{
    DepositIndex, ExecutionBlockHash, ExecutionBlockNumber, UnixSeconds, H256,
};

use crate::{
    deposit_tree::validate_depth,
    error::{Error, InvalidSnapshot},
};

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FinalizedExecutionBlock {
    pub deposit_root: H256,
    #[serde(with = "serde_utils::string_or_native")]
    pub deposit_count: DepositIndex,
    pub block_hash: ExecutionBlockHash,
    // Height of the block that included the last finalized deposit.
    // `deposit_root` is the contract root from that block until the next deposit.
    #[serde(with = "serde_utils::string_or_native")]
    pub block_height: ExecutionBlockNumber,
    #[serde(with = "serde_utils::string_or_native")]
    pub block_timestamp: UnixSeconds,
}

// This is an implementation of a deposit tree snapshot described in EIP-4881.
// ref: https://eips.ethereum.org/EIPS/eip-4881#reference-implementation
#[derive(Clone, PartialEq, Eq, Default, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DepositTreeSnapshot {
    // Roots of finalized subtrees from left to right.
    pub finalized: Vec<H256>,
    pub execution_block: FinalizedExecutionBlock,
}

impl DepositTreeSnapshot {
    /// Computes the deposit root of a tree of height `depth` from the finalized hashes alone.
    pub fn calculate_root(&self, depth: usize) -> Result<H256, Error> {
        validate_depth(depth)?;

        let deposit_count = self.execution_block.deposit_count;

        // A full tree is summarized by a single hash and has no bits set below its depth.
        if deposit_count == 1 << depth {
            return match self.finalized.as_slice() {
                [root] => Ok(mix_in_count(*root, deposit_count)),
                [] => Err(InvalidSnapshot::MissingHashes { deposit_count }.into()),
                _ => Err(InvalidSnapshot::ExtraHashes { deposit_count }.into()),
            };
        }

        let mut size = deposit_count;
        let mut index = self.finalized.len();
        let mut root = ZERO_HASHES[0];

        for zero_hash in ZERO_HASHES.iter().take(depth) {
            if size & 1 == 1 {
                index = index
                    .checked_sub(1)
                    .ok_or(InvalidSnapshot::MissingHashes { deposit_count })?;

                root = hash_256_256(self.finalized[index], root);
            } else {
                root = hash_256_256(root, *zero_hash);
            }

            size >>= 1;
        }

        if size != 0 {
            return Err(InvalidSnapshot::CountExceedsCapacity {
                deposit_count,
                capacity: 1 << depth,
            }
            .into());
        }

        if index != 0 {
            return Err(InvalidSnapshot::ExtraHashes { deposit_count }.into());
        }

        Ok(mix_in_count(root, deposit_count))
    }
}
