use hashing::{chunk_u64, mix_in_count, ZERO_HASHES_LEN};
use typenum::Unsigned as _;
use types::{
    consts::DepositContractTreeDepth,
    primitives::{DepositIndex, ExecutionBlockHash, ExecutionBlockNumber, UnixSeconds, H256},
};

use crate::{
    error::{Error, InvalidSnapshot},
    merkle_tree::MerkleTree,
    snapshot::{DepositTreeSnapshot, FinalizedExecutionBlock},
};

pub const MAX_TREE_DEPTH: usize = ZERO_HASHES_LEN - 1;

/// Incremental Merkle accumulator mirroring the deposit contract.
///
/// The tree holds every leaf pushed so far, but leaves covered by [`DepositTree::finalize`]
/// are only kept as the roots of the subtrees they belong to.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DepositTree {
    tree: MerkleTree,
    deposit_count: DepositIndex,
    depth: usize,
}

impl Default for DepositTree {
    fn default() -> Self {
        Self {
            tree: MerkleTree::Zero(DepositContractTreeDepth::USIZE),
            deposit_count: 0,
            depth: DepositContractTreeDepth::USIZE,
        }
    }
}

impl DepositTree {
    pub fn with_depth(depth: usize) -> Result<Self, Error> {
        validate_depth(depth)?;

        Ok(Self {
            tree: MerkleTree::Zero(depth),
            deposit_count: 0,
            depth,
        })
    }

    /// Rebuilds a tree from a snapshot. The tree contains exactly the finalized deposits.
    pub fn from_snapshot(snapshot: &DepositTreeSnapshot, depth: usize) -> Result<Self, Error> {
        validate_depth(depth)?;

        let FinalizedExecutionBlock {
            deposit_root,
            deposit_count,
            ..
        } = snapshot.execution_block;

        let tree = Self {
            tree: MerkleTree::from_finalized(&snapshot.finalized, deposit_count, depth)?,
            deposit_count,
            depth,
        };

        let computed = tree.root();

        if computed != deposit_root {
            return Err(InvalidSnapshot::RootMismatch {
                recorded: deposit_root,
                computed,
            }
            .into());
        }

        features::log!(
            DebugEth1,
            "restored deposit tree from snapshot \
             (deposit_count: {deposit_count}, finalized hashes: {})",
            snapshot.finalized.len(),
        );

        Ok(tree)
    }

    #[must_use]
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Total number of leaves ever pushed, finalized or not.
    #[must_use]
    pub const fn deposit_count(&self) -> DepositIndex {
        self.deposit_count
    }

    /// Number of leaves collapsed into finalized subtrees.
    #[must_use]
    pub fn finalized_count(&self) -> DepositIndex {
        self.tree.finalized_count()
    }

    /// Retrieve the root hash of this Merkle tree with the length mixed in.
    #[must_use]
    pub fn root(&self) -> H256 {
        mix_in_count(self.tree.hash(), self.deposit_count)
    }

    pub fn push(&mut self, leaf: H256) -> Result<(), Error> {
        let index = self.deposit_count;
        let capacity = self.capacity();

        if index >= capacity {
            return Err(Error::CapacityExceeded {
                depth: self.depth,
                capacity,
            });
        }

        self.tree.push_leaf(leaf, index, self.depth)?;
        self.deposit_count += 1;

        Ok(())
    }

    /// Return a Merkle proof of inclusion for the leaf at `index`.
    ///
    /// The Merkle proof is in "bottom-up" order, starting with a leaf node
    /// and moving up the tree. It ends with the deposit count, so its length
    /// is exactly `depth + 1` and it verifies against [`DepositTree::root`].
    pub fn proof(&self, index: DepositIndex) -> Result<Vec<H256>, Error> {
        self.validate_index(index)?;

        let (_, mut proof) = self.tree.generate_proof(index, self.depth)?;
        proof.push(chunk_u64(self.deposit_count));

        Ok(proof)
    }

    /// Collapses every subtree containing only leaves with indices up to and including `index`.
    ///
    /// Finalizing is idempotent and never rewinds: finalizing a lower index
    /// after a higher one leaves the tree unchanged.
    pub fn finalize(&mut self, index: DepositIndex) -> Result<(), Error> {
        self.validate_index(index)?;

        self.tree.finalize(index + 1, self.depth)?;

        features::log!(
            DebugEth1,
            "finalized deposit tree up to index {index} \
             (deposit_count: {}, finalized_count: {})",
            self.deposit_count,
            self.finalized_count(),
        );

        Ok(())
    }

    /// Captures the finalized part of the tree along with the execution block that finalized it.
    pub fn snapshot(
        &self,
        block_hash: ExecutionBlockHash,
        block_height: ExecutionBlockNumber,
        block_timestamp: UnixSeconds,
    ) -> Result<DepositTreeSnapshot, Error> {
        let mut snapshot = DepositTreeSnapshot {
            finalized: self.tree.finalized_hashes(),
            execution_block: FinalizedExecutionBlock {
                deposit_root: H256::zero(),
                deposit_count: self.finalized_count(),
                block_hash,
                block_height,
                block_timestamp,
            },
        };

        snapshot.execution_block.deposit_root = snapshot.calculate_root(self.depth)?;

        Ok(snapshot)
    }

    const fn capacity(&self) -> DepositIndex {
        1 << self.depth
    }

    fn validate_index(&self, index: DepositIndex) -> Result<(), Error> {
        if index < self.deposit_count {
            return Ok(());
        }

        Err(Error::InvalidIndex {
            index,
            deposit_count: self.deposit_count,
        })
    }
}

pub(crate) const fn validate_depth(depth: usize) -> Result<(), Error> {
    if depth > MAX_TREE_DEPTH {
        return Err(Error::DepthTooLarge {
            depth,
            max_depth: MAX_TREE_DEPTH,
        });
    }

    Ok(())
}
