use hashing::{hash_256_256, ZERO_HASHES};
use types::primitives::{DepositIndex, H256};

use crate::error::{Error, InvalidSnapshot};

/// Right-sparse Merkle tree.
///
/// Efficiently represents a Merkle tree of fixed depth where only the first N
/// indices are populated by non-zero leaves (perfect for the deposit contract tree).
/// Fully populated subtrees on the left can be collapsed into [`MerkleTree::Finalized`] nodes,
/// which keep only their root and the number of leaves they summarize.
///
/// Nodes do not store their height. Every operation is passed the height of the node it is
/// called on, and recursive calls derive the heights of children from it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum MerkleTree {
    Zero(usize),
    Leaf(H256),
    Inner(H256, Box<Self>, Box<Self>),
    Finalized(H256, DepositIndex),
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::Zero(0)
    }
}

impl MerkleTree {
    #[must_use]
    pub const fn hash(&self) -> H256 {
        match *self {
            Self::Zero(height) => ZERO_HASHES[height],
            Self::Leaf(hash) | Self::Inner(hash, _, _) | Self::Finalized(hash, _) => hash,
        }
    }

    #[must_use]
    pub fn leaf_count(&self) -> DepositIndex {
        match self {
            Self::Zero(_) => 0,
            Self::Leaf(_) => 1,
            Self::Inner(_, left, right) => left.leaf_count() + right.leaf_count(),
            Self::Finalized(_, count) => *count,
        }
    }

    /// Inserts `leaf` at position `index` of a subtree of height `height`.
    ///
    /// `index` is relative to the first leaf of the subtree.
    pub fn push_leaf(
        &mut self,
        leaf: H256,
        index: DepositIndex,
        height: usize,
    ) -> Result<(), Error> {
        match self {
            Self::Zero(zero_height) => {
                if *zero_height != height {
                    return Err(Error::Malformed { height });
                }

                *self = Self::single_leaf(leaf, index, height);
            }
            Self::Leaf(_) => return Err(Error::LeafReached),
            Self::Inner(hash, left, right) => {
                let child_height = height.checked_sub(1).ok_or(Error::Malformed { height })?;
                let half = 1 << child_height;

                if index < half {
                    left.push_leaf(leaf, index, child_height)?;
                } else {
                    right.push_leaf(leaf, index - half, child_height)?;
                }

                *hash = hash_256_256(left.hash(), right.hash());
            }
            Self::Finalized(_, _) => return Err(Error::FinalizedNodePushed),
        }

        Ok(())
    }

    /// Collapses every subtree that only contains the first `deposits_to_finalize` leaves.
    ///
    /// `deposits_to_finalize` must not exceed the number of leaves in the tree.
    pub fn finalize(
        &mut self,
        deposits_to_finalize: DepositIndex,
        height: usize,
    ) -> Result<(), Error> {
        match self {
            Self::Zero(_) => Err(Error::ZeroNodeFinalized),
            Self::Leaf(hash) => {
                if height != 0 {
                    return Err(Error::Malformed { height });
                }

                *self = Self::Finalized(*hash, 1);

                Ok(())
            }
            Self::Inner(hash, left, right) => {
                let child_height = height.checked_sub(1).ok_or(Error::Malformed { height })?;
                let capacity = 1 << height;

                if capacity <= deposits_to_finalize {
                    *self = Self::Finalized(*hash, capacity);
                    return Ok(());
                }

                let half = capacity / 2;

                left.finalize(deposits_to_finalize, child_height)?;

                if deposits_to_finalize > half {
                    right.finalize(deposits_to_finalize - half, child_height)?;
                }

                Ok(())
            }
            Self::Finalized(_, _) => Ok(()),
        }
    }

    /// Returns the leaf at `index` and a Merkle proof of its inclusion.
    ///
    /// The Merkle proof is in "bottom-up" order, starting with a leaf node
    /// and moving up the tree. Its length will be exactly equal to `depth`.
    pub fn generate_proof(
        &self,
        index: DepositIndex,
        depth: usize,
    ) -> Result<(H256, Vec<H256>), Error> {
        let mut proof = Vec::with_capacity(depth);
        let mut node = self;

        for child_height in (0..depth).rev() {
            let (left, right) = match node {
                Self::Inner(_, left, right) => (left.as_ref(), right.as_ref()),
                Self::Finalized(_, _) => return Err(Error::FinalizedLeaf { index }),
                Self::Zero(_) | Self::Leaf(_) => {
                    return Err(Error::Malformed {
                        height: child_height + 1,
                    })
                }
            };

            // Go right, include the left branch in the proof.
            if (index >> child_height) & 1 == 1 {
                proof.push(left.hash());
                node = right;
            } else {
                proof.push(right.hash());
                node = left;
            }
        }

        let leaf = match *node {
            Self::Leaf(leaf) => leaf,
            Self::Finalized(_, _) => return Err(Error::FinalizedLeaf { index }),
            Self::Zero(_) | Self::Inner(_, _, _) => return Err(Error::Malformed { height: 0 }),
        };

        proof.reverse();

        Ok((leaf, proof))
    }

    /// Hashes of [`MerkleTree::Finalized`] nodes from left to right.
    #[must_use]
    pub fn finalized_hashes(&self) -> Vec<H256> {
        let mut hashes = vec![];
        self.visit_finalized(&mut |hash, _| hashes.push(hash));
        hashes
    }

    #[must_use]
    pub fn finalized_count(&self) -> DepositIndex {
        let mut total = 0;
        self.visit_finalized(&mut |_, count| total += count);
        total
    }

    /// Rebuilds a tree of height `height` from the roots of its finalized subtrees.
    ///
    /// `finalized` must be ordered from left to right, which makes it match the binary
    /// representation of `deposit_count` from the most significant bit down.
    pub fn from_finalized(
        finalized: &[H256],
        deposit_count: DepositIndex,
        height: usize,
    ) -> Result<Self, Error> {
        if deposit_count == 0 {
            if !finalized.is_empty() {
                return Err(InvalidSnapshot::ExtraHashes { deposit_count }.into());
            }

            return Ok(Self::Zero(height));
        }

        let capacity = 1 << height;

        if deposit_count > capacity {
            return Err(InvalidSnapshot::CountExceedsCapacity {
                deposit_count,
                capacity,
            }
            .into());
        }

        let (first, rest) = finalized
            .split_first()
            .ok_or(InvalidSnapshot::MissingHashes { deposit_count })?;

        if deposit_count == capacity {
            if !rest.is_empty() {
                return Err(InvalidSnapshot::ExtraHashes { deposit_count }.into());
            }

            return Ok(Self::Finalized(*first, capacity));
        }

        let child_height = height.checked_sub(1).ok_or(Error::Malformed { height })?;
        let half = capacity / 2;

        let (left, right) = match deposit_count.checked_sub(half) {
            // The left subtree is fully finalized.
            Some(right_count) => (
                Self::Finalized(*first, half),
                Self::from_finalized(rest, right_count, child_height)?,
            ),
            // The left subtree is partially finalized, so the right one is empty.
            None => (
                Self::from_finalized(finalized, deposit_count, child_height)?,
                Self::Zero(child_height),
            ),
        };

        Ok(Self::inner(left, right))
    }

    fn single_leaf(leaf: H256, index: DepositIndex, height: usize) -> Self {
        let Some(child_height) = height.checked_sub(1) else {
            return Self::Leaf(leaf);
        };

        let half = 1 << child_height;

        if index < half {
            Self::inner(
                Self::single_leaf(leaf, index, child_height),
                Self::Zero(child_height),
            )
        } else {
            Self::inner(
                Self::Zero(child_height),
                Self::single_leaf(leaf, index - half, child_height),
            )
        }
    }

    fn inner(left: Self, right: Self) -> Self {
        let hash = hash_256_256(left.hash(), right.hash());
        Self::Inner(hash, Box::new(left), Box::new(right))
    }

    fn visit_finalized(&self, visitor: &mut impl FnMut(H256, DepositIndex)) {
        match self {
            Self::Zero(_) | Self::Leaf(_) => {}
            Self::Inner(_, left, right) => {
                left.visit_finalized(visitor);
                right.visit_finalized(visitor);
            }
            Self::Finalized(hash, count) => visitor(*hash, *count),
        }
    }
}

/// Verify a proof that `leaf` exists at `index` in a Merkle tree rooted at `root`.
///
/// The `branch` argument is the main component of the proof: it should be a list of internal
/// node hashes such that the root can be reconstructed (in bottom-up order).
#[must_use]
pub fn verify_merkle_proof(
    leaf: H256,
    branch: &[H256],
    depth: usize,
    index: DepositIndex,
    root: H256,
) -> bool {
    branch.len() == depth && merkle_root_from_branch(leaf, branch, index) == root
}

/// Compute a root hash from a leaf and a Merkle proof.
#[must_use]
pub fn merkle_root_from_branch(leaf: H256, branch: &[H256], index: DepositIndex) -> H256 {
    branch
        .iter()
        .enumerate()
        .fold(leaf, |node, (height, sibling)| {
            if (index >> height) & 1 == 1 {
                hash_256_256(*sibling, node)
            } else {
                hash_256_256(node, *sibling)
            }
        })
}
