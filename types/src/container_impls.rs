use tree_hash::TreeHash as _;

use crate::{
    containers::{Deposit, DepositData},
    primitives::H256,
};

impl Deposit {
    #[inline]
    #[must_use]
    pub fn is_proof_pruned(&self) -> bool {
        self.proof.is_empty()
    }
}

impl DepositData {
    /// The leaf the deposit contract inserts into its tree.
    #[must_use]
    pub fn hash_tree_root(&self) -> H256 {
        self.tree_hash_root()
    }
}
